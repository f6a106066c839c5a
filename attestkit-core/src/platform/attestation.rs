//! App integrity / attestation service traits.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinError;

/// Result type for attestation service operations.
pub type AttestationServiceResult<T> = Result<T, AttestationServiceError>;

/// Errors raised by an [`AttestationService`] or [`IntegrityTokenProvider`].
///
/// Only [`AttestationServiceError::Transient`] is retried by the bridge.
#[derive(Debug, Error, uniffi::Error)]
pub enum AttestationServiceError {
    /// A failure that may succeed when retried (network unavailable, service busy, ...).
    #[error("transient attestation service error: {0}")]
    Transient(String),

    /// A failure that will not go away by retrying (malformed configuration, app not
    /// recognized, API disabled, ...).
    #[error("attestation service error: {0}")]
    Permanent(String),

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl AttestationServiceError {
    /// Whether the failed call may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for AttestationServiceError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

impl From<JoinError> for AttestationServiceError {
    fn from(error: JoinError) -> Self {
        Self::Permanent(format!("attestation service call did not complete: {error}"))
    }
}

/// Entry point of the platform attestation service (e.g. Play Integrity).
#[uniffi::export(with_foreign)]
pub trait AttestationService: Send + Sync {
    /// Prepares a token provider for the given Google Cloud project number.
    ///
    /// This performs a network round trip. The bridge caches the returned provider and only
    /// calls this again when the project number changes.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationServiceError::Transient`] for failures worth retrying and
    /// [`AttestationServiceError::Permanent`] otherwise.
    fn prepare(
        &self,
        cloud_project_number: u64,
    ) -> AttestationServiceResult<Arc<dyn IntegrityTokenProvider>>;
}

/// A prepared provider of app integrity tokens.
#[uniffi::export(with_foreign)]
pub trait IntegrityTokenProvider: Send + Sync {
    /// Requests an integrity token bound to `request_hash`.
    ///
    /// `request_hash` is the base64 encoded SHA-256 digest of the attestation challenge. The
    /// returned token is opaque to the bridge.
    ///
    /// # Errors
    ///
    /// Returns [`AttestationServiceError::Transient`] for failures worth retrying and
    /// [`AttestationServiceError::Permanent`] otherwise.
    fn request_token(&self, request_hash: String) -> AttestationServiceResult<Vec<u8>>;
}
