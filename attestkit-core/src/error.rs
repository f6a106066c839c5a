use thiserror::Error;
use tokio::task::JoinError;

use crate::platform::{AttestationServiceError, KeyStoreError};

/// Result type for attested key operations.
pub type AttestedKeyResult<T> = Result<T, AttestedKeyError>;

/// Error outputs from the attested key bridge.
///
/// Platform failures never cross the bridge as-is. They are classified into one of
/// these two kinds, so a caller only has to decide between fixing a precondition and
/// retrying the same identifier, or treating the failure as systemic.
#[derive(Debug, Clone, PartialEq, Eq, Error, uniffi::Error)]
pub enum AttestedKeyError {
    /// A precondition of the operation does not hold: the device is locked, a key already
    /// exists for the identifier, no key exists for it, or a live key handle holds it.
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    /// The keystore or the attestation service failed unexpectedly.
    #[error("adapter failure: {0}")]
    AdapterFailure(String),
}

impl AttestedKeyError {
    pub(crate) fn key_exists(identifier: &str) -> Self {
        Self::PreconditionFailed(format!("key already exists for identifier `{identifier}`"))
    }

    pub(crate) fn key_not_found(identifier: &str) -> Self {
        Self::PreconditionFailed(format!("key not found for identifier `{identifier}`"))
    }

    pub(crate) fn device_locked() -> Self {
        Self::PreconditionFailed("device is locked".to_string())
    }

    pub(crate) fn identifier_in_use(identifier: &str) -> Self {
        Self::PreconditionFailed(format!(
            "identifier is already in use in this process: `{identifier}`"
        ))
    }
}

impl KeyStoreError {
    /// Classifies a keystore failure for the key named by `identifier`.
    ///
    /// `action` describes what the bridge was doing and prefixes adapter failures.
    pub(crate) fn classify(self, identifier: &str, action: &str) -> AttestedKeyError {
        match self {
            Self::KeyAlreadyExists => AttestedKeyError::key_exists(identifier),
            Self::KeyNotFound => AttestedKeyError::key_not_found(identifier),
            Self::DeviceLocked => AttestedKeyError::device_locked(),
            Self::Keystore(_) | Self::UnexpectedUniFFICallbackError(_) => {
                AttestedKeyError::AdapterFailure(format!("{action}: {self}"))
            }
        }
    }

    /// Classifies a keystore failure not tied to a single key, such as listing aliases.
    ///
    /// Only a locked device is a precondition here. A missing or duplicate key cannot be
    /// reported for an operation that names no key, so the adapter is at fault.
    pub(crate) fn classify_unkeyed(self, action: &str) -> AttestedKeyError {
        match self {
            Self::DeviceLocked => AttestedKeyError::device_locked(),
            _ => AttestedKeyError::AdapterFailure(format!("{action}: {self}")),
        }
    }
}

impl AttestationServiceError {
    /// Classifies an attestation service failure.
    ///
    /// Transient failures that survive the retry policy are folded into
    /// [`AttestedKeyError::AdapterFailure`] like any other failure. `attest` must not report
    /// them as "safe to retry with the same identifier".
    pub(crate) fn classify(self, action: &str) -> AttestedKeyError {
        AttestedKeyError::AdapterFailure(format!("{action}: {self}"))
    }
}

impl From<JoinError> for AttestedKeyError {
    fn from(error: JoinError) -> Self {
        Self::AdapterFailure(format!("platform task did not complete: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(KeyStoreError::KeyAlreadyExists, "key already exists for identifier `id`" ; "already exists")]
    #[test_case(KeyStoreError::KeyNotFound, "key not found for identifier `id`" ; "not found")]
    #[test_case(KeyStoreError::DeviceLocked, "device is locked" ; "locked")]
    fn test_keystore_preconditions(error: KeyStoreError, reason: &str) {
        assert_eq!(
            error.classify("id", "failed to sign the payload"),
            AttestedKeyError::PreconditionFailed(reason.to_string())
        );
    }

    #[test_case(KeyStoreError::Keystore("bad padding".to_string()) ; "keystore")]
    #[test_case(KeyStoreError::UnexpectedUniFFICallbackError("panic".to_string()) ; "callback")]
    fn test_keystore_adapter_failures(error: KeyStoreError) {
        let message = error.to_string();
        let classified = error.classify("id", "failed to sign the payload");

        let AttestedKeyError::AdapterFailure(reason) = classified else {
            panic!("expected adapter failure, got: {classified:?}");
        };
        assert!(reason.starts_with("failed to sign the payload: "));
        assert!(reason.ends_with(&message));
    }

    #[test_case(KeyStoreError::KeyNotFound ; "not found")]
    #[test_case(KeyStoreError::Keystore("binder died".to_string()) ; "keystore")]
    fn test_unkeyed_failures_name_no_identifier(error: KeyStoreError) {
        let classified = error.classify_unkeyed("failed to list keys");

        let AttestedKeyError::AdapterFailure(reason) = classified else {
            panic!("expected adapter failure, got: {classified:?}");
        };
        assert!(reason.starts_with("failed to list keys: "));
        assert!(!reason.contains("identifier"));
    }

    #[test]
    fn test_unkeyed_locked_device_is_precondition() {
        assert_eq!(
            KeyStoreError::DeviceLocked.classify_unkeyed("failed to list keys"),
            AttestedKeyError::device_locked()
        );
    }

    #[test_case(AttestationServiceError::Transient("timeout".to_string()) ; "transient")]
    #[test_case(AttestationServiceError::Permanent("bad project".to_string()) ; "permanent")]
    fn test_attestation_failures_are_never_preconditions(error: AttestationServiceError) {
        assert!(matches!(
            error.classify("failed to obtain integrity token"),
            AttestedKeyError::AdapterFailure(_)
        ));
    }

    #[test]
    fn test_display_includes_kind() {
        assert_eq!(
            AttestedKeyError::device_locked().to_string(),
            "precondition failed: device is locked"
        );
        assert_eq!(
            AttestedKeyError::AdapterFailure("chain too short".to_string()).to_string(),
            "adapter failure: chain too short"
        );
    }
}
