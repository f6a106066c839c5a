//! Platform abstraction traits for attested keys.
//!
//! This module defines the capabilities the host platform provides to the bridge. All of
//! them are exported via `UniFFI` so they can be implemented in Kotlin or Swift.
//!
//! - [`KeyStore`]: hardware key storage: create attested keys, sign, enumerate and delete
//! - [`AttestationService`] and [`IntegrityTokenProvider`]: app integrity tokens (network bound)
//! - [`DeviceStateGuard`]: whether the device is currently locked
//!
//! ## Android (Kotlin)
//! - `KeyStore`: Android Keystore, `StrongBox` when available, key attestation enabled
//! - `AttestationService`: Play Integrity standard requests
//! - `DeviceStateGuard`: `KeyguardManager.isDeviceLocked`
//!
//! Calls into these traits may block. The bridge always invokes them from the blocking
//! thread pool, never from the thread that polls the caller's future.

mod attestation;
mod device_state;
mod key_store;

pub use attestation::{
    AttestationService, AttestationServiceError, AttestationServiceResult,
    IntegrityTokenProvider,
};
pub use device_state::DeviceStateGuard;
pub use key_store::{KeyStore, KeyStoreError, KeyStoreResult, SecurityTier};

use tokio::task::JoinError;

/// Runs a blocking platform call on the tokio blocking pool.
///
/// A panic inside `call` surfaces as `E::from(JoinError)`.
pub(crate) async fn run_blocking<T, E, F>(call: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    tokio::task::spawn_blocking(call).await?
}
