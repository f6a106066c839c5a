//! Hardware key storage trait.

use thiserror::Error;
use tokio::task::JoinError;

/// Result type for keystore operations.
pub type KeyStoreResult<T> = Result<T, KeyStoreError>;

/// Errors raised by a [`KeyStore`] implementation.
///
/// The unit variants carry meaning for the bridge and are reported to the caller as
/// precondition failures. Anything else should be reported as [`KeyStoreError::Keystore`].
#[derive(Debug, Error, uniffi::Error)]
pub enum KeyStoreError {
    /// A key already exists under the alias.
    #[error("key already exists")]
    KeyAlreadyExists,

    /// No key exists under the alias.
    #[error("key not found")]
    KeyNotFound,

    /// The keystore refuses the operation while the device is locked.
    #[error("device is locked")]
    DeviceLocked,

    /// Any other keystore failure.
    #[error("keystore error: {0}")]
    Keystore(String),

    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl From<uniffi::UnexpectedUniFFICallbackError> for KeyStoreError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

impl From<JoinError> for KeyStoreError {
    fn from(error: JoinError) -> Self {
        Self::Keystore(format!("keystore call did not complete: {error}"))
    }
}

/// Hardware isolation level backing a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, uniffi::Enum)]
pub enum SecurityTier {
    /// The private key lives in regular process or OS memory.
    Software,
    /// The private key lives in a trusted execution environment (e.g. `TrustZone`).
    TrustedEnvironment,
    /// The private key lives in a dedicated secure element (e.g. `StrongBox`).
    StrongBox,
}

/// Hardware-backed storage for asymmetric signing keys.
///
/// Keys are addressed by alias. The bridge derives aliases from caller identifiers and never
/// shows them to the caller.
///
/// # Requirements
///
/// - Keys are ECDSA P-256 and their private component MUST NOT leave the keystore.
/// - [`KeyStore::create_key`] MUST be atomic: it fails with
///   [`KeyStoreError::KeyAlreadyExists`] instead of replacing an existing key, even when two
///   calls race for the same alias.
/// - [`KeyStore::delete_alias`] MUST succeed when the alias does not exist.
#[uniffi::export(with_foreign)]
pub trait KeyStore: Send + Sync {
    /// Generates a new key under `alias` with key attestation enabled, embedding `challenge`
    /// in the attestation certificate.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::KeyAlreadyExists`] if the alias is taken and
    /// [`KeyStoreError::DeviceLocked`] if the keystore is not available while locked.
    fn create_key(&self, alias: String, challenge: Vec<u8>) -> KeyStoreResult<()>;

    /// Returns whether a key exists under `alias`.
    ///
    /// # Errors
    ///
    /// Returns an error if the keystore cannot be queried.
    fn contains_alias(&self, alias: String) -> KeyStoreResult<bool>;

    /// Returns the DER encoded attestation certificate chain of the key, leaf first.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::KeyNotFound`] if no key exists under `alias`.
    fn certificate_chain(&self, alias: String) -> KeyStoreResult<Vec<Vec<u8>>>;

    /// Signs `payload` with the key (ECDSA with SHA-256), returning a DER encoded signature.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::KeyNotFound`] if no key exists under `alias`.
    fn sign(&self, alias: String, payload: Vec<u8>) -> KeyStoreResult<Vec<u8>>;

    /// Returns the DER encoded `SubjectPublicKeyInfo` of the key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::KeyNotFound`] if no key exists under `alias`.
    fn public_key(&self, alias: String) -> KeyStoreResult<Vec<u8>>;

    /// Deletes the key under `alias`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error only if an existing entry cannot be removed.
    fn delete_alias(&self, alias: String) -> KeyStoreResult<()>;

    /// Lists the aliases of all keys in the keystore.
    ///
    /// # Errors
    ///
    /// Returns an error if the keystore cannot be enumerated.
    fn aliases(&self) -> KeyStoreResult<Vec<String>>;

    /// Reports the hardware isolation level of the key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyStoreError::KeyNotFound`] if no key exists under `alias`.
    fn security_tier(&self, alias: String) -> KeyStoreResult<SecurityTier>;
}
