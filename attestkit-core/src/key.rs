use std::fmt;
use std::sync::Arc;

use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;

use crate::bridge::BridgeCore;
use crate::error::{AttestedKeyError, AttestedKeyResult};
use crate::platform::SecurityTier;

/// Marks an identifier as held by a live [`AttestedKey`]. Released on drop.
pub(crate) struct IdentifierClaim {
    core: Arc<BridgeCore>,
    identifier: String,
}

impl IdentifierClaim {
    pub(crate) const fn new(core: Arc<BridgeCore>, identifier: String) -> Self {
        Self { core, identifier }
    }
}

impl Drop for IdentifierClaim {
    fn drop(&mut self) {
        self.core.release(&self.identifier);
    }
}

/// Handle to an attested key.
///
/// A bridge hands out at most one live handle per identifier, see
/// [`crate::AttestedKeyBridge::attest_key`] and [`crate::AttestedKeyBridge::attested_key`].
/// The identifier becomes available again when the handle is dropped.
pub struct AttestedKey {
    claim: IdentifierClaim,
}

impl AttestedKey {
    pub(crate) const fn new(claim: IdentifierClaim) -> Self {
        Self { claim }
    }

    fn core(&self) -> &BridgeCore {
        &self.claim.core
    }

    /// The identifier of the key.
    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.claim.identifier
    }

    /// Signs `payload`, returning a DER encoded ECDSA signature.
    ///
    /// # Errors
    ///
    /// Fails like [`crate::AttestedKeyBridge::sign`].
    pub async fn sign(&self, payload: &[u8]) -> AttestedKeyResult<Vec<u8>> {
        self.core().sign(self.identifier(), payload.to_vec()).await
    }

    /// Signs `payload` and decodes the signature.
    ///
    /// # Errors
    ///
    /// Fails like [`AttestedKey::sign`], and with [`AttestedKeyError::AdapterFailure`] if
    /// the keystore returned a malformed signature.
    pub async fn try_sign(&self, payload: &[u8]) -> AttestedKeyResult<Signature> {
        let signature = self.sign(payload).await?;

        Signature::from_der(&signature).map_err(|err| {
            AttestedKeyError::AdapterFailure(format!("malformed signature: {err}"))
        })
    }

    /// Returns the DER encoded `SubjectPublicKeyInfo` of the key.
    ///
    /// # Errors
    ///
    /// Fails like [`crate::AttestedKeyBridge::public_key`].
    pub async fn public_key(&self) -> AttestedKeyResult<Vec<u8>> {
        self.core().public_key(self.identifier()).await
    }

    /// Returns the public key of the key, for verifying its signatures.
    ///
    /// # Errors
    ///
    /// Fails like [`AttestedKey::public_key`], and with [`AttestedKeyError::AdapterFailure`]
    /// if the keystore returned something other than a P-256 public key.
    pub async fn verifying_key(&self) -> AttestedKeyResult<VerifyingKey> {
        let public_key = self.public_key().await?;

        VerifyingKey::from_public_key_der(&public_key).map_err(|err| {
            AttestedKeyError::AdapterFailure(format!("malformed public key: {err}"))
        })
    }

    /// Reports the hardware isolation level of the key.
    ///
    /// # Errors
    ///
    /// Fails like [`crate::AttestedKeyBridge::security_tier`].
    pub async fn security_tier(&self) -> AttestedKeyResult<SecurityTier> {
        self.core().security_tier(self.identifier()).await
    }

    /// Deletes the key and releases its identifier.
    ///
    /// # Errors
    ///
    /// Fails like [`crate::AttestedKeyBridge::delete`]. The identifier is released either way.
    pub async fn delete(self) -> AttestedKeyResult<()> {
        self.core().delete(self.identifier()).await
    }
}

impl fmt::Debug for AttestedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttestedKey")
            .field("identifier", &self.identifier())
            .finish_non_exhaustive()
    }
}
