use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::BridgeConfig;
use crate::error::{AttestedKeyError, AttestedKeyResult};
use crate::identifier::{key_alias, IdentifierSource};
use crate::integrity::IntegrityTokenCache;
use crate::key::{AttestedKey, IdentifierClaim};
use crate::platform::{
    run_blocking, AttestationService, DeviceStateGuard, KeyStore, KeyStoreError,
    KeyStoreResult, SecurityTier,
};

/// Shape of the attestation statements produced by a bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum AttestedKeyType {
    /// Apple App Attest: a single attestation object, assertions instead of plain signatures.
    Apple,
    /// Android key attestation plus a Play Integrity token.
    Google,
}

/// The attestation statement of a newly created key.
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct AttestationResult {
    /// DER encoded X.509 certificates, leaf first. Always holds at least two certificates.
    pub certificate_chain: Vec<Vec<u8>>,
    /// The integrity token bound to the attestation challenge. Opaque to the bridge.
    pub app_attestation_token: Vec<u8>,
}

/// Minimum length of a usable attestation chain: the key certificate and its issuer.
const MIN_CERTIFICATE_CHAIN_LEN: usize = 2;

/// State shared by a bridge and the key handles it hands out.
pub(crate) struct BridgeCore {
    key_store: Arc<dyn KeyStore>,
    device_state: Arc<dyn DeviceStateGuard>,
    tokens: IntegrityTokenCache,
    config: BridgeConfig,
    identifiers: IdentifierSource,
    /// Identifiers held by a live [`AttestedKey`].
    claims: Mutex<HashSet<String>>,
}

impl BridgeCore {
    fn alias(&self, identifier: &str) -> String {
        key_alias(&self.config.alias_prefix, identifier)
    }

    /// Runs `call` against the keystore on the blocking pool.
    async fn with_key_store<T, F>(&self, call: F) -> KeyStoreResult<T>
    where
        F: FnOnce(&dyn KeyStore) -> KeyStoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let key_store = Arc::clone(&self.key_store);
        run_blocking(move || call(key_store.as_ref())).await
    }

    async fn ensure_unlocked(&self) -> AttestedKeyResult<()> {
        let device_state = Arc::clone(&self.device_state);
        let locked =
            run_blocking(move || Ok::<_, AttestedKeyError>(device_state.is_locked())).await?;

        if locked {
            return Err(AttestedKeyError::device_locked());
        }
        Ok(())
    }

    pub(crate) async fn attest(
        &self,
        identifier: &str,
        challenge: Vec<u8>,
        google_cloud_project_number: u64,
    ) -> AttestedKeyResult<AttestationResult> {
        let app_attestation_token = self
            .tokens
            .request_token(google_cloud_project_number, &challenge, &self.config.retry)
            .await
            .map_err(|err| err.classify("failed to obtain integrity token"))?;

        self.ensure_unlocked().await?;

        let alias = self.alias(identifier);
        let exists = {
            let alias = alias.clone();
            self.with_key_store(move |key_store| key_store.contains_alias(alias))
                .await
                .map_err(|err| err.classify(identifier, "failed to look up the key"))?
        };
        if exists {
            return Err(AttestedKeyError::key_exists(identifier));
        }

        let created = {
            let alias = alias.clone();
            self.with_key_store(move |key_store| key_store.create_key(alias, challenge))
                .await
        };
        match created {
            Ok(()) => log::debug!("created attested key for identifier `{identifier}`"),
            // Another caller won the race for this alias, the key is theirs.
            Err(err @ KeyStoreError::KeyAlreadyExists) => {
                return Err(err.classify(identifier, "failed to create the key"));
            }
            Err(err) => {
                self.discard_key(identifier, alias).await;
                return Err(err.classify(identifier, "failed to create the key"));
            }
        }

        match self.attestation_chain(identifier, alias.clone()).await {
            Ok(certificate_chain) => Ok(AttestationResult {
                certificate_chain,
                app_attestation_token,
            }),
            Err(err) => {
                self.discard_key(identifier, alias).await;
                Err(err)
            }
        }
    }

    async fn attestation_chain(
        &self,
        identifier: &str,
        alias: String,
    ) -> AttestedKeyResult<Vec<Vec<u8>>> {
        let chain = self
            .with_key_store(move |key_store| key_store.certificate_chain(alias))
            .await
            .map_err(|err| err.classify(identifier, "failed to obtain the certificate chain"))?;

        if chain.len() < MIN_CERTIFICATE_CHAIN_LEN {
            return Err(AttestedKeyError::AdapterFailure(format!(
                "certificate chain too short: expected at least {MIN_CERTIFICATE_CHAIN_LEN} certificates, got {}",
                chain.len()
            )));
        }

        Ok(chain)
    }

    /// Removes the key of a failed attestation. Failures are logged, not returned, so the
    /// caller sees the error that made the attestation fail.
    async fn discard_key(&self, identifier: &str, alias: String) {
        match self
            .with_key_store(move |key_store| key_store.delete_alias(alias))
            .await
        {
            Ok(()) => log::debug!("deleted key of failed attestation for identifier `{identifier}`"),
            Err(err) => log::warn!(
                "could not delete key of failed attestation for identifier `{identifier}`: {err}"
            ),
        }
    }

    pub(crate) async fn sign(&self, identifier: &str, payload: Vec<u8>) -> AttestedKeyResult<Vec<u8>> {
        self.ensure_unlocked().await?;

        let alias = self.alias(identifier);
        self.with_key_store(move |key_store| key_store.sign(alias, payload))
            .await
            .map_err(|err| err.classify(identifier, "failed to sign the payload"))
    }

    pub(crate) async fn public_key(&self, identifier: &str) -> AttestedKeyResult<Vec<u8>> {
        let alias = self.alias(identifier);
        self.with_key_store(move |key_store| key_store.public_key(alias))
            .await
            .map_err(|err| err.classify(identifier, "failed to obtain the public key"))
    }

    pub(crate) async fn security_tier(&self, identifier: &str) -> AttestedKeyResult<SecurityTier> {
        let alias = self.alias(identifier);
        self.with_key_store(move |key_store| key_store.security_tier(alias))
            .await
            .map_err(|err| err.classify(identifier, "failed to obtain the security tier"))
    }

    pub(crate) async fn delete(&self, identifier: &str) -> AttestedKeyResult<()> {
        let alias = self.alias(identifier);
        self.with_key_store(move |key_store| key_store.delete_alias(alias))
            .await
            .map_err(|err| err.classify(identifier, "failed to delete the key"))?;

        log::debug!("deleted attested key for identifier `{identifier}`");
        Ok(())
    }

    async fn clean(&self) -> AttestedKeyResult<u32> {
        let prefix = self.config.alias_prefix.clone();
        // The method path is not general over the trait object lifetime.
        #[allow(clippy::redundant_closure_for_method_calls)]
        let aliases = self
            .with_key_store(|key_store| key_store.aliases())
            .await
            .map_err(|err| err.classify_unkeyed("failed to list keys"))?;

        let mut deleted = 0u32;
        for alias in aliases {
            let Some(identifier) = alias.strip_prefix(&prefix).map(ToString::to_string) else {
                continue;
            };
            self.with_key_store(move |key_store| key_store.delete_alias(alias))
                .await
                .map_err(|err| err.classify(&identifier, "failed to delete the key"))?;
            deleted = deleted.saturating_add(1);
        }

        log::info!("deleted {deleted} attested keys");
        Ok(deleted)
    }

    /// Registers `identifier` as held by a key handle.
    pub(crate) fn claim(self: &Arc<Self>, identifier: &str) -> AttestedKeyResult<IdentifierClaim> {
        let mut claims = self
            .claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !claims.insert(identifier.to_string()) {
            return Err(AttestedKeyError::identifier_in_use(identifier));
        }
        drop(claims);

        Ok(IdentifierClaim::new(Arc::clone(self), identifier.to_string()))
    }

    pub(crate) fn release(&self, identifier: &str) {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(identifier);
    }
}

/// Creates, attests, uses and destroys hardware-backed signing keys.
///
/// Keys are addressed by caller chosen identifiers. The bridge maps each identifier to a
/// keystore alias by prepending the configured prefix (`ecdsa_` by default), so all keys it
/// manages share one namespace in the keystore.
///
/// Every operation can be called concurrently. The integrity token provider is prepared once
/// per Google Cloud project number and shared by all callers.
#[derive(uniffi::Object)]
pub struct AttestedKeyBridge {
    core: Arc<BridgeCore>,
}

#[uniffi::export(async_runtime = "tokio")]
impl AttestedKeyBridge {
    /// Creates a bridge over the host's platform capabilities.
    ///
    /// `config` defaults to [`BridgeConfig::default`].
    ///
    /// # Errors
    ///
    /// Returns [`AttestedKeyError::AdapterFailure`] if `config` is invalid.
    #[uniffi::constructor]
    pub fn new(
        key_store: Arc<dyn KeyStore>,
        attestation_service: Arc<dyn AttestationService>,
        device_state: Arc<dyn DeviceStateGuard>,
        config: Option<BridgeConfig>,
    ) -> Result<Self, AttestedKeyError> {
        Self::build(
            key_store,
            attestation_service,
            device_state,
            config.unwrap_or_default(),
            IdentifierSource::Random,
        )
    }

    /// The shape of the attestation statements this bridge produces.
    #[must_use]
    #[allow(clippy::unused_self, clippy::missing_const_for_fn)] // associated functions are not supported with Uniffi exports
    pub fn key_type(&self) -> AttestedKeyType {
        AttestedKeyType::Google
    }

    /// Returns a fresh random key identifier (UUID v4). Does not create a key.
    #[allow(clippy::unused_async)] // async on the foreign side, like the other operations
    pub async fn generate(&self) -> String {
        self.core.identifiers.next_identifier()
    }

    /// Creates a key for `identifier` and attests it.
    ///
    /// The key certificate embeds `challenge`, and the integrity token is bound to the SHA-256
    /// hash of `challenge`. If a step fails after the key was created, the key is deleted
    /// again before the error is returned. The attestation keeps running when the returned
    /// future is dropped, so the keystore is never left with a half attested key.
    ///
    /// # Errors
    ///
    /// - [`AttestedKeyError::PreconditionFailed`] if the device is locked or a key already
    ///   exists for `identifier`.
    /// - [`AttestedKeyError::AdapterFailure`] if the integrity token could not be obtained,
    ///   the keystore failed or the certificate chain is shorter than two certificates.
    pub async fn attest(
        &self,
        identifier: &str,
        challenge: &[u8],
        google_cloud_project_number: u64,
    ) -> Result<AttestationResult, AttestedKeyError> {
        let core = Arc::clone(&self.core);
        let identifier = identifier.to_string();
        let challenge = challenge.to_vec();

        tokio::spawn(async move {
            core.attest(&identifier, challenge, google_cloud_project_number)
                .await
        })
        .await?
    }

    /// Signs `payload` with the key of `identifier`, returning a DER encoded ECDSA signature.
    ///
    /// # Errors
    ///
    /// - [`AttestedKeyError::PreconditionFailed`] if the device is locked or no key exists.
    /// - [`AttestedKeyError::AdapterFailure`] if the keystore failed to sign.
    pub async fn sign(&self, identifier: &str, payload: &[u8]) -> Result<Vec<u8>, AttestedKeyError> {
        self.core.sign(identifier, payload.to_vec()).await
    }

    /// Returns the public key of `identifier` as DER encoded `SubjectPublicKeyInfo`.
    ///
    /// # Errors
    ///
    /// - [`AttestedKeyError::PreconditionFailed`] if no key exists.
    /// - [`AttestedKeyError::AdapterFailure`] if the keystore failed.
    pub async fn public_key(&self, identifier: &str) -> Result<Vec<u8>, AttestedKeyError> {
        self.core.public_key(identifier).await
    }

    /// Deletes the key of `identifier`. Deleting a key that does not exist succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`AttestedKeyError::AdapterFailure`] if an existing key could not be deleted.
    pub async fn delete(&self, identifier: &str) -> Result<(), AttestedKeyError> {
        self.core.delete(identifier).await
    }

    /// Reports the hardware isolation level of the key of `identifier`.
    ///
    /// # Errors
    ///
    /// - [`AttestedKeyError::PreconditionFailed`] if no key exists.
    /// - [`AttestedKeyError::AdapterFailure`] if the keystore failed.
    pub async fn security_tier(&self, identifier: &str) -> Result<SecurityTier, AttestedKeyError> {
        self.core.security_tier(identifier).await
    }

    /// Deletes every key managed by this bridge, i.e. every alias with the configured prefix,
    /// and returns how many were deleted. Other keystore entries are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`AttestedKeyError::AdapterFailure`] if the keystore could not be listed or a
    /// key could not be deleted. Keys deleted before the failure stay deleted.
    pub async fn clean(&self) -> Result<u32, AttestedKeyError> {
        self.core.clean().await
    }
}

impl AttestedKeyBridge {
    /// Like [`AttestedKeyBridge::new`], but [`AttestedKeyBridge::generate`] returns a
    /// reproducible sequence of identifiers derived from `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`AttestedKeyError::AdapterFailure`] if `config` is invalid.
    pub fn with_identifier_seed(
        key_store: Arc<dyn KeyStore>,
        attestation_service: Arc<dyn AttestationService>,
        device_state: Arc<dyn DeviceStateGuard>,
        config: Option<BridgeConfig>,
        seed: u64,
    ) -> AttestedKeyResult<Self> {
        Self::build(
            key_store,
            attestation_service,
            device_state,
            config.unwrap_or_default(),
            IdentifierSource::seeded(seed),
        )
    }

    fn build(
        key_store: Arc<dyn KeyStore>,
        attestation_service: Arc<dyn AttestationService>,
        device_state: Arc<dyn DeviceStateGuard>,
        config: BridgeConfig,
        identifiers: IdentifierSource,
    ) -> AttestedKeyResult<Self> {
        config.validate()?;

        Ok(Self {
            core: Arc::new(BridgeCore {
                key_store,
                device_state,
                tokens: IntegrityTokenCache::new(attestation_service),
                config,
                identifiers,
                claims: Mutex::new(HashSet::new()),
            }),
        })
    }

    /// Creates and attests a key like [`AttestedKeyBridge::attest`], returning a handle to it.
    ///
    /// # Errors
    ///
    /// Fails like [`AttestedKeyBridge::attest`], and with
    /// [`AttestedKeyError::PreconditionFailed`] if a live [`AttestedKey`] already holds
    /// `identifier`. The identifier is released again when attestation fails.
    pub async fn attest_key(
        &self,
        identifier: &str,
        challenge: &[u8],
        google_cloud_project_number: u64,
    ) -> AttestedKeyResult<(AttestedKey, AttestationResult)> {
        let claim = self.core.claim(identifier)?;
        let result = self
            .attest(identifier, challenge, google_cloud_project_number)
            .await?;

        Ok((AttestedKey::new(claim), result))
    }

    /// Returns a handle to the existing key of `identifier`.
    ///
    /// # Errors
    ///
    /// - [`AttestedKeyError::PreconditionFailed`] if no key exists or a live [`AttestedKey`]
    ///   already holds `identifier`.
    /// - [`AttestedKeyError::AdapterFailure`] if the keystore failed.
    pub async fn attested_key(&self, identifier: &str) -> AttestedKeyResult<AttestedKey> {
        let claim = self.core.claim(identifier)?;

        let alias = self.core.alias(identifier);
        let exists = self
            .core
            .with_key_store(move |key_store| key_store.contains_alias(alias))
            .await
            .map_err(|err| err.classify(identifier, "failed to look up the key"))?;
        if !exists {
            return Err(AttestedKeyError::key_not_found(identifier));
        }

        Ok(AttestedKey::new(claim))
    }
}
