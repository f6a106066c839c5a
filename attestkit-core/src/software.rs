//! In-memory implementations of the platform traits.
//!
//! These implementations provide NO hardware binding: private keys live in process memory
//! and the attestation root is generated on the fly, so no remote verifier will trust the
//! resulting statements. They exist for development builds and for testing the bridge
//! without a device.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use der::asn1::{Any, OctetString};
use der::{Encode, Enumerated, Sequence, Tag};
use p256::ecdsa::signature::RandomizedSigner;
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::{DecodePrivateKey, EncodePublicKey};
use rand::rngs::OsRng;
use rcgen::{BasicConstraints, CertificateParams, CustomExtension, DnType, IsCa, KeyPair};

use crate::platform::{
    AttestationService, AttestationServiceResult, DeviceStateGuard, IntegrityTokenProvider,
    KeyStore, KeyStoreError, KeyStoreResult, SecurityTier,
};

/// OID of the Android key attestation extension, which carries the attestation challenge.
pub const KEY_ATTESTATION_OID: &[u64] = &[1, 3, 6, 1, 4, 1, 11129, 2, 1, 17];

/// Attestation and KeyMint version reported for software keys (KeyMint 3).
const KEY_MINT_VERSION: u32 = 300;

/// `SecurityLevel ::= ENUMERATED`. Software keys only ever report `Software`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enumerated)]
#[repr(u32)]
enum SecurityLevel {
    Software = 0,
}

/// `KeyDescription ::= SEQUENCE`, the content of the key attestation extension.
///
/// Both authorization lists are empty.
#[derive(Sequence)]
struct KeyDescription {
    attestation_version: u32,
    attestation_security_level: SecurityLevel,
    key_mint_version: u32,
    key_mint_security_level: SecurityLevel,
    attestation_challenge: OctetString,
    unique_id: OctetString,
    software_enforced: Any,
    hardware_enforced: Any,
}

impl KeyDescription {
    fn software(challenge: &[u8]) -> der::Result<Self> {
        Ok(Self {
            attestation_version: KEY_MINT_VERSION,
            attestation_security_level: SecurityLevel::Software,
            key_mint_version: KEY_MINT_VERSION,
            key_mint_security_level: SecurityLevel::Software,
            attestation_challenge: OctetString::new(challenge)?,
            unique_id: OctetString::new(Vec::new())?,
            software_enforced: Any::new(Tag::Sequence, Vec::new())?,
            hardware_enforced: Any::new(Tag::Sequence, Vec::new())?,
        })
    }
}

struct SoftwareKey {
    signing_key: SigningKey,
    certificate_chain: Vec<Vec<u8>>,
}

/// Keystore holding P-256 keys in memory.
///
/// Each key comes with a two certificate chain: a leaf for the key, carrying the challenge
/// in the [`KEY_ATTESTATION_OID`] extension, issued by a throwaway root.
#[derive(Default)]
pub struct SoftwareKeyStore {
    keys: RwLock<HashMap<String, SoftwareKey>>,
}

impl SoftwareKeyStore {
    /// Creates an empty keystore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if the keystore holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_key<T>(
        &self,
        alias: &str,
        f: impl FnOnce(&SoftwareKey) -> KeyStoreResult<T>,
    ) -> KeyStoreResult<T> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.get(alias).map_or(Err(KeyStoreError::KeyNotFound), f)
    }
}

impl KeyStore for SoftwareKeyStore {
    fn create_key(&self, alias: String, challenge: Vec<u8>) -> KeyStoreResult<()> {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        if keys.contains_key(&alias) {
            return Err(KeyStoreError::KeyAlreadyExists);
        }

        let key = generate_attested_key(&challenge)?;
        keys.insert(alias, key);

        Ok(())
    }

    fn contains_alias(&self, alias: String) -> KeyStoreResult<bool> {
        Ok(self
            .keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&alias))
    }

    fn certificate_chain(&self, alias: String) -> KeyStoreResult<Vec<Vec<u8>>> {
        self.with_key(&alias, |key| Ok(key.certificate_chain.clone()))
    }

    fn sign(&self, alias: String, payload: Vec<u8>) -> KeyStoreResult<Vec<u8>> {
        self.with_key(&alias, |key| {
            // Randomized, like hardware keystores: equal payloads give different signatures.
            let signature: Signature = key.signing_key.sign_with_rng(&mut OsRng, &payload);
            Ok(signature.to_der().as_bytes().to_vec())
        })
    }

    fn public_key(&self, alias: String) -> KeyStoreResult<Vec<u8>> {
        self.with_key(&alias, |key| {
            let document = key
                .signing_key
                .verifying_key()
                .to_public_key_der()
                .map_err(|err| KeyStoreError::Keystore(format!("public key encoding: {err}")))?;
            Ok(document.as_bytes().to_vec())
        })
    }

    fn delete_alias(&self, alias: String) -> KeyStoreResult<()> {
        self.keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&alias);
        Ok(())
    }

    fn aliases(&self) -> KeyStoreResult<Vec<String>> {
        Ok(self
            .keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect())
    }

    fn security_tier(&self, alias: String) -> KeyStoreResult<SecurityTier> {
        self.with_key(&alias, |_| Ok(SecurityTier::Software))
    }
}

fn generate_attested_key(challenge: &[u8]) -> KeyStoreResult<SoftwareKey> {
    let certificate_error =
        |err: rcgen::Error| KeyStoreError::Keystore(format!("certificate: {err}"));

    let mut root_params = CertificateParams::default();
    root_params
        .distinguished_name
        .push(DnType::CommonName, "AttestKit Software Attestation Root");
    root_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let root_key = KeyPair::generate().map_err(certificate_error)?;
    let root = root_params.self_signed(&root_key).map_err(certificate_error)?;

    let description_error =
        |err: der::Error| KeyStoreError::Keystore(format!("key description: {err}"));
    let key_description = KeyDescription::software(challenge)
        .map_err(description_error)?
        .to_der()
        .map_err(description_error)?;

    let mut leaf_params = CertificateParams::default();
    leaf_params
        .distinguished_name
        .push(DnType::CommonName, "AttestKit Software Key");
    leaf_params
        .custom_extensions
        .push(CustomExtension::from_oid_content(
            KEY_ATTESTATION_OID,
            key_description,
        ));
    let leaf_key = KeyPair::generate().map_err(certificate_error)?;
    let leaf = leaf_params
        .signed_by(&leaf_key, &root, &root_key)
        .map_err(certificate_error)?;

    let signing_key = SigningKey::from_pkcs8_der(&leaf_key.serialize_der())
        .map_err(|err| KeyStoreError::Keystore(format!("private key decoding: {err}")))?;

    Ok(SoftwareKey {
        signing_key,
        certificate_chain: vec![leaf.der().to_vec(), root.der().to_vec()],
    })
}

/// Attestation service issuing unsigned, deterministic tokens.
///
/// The token for a request is `software-integrity-token:<project number>:<request hash>`.
#[derive(Debug, Default)]
pub struct SoftwareAttestationService {
    prepare_calls: AtomicU32,
}

impl SoftwareAttestationService {
    /// Creates a new service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many token providers were prepared so far.
    #[must_use]
    pub fn prepare_count(&self) -> u32 {
        self.prepare_calls.load(Ordering::SeqCst)
    }
}

impl AttestationService for SoftwareAttestationService {
    fn prepare(
        &self,
        cloud_project_number: u64,
    ) -> AttestationServiceResult<Arc<dyn IntegrityTokenProvider>> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(SoftwareTokenProvider {
            cloud_project_number,
        }))
    }
}

struct SoftwareTokenProvider {
    cloud_project_number: u64,
}

impl IntegrityTokenProvider for SoftwareTokenProvider {
    fn request_token(&self, request_hash: String) -> AttestationServiceResult<Vec<u8>> {
        Ok(format!(
            "software-integrity-token:{}:{request_hash}",
            self.cloud_project_number
        )
        .into_bytes())
    }
}

/// A device that is never locked.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlockedDevice;

impl DeviceStateGuard for UnlockedDevice {
    fn is_locked(&self) -> bool {
        false
    }
}
