//! Scriptable platform doubles for unit tests.

#![cfg_attr(not(feature = "software"), allow(dead_code))]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::RetryPolicy;
use crate::integrity::request_hash;
use crate::platform::{
    AttestationService, AttestationServiceError, AttestationServiceResult, DeviceStateGuard,
    IntegrityTokenProvider,
};

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        min_delay_ms: 1,
        max_delay_ms: 5,
    }
}

type FailureQueue = Arc<Mutex<VecDeque<AttestationServiceError>>>;

/// Attestation service whose next failures can be queued up front.
#[derive(Default)]
pub struct ScriptedAttestationService {
    pub prepare_calls: AtomicU32,
    pub token_calls: Arc<AtomicU32>,
    prepare_delay: Duration,
    prepare_failures: Mutex<VecDeque<AttestationServiceError>>,
    token_failures: FailureQueue,
}

impl ScriptedAttestationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prepare_delay_ms(delay_ms: u64) -> Self {
        Self {
            prepare_delay: Duration::from_millis(delay_ms),
            ..Self::default()
        }
    }

    /// The token handed out for `challenge` by a provider prepared for `cloud_project_number`.
    pub fn token(cloud_project_number: u64, challenge: &[u8]) -> Vec<u8> {
        format!("token:{cloud_project_number}:{}", request_hash(challenge)).into_bytes()
    }

    pub fn fail_prepare(&self, error: AttestationServiceError) {
        self.prepare_failures.lock().unwrap().push_back(error);
    }

    pub fn fail_token(&self, error: AttestationServiceError) {
        self.token_failures.lock().unwrap().push_back(error);
    }
}

impl AttestationService for ScriptedAttestationService {
    fn prepare(
        &self,
        cloud_project_number: u64,
    ) -> AttestationServiceResult<Arc<dyn IntegrityTokenProvider>> {
        self.prepare_calls.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.prepare_delay);

        if let Some(error) = self.prepare_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        Ok(Arc::new(ScriptedTokenProvider {
            cloud_project_number,
            calls: Arc::clone(&self.token_calls),
            failures: Arc::clone(&self.token_failures),
        }))
    }
}

struct ScriptedTokenProvider {
    cloud_project_number: u64,
    calls: Arc<AtomicU32>,
    failures: FailureQueue,
}

impl IntegrityTokenProvider for ScriptedTokenProvider {
    fn request_token(&self, request_hash: String) -> AttestationServiceResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        Ok(format!("token:{}:{request_hash}", self.cloud_project_number).into_bytes())
    }
}

/// Device whose lock state can be flipped by the test.
#[derive(Default)]
pub struct ToggleDevice {
    locked: AtomicBool,
}

impl ToggleDevice {
    pub fn set_locked(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }
}

impl DeviceStateGuard for ToggleDevice {
    fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }
}

#[cfg(feature = "software")]
pub use faulty::FaultyKeyStore;

#[cfg(feature = "software")]
mod faulty {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Condvar, Mutex};

    use crate::platform::{KeyStore, KeyStoreError, KeyStoreResult, SecurityTier};
    use crate::software::SoftwareKeyStore;

    /// Software keystore with switchable faults.
    #[derive(Default)]
    pub struct FaultyKeyStore {
        pub inner: SoftwareKeyStore,
        pub fail_chain: AtomicBool,
        pub short_chain: AtomicBool,
        pub fail_delete: AtomicBool,
        pub fail_create: AtomicBool,
        pub fail_aliases: AtomicBool,
        pub chain_gate: Gate,
    }

    impl FaultyKeyStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    /// Blocks keystore calls on the calling thread while held.
    #[derive(Default)]
    pub struct Gate {
        held: Mutex<bool>,
        opened: Condvar,
        entered: AtomicBool,
    }

    impl Gate {
        pub fn hold(&self) {
            *self.held.lock().unwrap() = true;
        }

        pub fn release(&self) {
            *self.held.lock().unwrap() = false;
            self.opened.notify_all();
        }

        /// Whether a call has reached the gate.
        pub fn is_entered(&self) -> bool {
            self.entered.load(Ordering::SeqCst)
        }

        fn pass(&self) {
            self.entered.store(true, Ordering::SeqCst);
            let held = self.held.lock().unwrap();
            drop(self.opened.wait_while(held, |held| *held).unwrap());
        }
    }

    fn is_set(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }

    impl KeyStore for FaultyKeyStore {
        fn create_key(&self, alias: String, challenge: Vec<u8>) -> KeyStoreResult<()> {
            if is_set(&self.fail_create) {
                return Err(KeyStoreError::Keystore(
                    "key generation failed".to_string(),
                ));
            }
            self.inner.create_key(alias, challenge)
        }

        fn contains_alias(&self, alias: String) -> KeyStoreResult<bool> {
            self.inner.contains_alias(alias)
        }

        fn certificate_chain(&self, alias: String) -> KeyStoreResult<Vec<Vec<u8>>> {
            self.chain_gate.pass();
            if is_set(&self.fail_chain) {
                return Err(KeyStoreError::Keystore("attestation unavailable".to_string()));
            }
            let mut chain = self.inner.certificate_chain(alias)?;
            if is_set(&self.short_chain) {
                chain.truncate(1);
            }
            Ok(chain)
        }

        fn sign(&self, alias: String, payload: Vec<u8>) -> KeyStoreResult<Vec<u8>> {
            self.inner.sign(alias, payload)
        }

        fn public_key(&self, alias: String) -> KeyStoreResult<Vec<u8>> {
            self.inner.public_key(alias)
        }

        fn delete_alias(&self, alias: String) -> KeyStoreResult<()> {
            if is_set(&self.fail_delete) {
                return Err(KeyStoreError::Keystore("keystore busy".to_string()));
            }
            self.inner.delete_alias(alias)
        }

        fn aliases(&self) -> KeyStoreResult<Vec<String>> {
            if is_set(&self.fail_aliases) {
                return Err(KeyStoreError::Keystore("keystore busy".to_string()));
            }
            self.inner.aliases()
        }

        fn security_tier(&self, alias: String) -> KeyStoreResult<SecurityTier> {
            self.inner.security_tier(alias)
        }
    }
}
