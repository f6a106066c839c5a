#![cfg(feature = "software")]

//! Common test utilities shared across integration tests.

use std::sync::{Arc, Mutex};

use attestkit_core::logger::{LogLevel, Logger};
use attestkit_core::software::{SoftwareAttestationService, SoftwareKeyStore, UnlockedDevice};
use attestkit_core::{AttestedKeyBridge, BridgeConfig, RetryPolicy};

/// Google Cloud project number used by the Android instrumented tests.
pub const PROJECT_NUMBER: u64 = 12_143_997_365;

/// A bridge over the software platform, with access to its keystore and attestation service.
pub struct SoftwarePlatform {
    /// The bridge under test.
    pub bridge: AttestedKeyBridge,
    /// The keystore backing `bridge`.
    pub key_store: Arc<SoftwareKeyStore>,
    /// The attestation service backing `bridge`.
    pub attestation_service: Arc<SoftwareAttestationService>,
}

/// Builds a bridge over a fresh software platform, with near-instant retries.
pub fn software_platform() -> SoftwarePlatform {
    let key_store = Arc::new(SoftwareKeyStore::new());
    let attestation_service = Arc::new(SoftwareAttestationService::new());
    let config = BridgeConfig {
        retry: RetryPolicy {
            max_retries: 1,
            min_delay_ms: 1,
            max_delay_ms: 1,
        },
        ..BridgeConfig::default()
    };
    let bridge = AttestedKeyBridge::new(
        key_store.clone(),
        attestation_service.clone(),
        Arc::new(UnlockedDevice),
        Some(config),
    )
    .expect("valid config");

    SoftwarePlatform {
        bridge,
        key_store,
        attestation_service,
    }
}

/// Logger keeping every forwarded record in memory.
#[derive(Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingLogger {
    /// Returns the records forwarded so far, oldest first.
    pub fn records(&self) -> Vec<(LogLevel, String)> {
        self.records.lock().unwrap().clone()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: LogLevel, message: String) {
        self.records.lock().unwrap().push((level, message));
    }
}

/// Returns whether `needle` occurs anywhere in `haystack`.
pub fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
