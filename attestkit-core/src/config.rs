use std::time::Duration;

use backon::ExponentialBuilder;

use crate::error::{AttestedKeyError, AttestedKeyResult};

/// Alias prefix used when none is configured. Android signing keys that are not attested
/// use a different prefix, so the two never collide.
pub const DEFAULT_ALIAS_PREFIX: &str = "ecdsa_";

/// Retry policy for the network bound attestation steps (provider warm-up and token request).
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds. Doubles on each following retry.
    pub min_delay_ms: u64,
    /// Upper bound for the delay between retries, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3, // total attempts = 4
            min_delay_ms: 200,
            max_delay_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    pub(crate) fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.min_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_max_times(self.max_retries as usize)
    }
}

/// Configuration of an [`crate::AttestedKeyBridge`].
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Record)]
pub struct BridgeConfig {
    /// Prefix prepended to caller identifiers to form keystore aliases. Every alias with this
    /// prefix is considered owned by the bridge (see [`crate::AttestedKeyBridge::clean`]).
    pub alias_prefix: String,
    /// Retry policy for the attestation service.
    pub retry: RetryPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            alias_prefix: DEFAULT_ALIAS_PREFIX.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl BridgeConfig {
    /// Checks that the configuration can be used by a bridge.
    ///
    /// # Errors
    ///
    /// Returns [`AttestedKeyError::AdapterFailure`] if the alias prefix is empty or the
    /// minimum retry delay exceeds the maximum.
    pub fn validate(&self) -> AttestedKeyResult<()> {
        if self.alias_prefix.is_empty() {
            return Err(AttestedKeyError::AdapterFailure(
                "invalid bridge config: alias prefix must not be empty".to_string(),
            ));
        }
        if self.retry.min_delay_ms > self.retry.max_delay_ms {
            return Err(AttestedKeyError::AdapterFailure(format!(
                "invalid bridge config: min retry delay ({} ms) exceeds max retry delay ({} ms)",
                self.retry.min_delay_ms, self.retry.max_delay_ms
            )));
        }
        Ok(())
    }
}
