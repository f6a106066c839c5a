//! Lifecycle bridge for hardware-backed attested keys.
//!
//! The [`AttestedKeyBridge`] creates, attests, uses and destroys asymmetric keys held by the
//! host platform's keystore. Each key is bound to an attestation statement (a certificate
//! chain plus an app integrity token) that a remote verifier can check.
//!
//! The host supplies three capabilities as foreign trait implementations, see [`platform`]:
//! a [`KeyStore`], an [`AttestationService`] and a [`DeviceStateGuard`]. Every failure that
//! crosses the bridge boundary is one of the two [`AttestedKeyError`] kinds.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use attestkit_core::software::{SoftwareAttestationService, SoftwareKeyStore, UnlockedDevice};
//! use attestkit_core::AttestedKeyBridge;
//!
//! let bridge = AttestedKeyBridge::new(
//!     Arc::new(SoftwareKeyStore::new()),
//!     Arc::new(SoftwareAttestationService::new()),
//!     Arc::new(UnlockedDevice),
//!     None,
//! )?;
//!
//! let identifier = bridge.generate().await;
//! let result = bridge.attest(&identifier, b"challenge", 12_143_997_365).await?;
//! let signature = bridge.sign(&identifier, b"payload").await?;
//! ```

#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

mod bridge;
pub use bridge::*;

mod config;
pub use config::*;

mod error;
pub use error::*;

mod key;
pub use key::AttestedKey;

pub mod logger;

pub mod platform;
pub use platform::{
    AttestationService, AttestationServiceError, DeviceStateGuard, IntegrityTokenProvider,
    KeyStore, KeyStoreError, SecurityTier,
};

/// In-memory platform implementations for development builds and tests.
#[cfg(feature = "software")]
pub mod software;

// private modules
mod identifier;
mod integrity;
mod retry;

#[cfg(test)]
mod test_utils;

uniffi::setup_scaffolding!("attestkit_core");
