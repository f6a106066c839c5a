use std::sync::{Mutex, PoisonError};

use rand::{rngs::StdRng, RngCore, SeedableRng};
use uuid::{Builder, Uuid};

/// Source of fresh key identifiers.
pub(crate) enum IdentifierSource {
    /// UUID v4 from the OS random number generator.
    Random,
    /// UUID v4 from a seeded generator, for reproducible tests.
    Seeded(Mutex<StdRng>),
}

impl IdentifierSource {
    pub(crate) fn seeded(seed: u64) -> Self {
        Self::Seeded(Mutex::new(StdRng::seed_from_u64(seed)))
    }

    pub(crate) fn next_identifier(&self) -> String {
        match self {
            Self::Random => Uuid::new_v4().to_string(),
            Self::Seeded(rng) => {
                let mut bytes = [0u8; 16];
                rng.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .fill_bytes(&mut bytes);
                Builder::from_random_bytes(bytes).into_uuid().to_string()
            }
        }
    }
}

/// Derives the keystore alias for a caller identifier.
pub(crate) fn key_alias(prefix: &str, identifier: &str) -> String {
    format!("{prefix}{identifier}")
}
