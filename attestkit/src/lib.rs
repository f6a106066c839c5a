//! `attestkit` is the package shipped to Kotlin and Swift consumers.
//!
//! All functionality lives in [`attestkit_core`]; this crate re-exports it, together with its
//! `UniFFI` scaffolding, so the generated bindings and the native library share one name.

pub use attestkit_core::*;

attestkit_core::uniffi_reexport_scaffolding!();
