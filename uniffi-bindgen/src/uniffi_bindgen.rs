//! Generates Kotlin and Swift bindings for the `attestkit` library.

fn main() {
    uniffi::uniffi_bindgen_main();
}
