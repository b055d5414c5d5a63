//! Reference identifier generation.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Random characters after the `TXN-` prefix.
pub const REFERENCE_LEN: usize = 12;

/// Generate a reference identifier, e.g. `TXN-9F3KQ0X7B2LM`.
///
/// Uppercase alphanumeric keeps it legible for support correlation.
/// Uniqueness is enforced by the transaction log; a storage collision
/// surfaces as a retryable error and the engine draws a fresh identifier.
pub fn generate() -> String {
    let body: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REFERENCE_LEN)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect();
    format!("TXN-{body}")
}
