//! One-way digest collaborator: SHA-256 over the value and its salt.

use sha2::{Digest, Sha256};

/// Deterministic digest of `value` under `salt`, hex-encoded. The server
/// never reverses it; login verification is digest comparison.
pub fn hash(value: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}
