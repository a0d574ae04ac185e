//! Content digests for generated artifacts.

use sha2::{Digest, Sha256};

/// SHA-256 hex digest of artifact text.
///
/// Used to tell attempts apart in the run history without storing every
/// rejected candidate.
pub fn artifact_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
