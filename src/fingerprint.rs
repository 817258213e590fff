//! Content fingerprinting.
//!
//! A fingerprint is the SHA-256 hex digest of a file's raw bytes. It is the
//! sole cache key for ingestion: identical bytes always produce the same
//! fingerprint, so an unchanged file is never re-processed.

use sha2::{Digest, Sha256};

/// Compute the content fingerprint for a byte slice.
///
/// Total over any input, including empty. Pure and deterministic.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
