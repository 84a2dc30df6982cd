//! Content hashing for sync operations.
//!
//! SHA256 fingerprints let the dry-run planner tell an update from a no-op
//! without comparing every field, and give each backup file a checksum.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Hex SHA256 of arbitrary bytes.
#[must_use]
pub fn bytes_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Hex SHA256 of a document payload.
///
/// Object keys serialize in sorted order, so equal payloads hash equally
/// regardless of how they were built.
#[must_use]
pub fn content_hash(payload: &Map<String, Value>) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in payload {
        hasher.update(key.as_bytes());
        hasher.update([0]);
        hasher.update(value.to_string().as_bytes());
        hasher.update([0]);
    }
    format!("{:x}", hasher.finalize())
}

/// Whether a stored payload differs from the incoming one.
///
/// Returns `true` when there is no stored hash (the document is new).
#[must_use]
pub fn has_changed(current_hash: &str, stored_hash: Option<&str>) -> bool {
    stored_hash.is_none_or(|h| h != current_hash)
}
