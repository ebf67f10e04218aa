//! Identity types for Tessera entities

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Tenant that owns processes, versions and cache rows.
pub type TenantId = Uuid;

/// A tenant's logical intelligence definition; parent of versions.
pub type ProcessId = Uuid;

/// Opaque, immutable identifier of one version record.
pub type VersionId = Uuid;

/// Per-process version number. Positive, strictly increasing, never reused.
pub type VersionNumber = i32;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 content hash.
pub type ContentHash = [u8; 32];

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_ids_are_sortable() {
        let a = new_entity_id();
        let b = new_entity_id();
        assert_ne!(a, b);
        assert!(a <= b);
    }

    #[test]
    fn test_content_hash_is_deterministic() {
        assert_eq!(compute_content_hash(b"abc"), compute_content_hash(b"abc"));
        assert_ne!(compute_content_hash(b"abc"), compute_content_hash(b"abd"));
    }
}
