//! Cached response entries.

use crate::{Fingerprint, ProcessId, TenantId, Timestamp, VersionNumber};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound applied to any requested TTL (ten years).
const MAX_ENTRY_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// A memoized response for one exact input.
///
/// Valid only while `now < expires_at` and while the version that produced
/// it is still the one being served. The second half is enforced by the
/// promotion/rollback cache wipe and by the `version_number` stamp check on
/// read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub tenant_id: TenantId,
    pub process_id: ProcessId,
    pub version_number: VersionNumber,
    pub payload: Value,
    pub cached_at: Timestamp,
    pub expires_at: Timestamp,
}

impl CacheEntry {
    pub fn new(
        tenant_id: TenantId,
        process_id: ProcessId,
        fingerprint: Fingerprint,
        version_number: VersionNumber,
        payload: Value,
        ttl_secs: u64,
        now: Timestamp,
    ) -> Self {
        let secs = i64::try_from(ttl_secs)
            .unwrap_or(MAX_ENTRY_TTL_SECS)
            .min(MAX_ENTRY_TTL_SECS);
        let ttl = chrono::Duration::seconds(secs);
        Self {
            fingerprint,
            tenant_id,
            process_id,
            version_number,
            payload,
            cached_at: now,
            expires_at: now + ttl,
        }
    }

    /// An entry is expired once `now >= expires_at`.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// Servable for a request resolved to `version_number` at `now`.
    pub fn is_valid_for(&self, version_number: VersionNumber, now: Timestamp) -> bool {
        !self.is_expired(now) && self.version_number == version_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn entry(ttl: u64) -> CacheEntry {
        CacheEntry::new(
            Uuid::now_v7(),
            Uuid::now_v7(),
            Fingerprint::from_hex("abc"),
            3,
            json!({"answer": 42}),
            ttl,
            Utc::now(),
        )
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let e = entry(900);
        assert!(!e.is_expired(e.cached_at));
        assert!(!e.is_expired(e.expires_at - Duration::milliseconds(1)));
        assert!(e.is_expired(e.expires_at));
    }

    #[test]
    fn test_version_stamp_must_match() {
        let e = entry(60);
        assert!(e.is_valid_for(3, e.cached_at));
        assert!(!e.is_valid_for(4, e.cached_at));
    }
}
