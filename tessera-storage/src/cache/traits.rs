//! Cache backend trait.

use async_trait::async_trait;
use serde::Serialize;
use tessera_core::{CacheEntry, ProcessId, TenantId, TesseraResult, Timestamp};

use super::tenant_key::TenantScopedKey;

/// Pluggable storage for cache entries.
///
/// Backends store and return entries verbatim; expiry and version-stamp
/// checks are applied by [`ResponseCache`](super::ResponseCache) at read
/// time, so a backend that never purges still serves correctly.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &TenantScopedKey) -> TesseraResult<Option<CacheEntry>>;

    /// Insert or replace the entry under its own key.
    async fn put(&self, entry: &CacheEntry) -> TesseraResult<()>;

    /// Remove every entry of one process regardless of TTL. Returns the
    /// number of entries removed.
    async fn invalidate_process(&self, tenant_id: TenantId, process_id: ProcessId)
        -> TesseraResult<u64>;

    /// Remove entries with `expires_at <= now`. Storage hygiene only.
    async fn purge_expired(&self, now: Timestamp) -> TesseraResult<u64>;

    async fn stats(&self) -> TesseraResult<CacheStats>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that fell through to the provider.
    pub misses: u64,
    /// Entries currently stored, expired ones included until purged.
    pub entry_count: u64,
    /// Process-wide wipes performed by promotion and rollback.
    pub invalidations: u64,
    /// Entries removed by the expiry reaper.
    pub purged: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
