//! Read-through response cache.
//!
//! Routes a request's lookup to the backend, applies the expiry and
//! version-stamp checks, and on a miss computes the payload and writes it
//! back under the resolved version's number.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tessera_core::{
    CacheEntry, Clock, Fingerprint, ProcessId, TenantId, TesseraResult, VersionNumber,
};
use tracing::{debug, warn};

use super::freshness::CacheRead;
use super::tenant_key::TenantScopedKey;
use super::traits::{CacheStats, CacheStore};

/// Response cache with TTL and version-stamp read contract.
///
/// Entries are stored per producing version, so traffic resolving to
/// different versions of one process never evicts each other. An entry is
/// served only if `now < expires_at` and its stamped `version_number`
/// equals the version the request resolved to.
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> &dyn CacheStore {
        self.store.as_ref()
    }

    /// Look up a cached payload for a request resolved to `version_number`.
    pub async fn get(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
        fingerprint: &Fingerprint,
        version_number: VersionNumber,
    ) -> TesseraResult<Option<CacheRead<Value>>> {
        let key = TenantScopedKey::new(tenant_id, process_id, version_number, fingerprint.clone());
        let now = self.clock.now();

        match self.store.get(&key).await? {
            Some(entry) if entry.is_valid_for(version_number, now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(CacheRead::from_cache(
                    entry.payload,
                    entry.cached_at,
                    entry.version_number,
                )))
            }
            Some(entry) => {
                debug!(
                    %tenant_id,
                    %process_id,
                    cached_version = entry.version_number,
                    version_number,
                    expired = entry.is_expired(now),
                    "Cache entry not servable"
                );
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Store a payload. `ttl_secs == 0` disables caching and is a no-op.
    ///
    /// Returns whether an entry was written.
    pub async fn set(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
        fingerprint: &Fingerprint,
        version_number: VersionNumber,
        payload: Value,
        ttl_secs: u64,
    ) -> TesseraResult<bool> {
        if ttl_secs == 0 {
            return Ok(false);
        }
        let entry = CacheEntry::new(
            tenant_id,
            process_id,
            fingerprint.clone(),
            version_number,
            payload,
            ttl_secs,
            self.clock.now(),
        );
        self.store.put(&entry).await?;
        Ok(true)
    }

    /// Serve from cache, or compute with `compute` and cache the result.
    ///
    /// With `ttl_secs == 0` the cache is bypassed entirely. A failed write
    /// after a successful computation is logged and the computed payload is
    /// still returned.
    #[allow(clippy::too_many_arguments)]
    pub async fn read_through<F, Fut>(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
        fingerprint: &Fingerprint,
        version_number: VersionNumber,
        ttl_secs: u64,
        compute: F,
    ) -> TesseraResult<CacheRead<Value>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = TesseraResult<Value>> + Send,
    {
        if ttl_secs > 0 {
            if let Some(hit) = self
                .get(tenant_id, process_id, fingerprint, version_number)
                .await?
            {
                return Ok(hit);
            }
        }

        let payload = compute().await?;
        let computed_at = self.clock.now();

        if let Err(e) = self
            .set(
                tenant_id,
                process_id,
                fingerprint,
                version_number,
                payload.clone(),
                ttl_secs,
            )
            .await
        {
            warn!(%tenant_id, %process_id, version_number, error = %e, "Cache write failed");
        }

        Ok(CacheRead::from_origin(payload, computed_at, version_number))
    }

    /// Delete expired entries as of the injected clock's `now`.
    pub async fn purge_expired(&self) -> TesseraResult<u64> {
        self.store.purge_expired(self.clock.now()).await
    }

    /// Backend statistics merged with this instance's hit/miss counters.
    pub async fn stats(&self) -> TesseraResult<CacheStats> {
        let mut stats = self.store.stats().await?;
        stats.hits = self.hits.load(Ordering::Relaxed);
        stats.misses = self.misses.load(Ordering::Relaxed);
        Ok(stats)
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("clock", &self.clock)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish()
    }
}
