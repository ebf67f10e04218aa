//! In-memory backend for the version store and the response cache.
//!
//! Versions and cache entries live behind one lock so that a promotion's
//! cache wipe commits together with its version writes. Transactions work
//! on a private snapshot of one process and apply it at commit if no other
//! transaction committed to that process in the meantime.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tessera_core::{
    CacheEntry, Environment, ProcessId, StorageError, TenantId, TesseraResult, Timestamp, Version,
    VersionId, VersionNumber, VersionStatus,
};
use tracing::{debug, warn};

use crate::cache::{CacheStats, CacheStore, TenantScopedKey};
use crate::{VersionStore, VersionTransaction};

const ONE_ACTIVE_CONSTRAINT: &str = "versions_one_active_per_environment";
const VERSION_NUMBER_CONSTRAINT: &str = "versions_process_id_version_number_key";

#[derive(Debug, Default, Clone)]
struct ProcessHistory {
    /// Bumped on every committed write.
    revision: u64,
    /// Ordered by version number.
    versions: Vec<Version>,
}

#[derive(Debug, Default)]
struct MemoryState {
    processes: HashMap<(TenantId, ProcessId), ProcessHistory>,
    cache: BTreeMap<Vec<u8>, CacheEntry>,
    invalidations: u64,
    purged: u64,
}

impl MemoryState {
    fn wipe_process_cache(&mut self, tenant_id: TenantId, process_id: ProcessId) -> u64 {
        let prefix = TenantScopedKey::process_prefix(tenant_id, process_id);
        let doomed: Vec<Vec<u8>> = self
            .cache
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.cache.remove(key);
        }
        self.invalidations += 1;
        doomed.len() as u64
    }
}

/// In-memory store implementing [`VersionStore`] and [`CacheStore`].
///
/// Cloning is cheap and clones share state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, StorageError> {
        self.state.read().map_err(|_| StorageError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, StorageError> {
        self.state.write().map_err(|_| StorageError::LockPoisoned)
    }

    fn with_history<T>(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
        f: impl FnOnce(&[Version]) -> T,
    ) -> TesseraResult<T> {
        let state = self.read()?;
        let versions = state
            .processes
            .get(&(tenant_id, process_id))
            .map(|h| h.versions.as_slice())
            .unwrap_or(&[]);
        Ok(f(versions))
    }
}

#[async_trait]
impl VersionStore for InMemoryStore {
    async fn begin(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
    ) -> TesseraResult<Box<dyn VersionTransaction>> {
        let history = {
            let state = self.read()?;
            state
                .processes
                .get(&(tenant_id, process_id))
                .cloned()
                .unwrap_or_default()
        };
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            tenant_id,
            process_id,
            base_revision: history.revision,
            versions: history.versions,
            dirty: false,
            wipe_cache: false,
        }))
    }

    async fn find_active(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
        environment: Environment,
    ) -> TesseraResult<Option<Version>> {
        self.with_history(tenant_id, process_id, |versions| {
            versions
                .iter()
                .find(|v| v.environment == environment && v.is_active())
                .cloned()
        })
    }

    async fn find_by_number(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
        version_number: VersionNumber,
    ) -> TesseraResult<Option<Version>> {
        self.with_history(tenant_id, process_id, |versions| {
            versions
                .iter()
                .find(|v| v.version_number == version_number)
                .cloned()
        })
    }

    async fn list(&self, tenant_id: TenantId, process_id: ProcessId) -> TesseraResult<Vec<Version>> {
        self.with_history(tenant_id, process_id, |versions| {
            versions.iter().rev().cloned().collect()
        })
    }

    async fn version_get(
        &self,
        tenant_id: TenantId,
        version_id: VersionId,
    ) -> TesseraResult<Option<Version>> {
        let state = self.read()?;
        Ok(state
            .processes
            .iter()
            .filter(|((tenant, _), _)| *tenant == tenant_id)
            .flat_map(|(_, history)| history.versions.iter())
            .find(|v| v.version_id == version_id)
            .cloned())
    }

    async fn ping(&self) -> TesseraResult<()> {
        self.read()?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for InMemoryStore {
    async fn get(&self, key: &TenantScopedKey) -> TesseraResult<Option<CacheEntry>> {
        let state = self.read()?;
        Ok(state.cache.get(&key.encode()).cloned())
    }

    async fn put(&self, entry: &CacheEntry) -> TesseraResult<()> {
        let mut state = self.write()?;
        state
            .cache
            .insert(TenantScopedKey::for_entry(entry).encode(), entry.clone());
        Ok(())
    }

    async fn invalidate_process(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
    ) -> TesseraResult<u64> {
        let mut state = self.write()?;
        Ok(state.wipe_process_cache(tenant_id, process_id))
    }

    async fn purge_expired(&self, now: Timestamp) -> TesseraResult<u64> {
        let mut state = self.write()?;
        let before = state.cache.len();
        state.cache.retain(|_, entry| !entry.is_expired(now));
        let removed = (before - state.cache.len()) as u64;
        state.purged += removed;
        Ok(removed)
    }

    async fn stats(&self) -> TesseraResult<CacheStats> {
        let state = self.read()?;
        Ok(CacheStats {
            entry_count: state.cache.len() as u64,
            invalidations: state.invalidations,
            purged: state.purged,
            ..CacheStats::default()
        })
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// Snapshot transaction over one process.
#[derive(Debug)]
pub struct MemoryTransaction {
    state: Arc<RwLock<MemoryState>>,
    tenant_id: TenantId,
    process_id: ProcessId,
    base_revision: u64,
    versions: Vec<Version>,
    dirty: bool,
    wipe_cache: bool,
}

impl MemoryTransaction {
    /// Constraints the backing table would enforce on the snapshot.
    fn check_constraints(&self) -> Result<(), StorageError> {
        for env in Environment::ALL {
            let active = self
                .versions
                .iter()
                .filter(|v| v.environment == env && v.status == VersionStatus::Active)
                .count();
            if active > 1 {
                return Err(StorageError::UniqueViolation {
                    constraint: ONE_ACTIVE_CONSTRAINT.to_string(),
                });
            }
        }
        let mut numbers: Vec<VersionNumber> =
            self.versions.iter().map(|v| v.version_number).collect();
        numbers.sort_unstable();
        if numbers.windows(2).any(|w| w[0] == w[1]) {
            return Err(StorageError::UniqueViolation {
                constraint: VERSION_NUMBER_CONSTRAINT.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VersionTransaction for MemoryTransaction {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn process_id(&self) -> ProcessId {
        self.process_id
    }

    async fn versions(&mut self) -> TesseraResult<Vec<Version>> {
        Ok(self.versions.clone())
    }

    async fn version_get(&mut self, version_id: VersionId) -> TesseraResult<Option<Version>> {
        Ok(self
            .versions
            .iter()
            .find(|v| v.version_id == version_id)
            .cloned())
    }

    async fn active_version(&mut self, environment: Environment) -> TesseraResult<Option<Version>> {
        Ok(self
            .versions
            .iter()
            .find(|v| v.environment == environment && v.is_active())
            .cloned())
    }

    async fn max_version_number(&mut self) -> TesseraResult<Option<VersionNumber>> {
        Ok(self.versions.iter().map(|v| v.version_number).max())
    }

    async fn version_insert(&mut self, version: &Version) -> TesseraResult<()> {
        if !version.belongs_to(self.tenant_id, self.process_id) {
            return Err(StorageError::Backend {
                reason: format!(
                    "version {} does not belong to the transaction's process",
                    version.version_id
                ),
            }
            .into());
        }
        let pos = self
            .versions
            .partition_point(|v| v.version_number <= version.version_number);
        self.versions.insert(pos, version.clone());
        self.dirty = true;
        Ok(())
    }

    async fn version_deprecate(&mut self, version_id: VersionId, at: Timestamp) -> TesseraResult<()> {
        let version = self
            .versions
            .iter_mut()
            .find(|v| v.version_id == version_id)
            .ok_or_else(|| StorageError::Backend {
                reason: format!("version {} not found in transaction", version_id),
            })?;
        version.deprecate(at);
        self.dirty = true;
        Ok(())
    }

    async fn cache_invalidate_process(&mut self) -> TesseraResult<()> {
        self.wipe_cache = true;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> TesseraResult<()> {
        let this = *self;
        if !this.dirty && !this.wipe_cache {
            return Ok(());
        }
        this.check_constraints()?;

        let mut state = this.state.write().map_err(|_| StorageError::LockPoisoned)?;
        let history = state
            .processes
            .entry((this.tenant_id, this.process_id))
            .or_default();

        if history.revision != this.base_revision {
            warn!(
                tenant_id = %this.tenant_id,
                process_id = %this.process_id,
                base_revision = this.base_revision,
                current_revision = history.revision,
                "Transaction lost a race to a concurrent commit"
            );
            return Err(StorageError::TransactionConflict {
                process_id: this.process_id,
            }
            .into());
        }

        history.versions = this.versions;
        history.revision += 1;
        let revision = history.revision;

        let wiped = if this.wipe_cache {
            state.wipe_process_cache(this.tenant_id, this.process_id)
        } else {
            0
        };

        debug!(
            tenant_id = %this.tenant_id,
            process_id = %this.process_id,
            revision,
            cache_entries_wiped = wiped,
            "Transaction committed"
        );
        Ok(())
    }

    async fn abort(self: Box<Self>) {
        debug!(
            tenant_id = %self.tenant_id,
            process_id = %self.process_id,
            "Transaction aborted"
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use serde_json::json;
    use tessera_core::VersionConfig;
    use uuid::Uuid;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Whatever sequence of "deprecate current, insert next" commits
        /// runs, each environment keeps at most one ACTIVE version and
        /// version numbers stay unique.
        #[test]
        fn prop_one_active_per_environment(envs in proptest::collection::vec(any::<bool>(), 1..20)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let store = InMemoryStore::new();
                let (t, p) = (Uuid::now_v7(), Uuid::now_v7());
                for is_prod in envs {
                    let env = if is_prod { Environment::Production } else { Environment::Sandbox };
                    let mut tx = store.begin(t, p).await.unwrap();
                    let next = tx.max_version_number().await.unwrap().unwrap_or(0) + 1;
                    if let Some(current) = tx.active_version(env).await.unwrap() {
                        tx.version_deprecate(current.version_id, Utc::now()).await.unwrap();
                    }
                    let v = Version::new_active(
                        t, p, next, VersionConfig::new(json!({})), env, Utc::now(), None,
                    );
                    tx.version_insert(&v).await.unwrap();
                    tx.commit().await.unwrap();
                }

                let all = store.list(t, p).await.unwrap();
                for env in Environment::ALL {
                    let active = all.iter().filter(|v| v.environment == env && v.is_active()).count();
                    assert!(active <= 1);
                }
                let mut numbers: Vec<_> = all.iter().map(|v| v.version_number).collect();
                numbers.reverse();
                let expected: Vec<_> = (1..=numbers.len() as i32).collect();
                assert_eq!(numbers, expected);
            });
        }
    }
}
