//! Tessera Storage - Version Store and Response Cache
//!
//! Defines the transactional version store abstraction, the tenant-scoped
//! response cache, and an in-memory backend implementing both over one
//! shared state. The PostgreSQL backend lives in tessera-api.

pub mod cache;
pub mod memory;

pub use cache::{CacheRead, CacheStats, CacheStore, ResponseCache, TenantScopedKey};
pub use memory::{InMemoryStore, MemoryTransaction};

use async_trait::async_trait;
use tessera_core::{
    Environment, ProcessId, TenantId, TesseraResult, Timestamp, Version, VersionId, VersionNumber,
};

// ============================================================================
// TRANSACTIONS
// ============================================================================

/// A unit of work over one process's version history.
///
/// Every read observes a consistent snapshot of the process. Nothing written
/// through the transaction is visible to other readers until [`commit`]
/// succeeds. If another transaction committed changes to the same process
/// first, `commit` fails with `StorageError::TransactionConflict` and none of
/// this transaction's writes (including the cache wipe) take effect.
///
/// [`commit`]: VersionTransaction::commit
#[async_trait]
pub trait VersionTransaction: Send {
    fn tenant_id(&self) -> TenantId;

    fn process_id(&self) -> ProcessId;

    /// All versions of the process, any status, ordered by version number.
    async fn versions(&mut self) -> TesseraResult<Vec<Version>>;

    /// A version of this process by id. Versions of other processes or
    /// tenants are reported as absent.
    async fn version_get(&mut self, version_id: VersionId) -> TesseraResult<Option<Version>>;

    /// The ACTIVE version for an environment, if any.
    async fn active_version(&mut self, environment: Environment) -> TesseraResult<Option<Version>>;

    /// Highest version number ever assigned to the process, deprecated ones included.
    async fn max_version_number(&mut self) -> TesseraResult<Option<VersionNumber>>;

    async fn version_insert(&mut self, version: &Version) -> TesseraResult<()>;

    /// Mark a version DEPRECATED. Only `status` and `deprecated_at` change.
    async fn version_deprecate(&mut self, version_id: VersionId, at: Timestamp) -> TesseraResult<()>;

    /// Delete every cache entry of the process when the transaction commits.
    async fn cache_invalidate_process(&mut self) -> TesseraResult<()>;

    async fn commit(self: Box<Self>) -> TesseraResult<()>;

    /// Discard the transaction. Never fails; backend errors are logged.
    async fn abort(self: Box<Self>);
}

// ============================================================================
// VERSION STORE
// ============================================================================

/// Persistent, append-only version history.
///
/// Plain reads run outside any transaction with read-committed semantics;
/// all lookups are tenant-scoped, so versions owned by another tenant are
/// indistinguishable from missing ones.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Open a transaction over one process.
    async fn begin(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
    ) -> TesseraResult<Box<dyn VersionTransaction>>;

    async fn find_active(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
        environment: Environment,
    ) -> TesseraResult<Option<Version>>;

    /// Look up a version by number regardless of status or environment.
    async fn find_by_number(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
        version_number: VersionNumber,
    ) -> TesseraResult<Option<Version>>;

    /// Full history of a process, newest first.
    async fn list(&self, tenant_id: TenantId, process_id: ProcessId) -> TesseraResult<Vec<Version>>;

    async fn version_get(
        &self,
        tenant_id: TenantId,
        version_id: VersionId,
    ) -> TesseraResult<Option<Version>>;

    /// Cheap round trip used by readiness checks.
    async fn ping(&self) -> TesseraResult<()>;
}
