//! PostgreSQL backend.
//!
//! `PgStore` implements both [`VersionStore`] and [`CacheStore`] over a
//! deadpool connection pool. Lifecycle transactions run at SERIALIZABLE
//! isolation on one pooled connection, and the partial unique index
//! `versions_one_active_per_environment` backs the one-live-version rule.
//! Serialization failures and violations of the lifecycle constraints
//! surface as `StorageError::TransactionConflict`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, PoolError, RecyclingMethod, Runtime};
use serde_json::Value;
use tessera_core::{
    CacheEntry, Environment, Fingerprint, ProcessId, StorageError, TenantId, TesseraResult,
    Timestamp, Version, VersionConfig, VersionId, VersionNumber,
};
use tessera_storage::{CacheStats, CacheStore, TenantScopedKey, VersionStore, VersionTransaction};
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};

const MIGRATION: &str = include_str!("../migrations/V1__tessera.sql");

/// Constraints whose violation means another transaction got there first.
const LIFECYCLE_CONSTRAINTS: [&str; 2] = [
    "versions_one_active_per_environment",
    "versions_process_id_version_number_key",
];

const VERSION_COLUMNS: &str = "version_id, tenant_id, process_id, version_number, config, \
     environment, status, created_at, published_at, deprecated_at, change_notes";

const CACHE_COLUMNS: &str =
    "tenant_id, process_id, fingerprint, version_number, payload, cached_at, expires_at";

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait, create and recycle timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "tessera".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("TESSERA_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("TESSERA_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5432),
            dbname: std::env::var("TESSERA_DB_NAME").unwrap_or_else(|_| "tessera".to_string()),
            user: std::env::var("TESSERA_DB_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("TESSERA_DB_PASSWORD").unwrap_or_default(),
            max_size: std::env::var("TESSERA_DB_POOL_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(16),
            timeout: Duration::from_secs(
                std::env::var("TESSERA_DB_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts.wait = Some(self.timeout);
        pool_cfg.timeouts.create = Some(self.timeout);
        pool_cfg.timeouts.recycle = Some(self.timeout);
        cfg.pool = Some(pool_cfg);

        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn map_pg_error(err: tokio_postgres::Error, process_id: ProcessId) -> StorageError {
    if let Some(db_error) = err.as_db_error() {
        let code = db_error.code();
        if code == &SqlState::T_R_SERIALIZATION_FAILURE || code == &SqlState::T_R_DEADLOCK_DETECTED
        {
            return StorageError::TransactionConflict { process_id };
        }
        if code == &SqlState::UNIQUE_VIOLATION {
            let constraint = db_error.constraint().unwrap_or_default().to_string();
            if LIFECYCLE_CONSTRAINTS.contains(&constraint.as_str()) {
                return StorageError::TransactionConflict { process_id };
            }
            return StorageError::UniqueViolation { constraint };
        }
    }
    StorageError::Backend {
        reason: err.to_string(),
    }
}

fn backend(err: tokio_postgres::Error) -> StorageError {
    StorageError::Backend {
        reason: err.to_string(),
    }
}

fn pool_error(err: PoolError) -> StorageError {
    StorageError::Backend {
        reason: format!("failed to acquire connection: {}", err),
    }
}

fn corrupt(column: &str, err: impl std::fmt::Display) -> StorageError {
    StorageError::Corrupt {
        reason: format!("column {}: {}", column, err),
    }
}

fn version_from_row(row: &Row) -> Result<Version, StorageError> {
    let environment: String = row.try_get("environment").map_err(|e| corrupt("environment", e))?;
    let status: String = row.try_get("status").map_err(|e| corrupt("status", e))?;
    let config: Value = row.try_get("config").map_err(|e| corrupt("config", e))?;
    Ok(Version {
        version_id: row.try_get("version_id").map_err(|e| corrupt("version_id", e))?,
        tenant_id: row.try_get("tenant_id").map_err(|e| corrupt("tenant_id", e))?,
        process_id: row.try_get("process_id").map_err(|e| corrupt("process_id", e))?,
        version_number: row
            .try_get("version_number")
            .map_err(|e| corrupt("version_number", e))?,
        config: VersionConfig::new(config),
        environment: environment.parse().map_err(|e| corrupt("environment", e))?,
        status: status.parse().map_err(|e| corrupt("status", e))?,
        created_at: row.try_get("created_at").map_err(|e| corrupt("created_at", e))?,
        published_at: row
            .try_get("published_at")
            .map_err(|e| corrupt("published_at", e))?,
        deprecated_at: row
            .try_get("deprecated_at")
            .map_err(|e| corrupt("deprecated_at", e))?,
        change_notes: row
            .try_get("change_notes")
            .map_err(|e| corrupt("change_notes", e))?,
    })
}

fn versions_from_rows(rows: &[Row]) -> Result<Vec<Version>, StorageError> {
    rows.iter().map(version_from_row).collect()
}

fn cache_entry_from_row(row: &Row) -> Result<CacheEntry, StorageError> {
    let fingerprint: String = row.try_get("fingerprint").map_err(|e| corrupt("fingerprint", e))?;
    Ok(CacheEntry {
        fingerprint: Fingerprint::from_hex(fingerprint),
        tenant_id: row.try_get("tenant_id").map_err(|e| corrupt("tenant_id", e))?,
        process_id: row.try_get("process_id").map_err(|e| corrupt("process_id", e))?,
        version_number: row
            .try_get("version_number")
            .map_err(|e| corrupt("version_number", e))?,
        payload: row.try_get("payload").map_err(|e| corrupt("payload", e))?,
        cached_at: row.try_get("cached_at").map_err(|e| corrupt("cached_at", e))?,
        expires_at: row.try_get("expires_at").map_err(|e| corrupt("expires_at", e))?,
    })
}

fn count(n: i64) -> u64 {
    u64::try_from(n).unwrap_or(0)
}

// ============================================================================
// STORE
// ============================================================================

#[derive(Debug, Default)]
struct CacheCounters {
    invalidations: AtomicU64,
    purged: AtomicU64,
}

/// PostgreSQL store for versions and cached responses.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
    counters: Arc<CacheCounters>,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            counters: Arc::new(CacheCounters::default()),
        }
    }

    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        Ok(Self::new(config.create_pool()?))
    }

    /// Apply the schema. Idempotent.
    pub async fn migrate(&self) -> ApiResult<()> {
        let client = self.pool.get().await?;
        client.batch_execute(MIGRATION).await?;
        debug!("Schema migration applied");
        Ok(())
    }

    /// Current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn client(&self) -> Result<Object, StorageError> {
        self.pool.get().await.map_err(pool_error)
    }
}

impl std::fmt::Debug for PgStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgStore")
            .field("pool_status", &self.pool.status())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl VersionStore for PgStore {
    async fn begin(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
    ) -> TesseraResult<Box<dyn VersionTransaction>> {
        let client = self.client().await?;
        client
            .batch_execute("BEGIN ISOLATION LEVEL SERIALIZABLE")
            .await
            .map_err(backend)?;
        Ok(Box::new(PgTransaction {
            client: Some(client),
            tenant_id,
            process_id,
            wipe_cache: false,
            counters: Arc::clone(&self.counters),
        }))
    }

    async fn find_active(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
        environment: Environment,
    ) -> TesseraResult<Option<Version>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {VERSION_COLUMNS} FROM tessera_versions \
                     WHERE tenant_id = $1 AND process_id = $2 AND environment = $3 \
                     AND status = 'ACTIVE'"
                ),
                &[&tenant_id, &process_id, &environment.as_str()],
            )
            .await
            .map_err(backend)?;
        Ok(row.as_ref().map(version_from_row).transpose()?)
    }

    async fn find_by_number(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
        version_number: VersionNumber,
    ) -> TesseraResult<Option<Version>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {VERSION_COLUMNS} FROM tessera_versions \
                     WHERE tenant_id = $1 AND process_id = $2 AND version_number = $3"
                ),
                &[&tenant_id, &process_id, &version_number],
            )
            .await
            .map_err(backend)?;
        Ok(row.as_ref().map(version_from_row).transpose()?)
    }

    async fn list(&self, tenant_id: TenantId, process_id: ProcessId) -> TesseraResult<Vec<Version>> {
        let client = self.client().await?;
        let rows = client
            .query(
                &format!(
                    "SELECT {VERSION_COLUMNS} FROM tessera_versions \
                     WHERE tenant_id = $1 AND process_id = $2 \
                     ORDER BY version_number DESC"
                ),
                &[&tenant_id, &process_id],
            )
            .await
            .map_err(backend)?;
        Ok(versions_from_rows(&rows)?)
    }

    async fn version_get(
        &self,
        tenant_id: TenantId,
        version_id: VersionId,
    ) -> TesseraResult<Option<Version>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {VERSION_COLUMNS} FROM tessera_versions \
                     WHERE tenant_id = $1 AND version_id = $2"
                ),
                &[&tenant_id, &version_id],
            )
            .await
            .map_err(backend)?;
        Ok(row.as_ref().map(version_from_row).transpose()?)
    }

    async fn ping(&self) -> TesseraResult<()> {
        let client = self.client().await?;
        client.query_one("SELECT 1", &[]).await.map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for PgStore {
    async fn get(&self, key: &TenantScopedKey) -> TesseraResult<Option<CacheEntry>> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                &format!(
                    "SELECT {CACHE_COLUMNS} FROM tessera_response_cache \
                     WHERE tenant_id = $1 AND process_id = $2 \
                     AND version_number = $3 AND fingerprint = $4"
                ),
                &[
                    &key.tenant_id(),
                    &key.process_id(),
                    &key.version_number(),
                    &key.fingerprint().as_str(),
                ],
            )
            .await
            .map_err(backend)?;
        Ok(row.as_ref().map(cache_entry_from_row).transpose()?)
    }

    async fn put(&self, entry: &CacheEntry) -> TesseraResult<()> {
        let client = self.client().await?;
        client
            .execute(
                "INSERT INTO tessera_response_cache \
                 (tenant_id, process_id, fingerprint, version_number, payload, cached_at, expires_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7) \
                 ON CONFLICT (tenant_id, process_id, version_number, fingerprint) DO UPDATE SET \
                 payload = EXCLUDED.payload, \
                 cached_at = EXCLUDED.cached_at, expires_at = EXCLUDED.expires_at",
                &[
                    &entry.tenant_id,
                    &entry.process_id,
                    &entry.fingerprint.as_str(),
                    &entry.version_number,
                    &entry.payload,
                    &entry.cached_at,
                    &entry.expires_at,
                ],
            )
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn invalidate_process(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
    ) -> TesseraResult<u64> {
        let client = self.client().await?;
        let removed = client
            .execute(
                "DELETE FROM tessera_response_cache WHERE tenant_id = $1 AND process_id = $2",
                &[&tenant_id, &process_id],
            )
            .await
            .map_err(backend)?;
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        Ok(removed)
    }

    async fn purge_expired(&self, now: Timestamp) -> TesseraResult<u64> {
        let client = self.client().await?;
        let removed = client
            .execute(
                "DELETE FROM tessera_response_cache WHERE expires_at <= $1",
                &[&now],
            )
            .await
            .map_err(backend)?;
        self.counters.purged.fetch_add(removed, Ordering::Relaxed);
        Ok(removed)
    }

    async fn stats(&self) -> TesseraResult<CacheStats> {
        let client = self.client().await?;
        let row = client
            .query_one("SELECT COUNT(*) AS entries FROM tessera_response_cache", &[])
            .await
            .map_err(backend)?;
        let entries: i64 = row.try_get("entries").map_err(|e| corrupt("entries", e))?;
        Ok(CacheStats {
            entry_count: count(entries),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            purged: self.counters.purged.load(Ordering::Relaxed),
            ..CacheStats::default()
        })
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// SERIALIZABLE transaction over one process, pinned to one connection.
///
/// Dropped without `commit` or `abort`, the transaction is rolled back on
/// a spawned task before the connection returns to the pool.
pub struct PgTransaction {
    /// `None` once committed or aborted.
    client: Option<Object>,
    tenant_id: TenantId,
    process_id: ProcessId,
    wipe_cache: bool,
    counters: Arc<CacheCounters>,
}

impl PgTransaction {
    fn client(&self) -> Result<&Object, StorageError> {
        self.client.as_ref().ok_or_else(|| StorageError::Backend {
            reason: "transaction already finished".to_string(),
        })
    }

    fn pg_error(&self, err: tokio_postgres::Error) -> StorageError {
        map_pg_error(err, self.process_id)
    }
}

#[async_trait]
impl VersionTransaction for PgTransaction {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn process_id(&self) -> ProcessId {
        self.process_id
    }

    async fn versions(&mut self) -> TesseraResult<Vec<Version>> {
        let rows = self
            .client()?
            .query(
                &format!(
                    "SELECT {VERSION_COLUMNS} FROM tessera_versions \
                     WHERE tenant_id = $1 AND process_id = $2 ORDER BY version_number"
                ),
                &[&self.tenant_id, &self.process_id],
            )
            .await
            .map_err(|e| self.pg_error(e))?;
        Ok(versions_from_rows(&rows)?)
    }

    async fn version_get(&mut self, version_id: VersionId) -> TesseraResult<Option<Version>> {
        let row = self
            .client()?
            .query_opt(
                &format!(
                    "SELECT {VERSION_COLUMNS} FROM tessera_versions \
                     WHERE tenant_id = $1 AND process_id = $2 AND version_id = $3"
                ),
                &[&self.tenant_id, &self.process_id, &version_id],
            )
            .await
            .map_err(|e| self.pg_error(e))?;
        Ok(row.as_ref().map(version_from_row).transpose()?)
    }

    async fn active_version(&mut self, environment: Environment) -> TesseraResult<Option<Version>> {
        let row = self
            .client()?
            .query_opt(
                &format!(
                    "SELECT {VERSION_COLUMNS} FROM tessera_versions \
                     WHERE tenant_id = $1 AND process_id = $2 AND environment = $3 \
                     AND status = 'ACTIVE'"
                ),
                &[&self.tenant_id, &self.process_id, &environment.as_str()],
            )
            .await
            .map_err(|e| self.pg_error(e))?;
        Ok(row.as_ref().map(version_from_row).transpose()?)
    }

    async fn max_version_number(&mut self) -> TesseraResult<Option<VersionNumber>> {
        let row = self
            .client()?
            .query_one(
                "SELECT MAX(version_number) AS max_number FROM tessera_versions \
                 WHERE tenant_id = $1 AND process_id = $2",
                &[&self.tenant_id, &self.process_id],
            )
            .await
            .map_err(|e| self.pg_error(e))?;
        let max: Option<VersionNumber> =
            row.try_get("max_number").map_err(|e| corrupt("max_number", e))?;
        Ok(max)
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
        self.client()?
            .execute(
                &format!(
                    "INSERT INTO tessera_versions ({VERSION_COLUMNS}) \
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
                ),
                &[
                    &version.version_id,
                    &version.tenant_id,
                    &version.process_id,
                    &version.version_number,
                    version.config.as_value(),
                    &version.environment.as_str(),
                    &version.status.as_str(),
                    &version.created_at,
                    &version.published_at,
                    &version.deprecated_at,
                    &version.change_notes,
                ],
            )
            .await
            .map_err(|e| self.pg_error(e))?;
        Ok(())
    }

    async fn version_deprecate(&mut self, version_id: VersionId, at: Timestamp) -> TesseraResult<()> {
        let updated = self
            .client()?
            .execute(
                "UPDATE tessera_versions SET status = 'DEPRECATED', deprecated_at = $4 \
                 WHERE tenant_id = $1 AND process_id = $2 AND version_id = $3",
                &[&self.tenant_id, &self.process_id, &version_id, &at],
            )
            .await
            .map_err(|e| self.pg_error(e))?;
        if updated == 0 {
            return Err(StorageError::Backend {
                reason: format!("version {} not found in transaction", version_id),
            }
            .into());
        }
        Ok(())
    }

    async fn cache_invalidate_process(&mut self) -> TesseraResult<()> {
        self.client()?
            .execute(
                "DELETE FROM tessera_response_cache WHERE tenant_id = $1 AND process_id = $2",
                &[&self.tenant_id, &self.process_id],
            )
            .await
            .map_err(|e| self.pg_error(e))?;
        self.wipe_cache = true;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> TesseraResult<()> {
        let mut this = self;
        let client = this.client.take().ok_or_else(|| StorageError::Backend {
            reason: "transaction already finished".to_string(),
        })?;
        if let Err(e) = client.batch_execute("COMMIT").await {
            let err = map_pg_error(e, this.process_id);
            if matches!(err, StorageError::TransactionConflict { .. }) {
                warn!(
                    tenant_id = %this.tenant_id,
                    process_id = %this.process_id,
                    "Transaction lost a race to a concurrent commit"
                );
            }
            // Postgres ends the transaction on a failed COMMIT.
            return Err(err.into());
        }
        if this.wipe_cache {
            this.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        debug!(
            tenant_id = %this.tenant_id,
            process_id = %this.process_id,
            cache_wiped = this.wipe_cache,
            "Transaction committed"
        );
        Ok(())
    }

    async fn abort(self: Box<Self>) {
        let mut this = self;
        let Some(client) = this.client.take() else {
            return;
        };
        if let Err(e) = client.batch_execute("ROLLBACK").await {
            warn!(
                tenant_id = %this.tenant_id,
                process_id = %this.process_id,
                error = %e,
                "Rollback failed; discarding connection"
            );
            drop(Object::take(client));
            return;
        }
        debug!(
            tenant_id = %this.tenant_id,
            process_id = %this.process_id,
            "Transaction aborted"
        );
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if client.batch_execute("ROLLBACK").await.is_err() {
                        drop(Object::take(client));
                    }
                });
            }
            Err(_) => drop(Object::take(client)),
        }
    }
}
