use std::sync::Arc;

use tessera_api::jobs::{cache_reaper_task, CacheReaperConfig};
use tessera_api::telemetry::{init_tracing, LogFormat};
use tessera_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, AuthConfig, DbConfig,
    JsonSchemaValidator, PgStore, ProviderConfig, StorageBackend,
};
use tessera_core::SystemClock;
use tessera_lifecycle::{
    spawn_audit_worker, LifecycleContext, TracingAuditSink, DEFAULT_AUDIT_CHANNEL_CAPACITY,
};
use tessera_storage::{CacheStore, InMemoryStore, ResponseCache, VersionStore};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(LogFormat::from_env())?;

    let api_config = ApiConfig::from_env()?;
    api_config.tessera.validate()?;
    let auth_config = AuthConfig::from_env()?;

    let (versions, responses): (Arc<dyn VersionStore>, Arc<dyn CacheStore>) =
        match api_config.storage {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; state is lost on restart");
                let store = Arc::new(InMemoryStore::new());
                (store.clone() as Arc<dyn VersionStore>, store as Arc<dyn CacheStore>)
            }
            StorageBackend::Postgres => {
                let store = Arc::new(PgStore::from_config(&DbConfig::from_env())?);
                store.migrate().await?;
                (store.clone() as Arc<dyn VersionStore>, store as Arc<dyn CacheStore>)
            }
        };

    let clock = Arc::new(SystemClock);
    let (audit, audit_handle) =
        spawn_audit_worker(Arc::new(TracingAuditSink), DEFAULT_AUDIT_CHANNEL_CAPACITY);
    let lifecycle = LifecycleContext::new(versions, clock.clone(), api_config.tessera.clone(), audit);

    let cache = Arc::new(ResponseCache::new(responses, clock));
    let provider = ProviderConfig::from_env().build()?;
    let state = AppState::new(
        lifecycle,
        Arc::clone(&cache),
        Arc::new(JsonSchemaValidator),
        provider,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let reaper = tokio::spawn(cache_reaper_task(
        cache,
        CacheReaperConfig::from_env(),
        shutdown_rx,
    ));

    let app = create_api_router(state, &api_config, auth_config);

    let addr = api_config.bind_addr();
    tracing::info!(%addr, storage = ?api_config.storage, "Starting Tessera API server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = reaper.await {
        tracing::warn!(error = %e, "Cache reaper did not stop cleanly");
    }
    // The audit worker drains once every sender is gone; the router owned them.
    if let Err(e) = audit_handle.await {
        tracing::warn!(error = %e, "Audit worker did not stop cleanly");
    }
    Ok(())
}
