//! Expired cache entry reaper.
//!
//! Expired entries are never served, so purging them is storage hygiene
//! only. The reaper runs on a fixed interval and stops on the shutdown
//! signal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tessera_storage::ResponseCache;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::constants::DEFAULT_CACHE_REAPER_INTERVAL_SECS;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct CacheReaperConfig {
    /// How often to purge (default: 300 seconds)
    pub interval: Duration,
    pub enabled: bool,
}

impl Default for CacheReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_CACHE_REAPER_INTERVAL_SECS),
            enabled: true,
        }
    }
}

impl CacheReaperConfig {
    /// # Environment Variables
    /// - `TESSERA_CACHE_REAPER_INTERVAL_SECS`: purge interval (default: 300)
    /// - `TESSERA_CACHE_REAPER_ENABLED`: `false` disables the reaper (default: true)
    pub fn from_env() -> Self {
        let interval = Duration::from_secs(
            std::env::var("TESSERA_CACHE_REAPER_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|secs: &u64| *secs > 0)
                .unwrap_or(DEFAULT_CACHE_REAPER_INTERVAL_SECS),
        );
        let enabled = std::env::var("TESSERA_CACHE_REAPER_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);
        Self { interval, enabled }
    }

    /// Short interval for local development.
    pub fn development() -> Self {
        Self {
            interval: Duration::from_secs(10),
            enabled: true,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct CacheReaperMetrics {
    pub cycles: AtomicU64,
    /// Entries deleted since startup.
    pub purged: AtomicU64,
    pub errors: AtomicU64,
}

impl CacheReaperMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CacheReaperSnapshot {
        CacheReaperSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            purged: self.purged.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheReaperSnapshot {
    pub cycles: u64,
    pub purged: u64,
    pub errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Purge expired entries every `config.interval` until `shutdown_rx` flips
/// to `true`. Returns the metrics collected over the task's lifetime.
pub async fn cache_reaper_task(
    cache: Arc<ResponseCache>,
    config: CacheReaperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<CacheReaperMetrics> {
    let metrics = Arc::new(CacheReaperMetrics::new());
    if !config.enabled {
        tracing::info!("Cache reaper disabled");
        return metrics;
    }

    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(
        interval_secs = config.interval.as_secs(),
        "Cache reaper started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender also means shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Cache reaper shutting down");
                    break;
                }
            }
            _ = ticker.tick() => {
                run_reaper_cycle(&cache, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        purged = snapshot.purged,
        errors = snapshot.errors,
        "Cache reaper completed"
    );
    metrics
}

/// One purge pass. Failures are counted and logged, never propagated.
pub async fn run_reaper_cycle(cache: &ResponseCache, metrics: &CacheReaperMetrics) {
    metrics.cycles.fetch_add(1, Ordering::Relaxed);
    match cache.purge_expired().await {
        Ok(0) => tracing::trace!("Cache reaper cycle found nothing to purge"),
        Ok(purged) => {
            metrics.purged.fetch_add(purged, Ordering::Relaxed);
            tracing::info!(purged, "Purged expired cache entries");
        }
        Err(e) => {
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, "Cache purge failed");
        }
    }
}
