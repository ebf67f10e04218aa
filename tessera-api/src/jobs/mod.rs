//! Background jobs for the Tessera API.
//!
//! - `cache_reaper`: deletes expired response cache entries
//!
//! ```ignore
//! use tessera_api::jobs::{cache_reaper_task, CacheReaperConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(cache_reaper_task(cache, CacheReaperConfig::from_env(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod cache_reaper;

pub use cache_reaper::{
    cache_reaper_task, run_reaper_cycle, CacheReaperConfig, CacheReaperMetrics,
    CacheReaperSnapshot,
};
