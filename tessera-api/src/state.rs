//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use tessera_lifecycle::{InputValidator, IntelligenceProvider, LifecycleContext, ServingPipeline};
use tessera_storage::ResponseCache;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Store, clock, config and audit channel for lifecycle operations.
    pub lifecycle: LifecycleContext,
    pub serving: Arc<ServingPipeline>,
    /// The same cache the serving pipeline reads through; exposed for stats
    /// and the reaper.
    pub cache: Arc<ResponseCache>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        lifecycle: LifecycleContext,
        cache: Arc<ResponseCache>,
        validator: Arc<dyn InputValidator>,
        provider: Arc<dyn IntelligenceProvider>,
    ) -> Self {
        let serving = Arc::new(ServingPipeline::from_context(
            &lifecycle,
            Arc::clone(&cache),
            validator,
            provider,
        ));
        Self {
            lifecycle,
            serving,
            cache,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(LifecycleContext, lifecycle);
crate::impl_from_ref!(Arc<ServingPipeline>, serving);
crate::impl_from_ref!(Arc<ResponseCache>, cache);
crate::impl_from_ref!(Instant, start_time);
