//! Shared dependencies of the lifecycle operations.

use std::sync::Arc;

use tessera_core::{Clock, SystemClock, TesseraConfig};
use tessera_storage::VersionStore;

use crate::audit::AuditSender;
use crate::resolver::VersionResolver;

/// Everything authoring, promotion and rollback need.
#[derive(Clone)]
pub struct LifecycleContext {
    pub store: Arc<dyn VersionStore>,
    pub clock: Arc<dyn Clock>,
    pub config: TesseraConfig,
    pub audit: AuditSender,
}

impl LifecycleContext {
    pub fn new(
        store: Arc<dyn VersionStore>,
        clock: Arc<dyn Clock>,
        config: TesseraConfig,
        audit: AuditSender,
    ) -> Self {
        Self {
            store,
            clock,
            config,
            audit,
        }
    }

    /// Wall clock, default config, audit disabled.
    pub fn with_defaults(store: Arc<dyn VersionStore>) -> Self {
        Self::new(
            store,
            Arc::new(SystemClock),
            TesseraConfig::default(),
            AuditSender::disabled(),
        )
    }

    pub fn resolver(&self) -> VersionResolver {
        VersionResolver::new(Arc::clone(&self.store), self.config.sunset_grace())
    }
}

impl std::fmt::Debug for LifecycleContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleContext")
            .field("clock", &self.clock)
            .field("config", &self.config)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}
