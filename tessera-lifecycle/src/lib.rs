//! Tessera Lifecycle - Version Resolution and Transitions
//!
//! Request-time resolution of the version serving a call, the transactional
//! transitions that change which version is live (save, promote, rollback),
//! fire-and-forget audit delivery, and the serving pipeline tying resolution
//! to the response cache and the intelligence provider.

pub mod audit;
pub mod authoring;
pub mod context;
pub mod promotion;
pub mod resolver;
pub mod rollback;
pub mod serving;

#[cfg(test)]
mod testing;

pub use audit::{
    spawn_audit_worker, AuditSender, AuditSink, MemoryAuditSink, TracingAuditSink,
    DEFAULT_AUDIT_CHANNEL_CAPACITY,
};
pub use authoring::{
    create_version, diff_version_ids, get_version, list_versions, validate_config,
    CreateVersionRequest, VersionTransition,
};
pub use context::LifecycleContext;
pub use promotion::{promote, PromoteRequest, PromotionOutcome};
pub use resolver::VersionResolver;
pub use rollback::{default_rollback_notes, rollback, RollbackRequest};
pub use serving::{
    strip_undeclared_properties, InputValidator, IntelligenceProvider, ServeOutcome,
    ServeRequest, ServingPipeline, UnconfiguredProvider,
};
