//! Audit records emitted after version lifecycle transitions.

use crate::{new_entity_id, EntityId, Environment, ProcessId, TenantId, Timestamp, VersionNumber};
use serde::{Deserialize, Serialize};

/// What happened to a process's version history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    VersionCreated,
    VersionPromoted,
    VersionRolledBack,
}

/// One audit record. Delivered fire-and-forget; losing one never affects serving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: EntityId,
    pub action: AuditAction,
    pub tenant_id: TenantId,
    pub process_id: ProcessId,
    /// Acting user, when the transition was triggered by a person.
    pub actor: Option<String>,
    pub environment: Environment,
    /// Version that was deprecated by the transition, if any.
    pub old_version_number: Option<VersionNumber>,
    pub new_version_number: VersionNumber,
    /// Version whose config was copied (promotion source / rollback target).
    pub source_version_number: Option<VersionNumber>,
    pub occurred_at: Timestamp,
}

impl AuditEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        action: AuditAction,
        tenant_id: TenantId,
        process_id: ProcessId,
        actor: Option<String>,
        environment: Environment,
        old_version_number: Option<VersionNumber>,
        new_version_number: VersionNumber,
        source_version_number: Option<VersionNumber>,
        occurred_at: Timestamp,
    ) -> Self {
        Self {
            event_id: new_entity_id(),
            action,
            tenant_id,
            process_id,
            actor,
            environment,
            old_version_number,
            new_version_number,
            source_version_number,
            occurred_at,
        }
    }
}
