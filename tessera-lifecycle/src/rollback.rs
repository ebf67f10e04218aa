//! Rollback: a new SANDBOX version restoring an older configuration.
//!
//! History stays append-only. The old version is never resurrected; its
//! config is copied into a fresh version that must go through promotion
//! like any other change to reach PRODUCTION.

use tessera_core::{
    next_version_number, AuditAction, AuditEvent, Clock, Environment, ProcessId, TenantId,
    TesseraResult, Timestamp, Version, VersionError, VersionId, VersionNumber, VersionStatus,
};
use tessera_storage::VersionTransaction;
use tracing::info;

use crate::authoring::{supersede_active, VersionTransition};
use crate::context::LifecycleContext;

#[derive(Debug, Clone)]
pub struct RollbackRequest {
    pub tenant_id: TenantId,
    pub process_id: ProcessId,
    pub target_version_id: VersionId,
    pub change_notes: Option<String>,
    pub actor: Option<String>,
}

pub fn default_rollback_notes(target: VersionNumber) -> String {
    format!("Restored from version {}", target)
}

/// Restore `target_version_id`'s config as a new ACTIVE SANDBOX version.
///
/// The target may be any non-draft version of the process in either
/// environment, except the version already ACTIVE in SANDBOX. In one
/// transaction the current SANDBOX version is deprecated, the new one is
/// inserted, and the process's cache is wiped.
pub async fn rollback(
    ctx: &LifecycleContext,
    request: RollbackRequest,
) -> TesseraResult<VersionTransition> {
    let now = ctx.clock.now();
    let mut tx = ctx.store.begin(request.tenant_id, request.process_id).await?;
    let (transition, target_number) = match rollback_in_tx(tx.as_mut(), &request, now).await {
        Ok(result) => result,
        Err(e) => {
            tx.abort().await;
            return Err(e);
        }
    };
    tx.commit().await?;

    info!(
        tenant_id = %request.tenant_id,
        process_id = %request.process_id,
        version_number = transition.created.version_number,
        target_version_number = target_number,
        "Sandbox rolled back"
    );

    ctx.audit.emit(AuditEvent::new(
        AuditAction::VersionRolledBack,
        request.tenant_id,
        request.process_id,
        request.actor,
        Environment::Sandbox,
        transition.deprecated.as_ref().map(|v| v.version_number),
        transition.created.version_number,
        Some(target_number),
        now,
    ));

    Ok(transition)
}

async fn rollback_in_tx(
    tx: &mut dyn VersionTransaction,
    request: &RollbackRequest,
    now: Timestamp,
) -> TesseraResult<(VersionTransition, VersionNumber)> {
    let target = tx
        .version_get(request.target_version_id)
        .await?
        .ok_or(VersionError::VersionIdNotFound {
            version_id: request.target_version_id,
        })?;

    if target.status == VersionStatus::Draft {
        let mut available: Vec<VersionNumber> = tx
            .versions()
            .await?
            .into_iter()
            .filter(|v| v.environment == target.environment && v.is_servable())
            .map(|v| v.version_number)
            .collect();
        available.sort_unstable();
        return Err(VersionError::VersionNotFound {
            process_id: request.process_id,
            environment: target.environment,
            requested: target.version_number,
            available,
        }
        .into());
    }

    if let Some(current) = tx.active_version(Environment::Sandbox).await? {
        if current.version_id == target.version_id {
            return Err(VersionError::CannotRollbackToCurrentSandbox {
                version_id: target.version_id,
                version_number: target.version_number,
            }
            .into());
        }
    }

    let deprecated = supersede_active(tx, Environment::Sandbox, now).await?;
    let number = next_version_number(tx.max_version_number().await?);
    let notes = request
        .change_notes
        .clone()
        .unwrap_or_else(|| default_rollback_notes(target.version_number));
    let created = Version::new_active(
        request.tenant_id,
        request.process_id,
        number,
        target.config.clone(),
        Environment::Sandbox,
        now,
        Some(notes),
    );
    tx.version_insert(&created).await?;
    tx.cache_invalidate_process().await?;

    Ok((
        VersionTransition {
            created,
            deprecated,
        },
        target.version_number,
    ))
}
