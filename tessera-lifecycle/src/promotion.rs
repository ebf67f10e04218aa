//! Promotion of a SANDBOX version into a new ACTIVE PRODUCTION version.

use serde::Serialize;
use tessera_core::{
    next_version_number, AuditAction, AuditEvent, Clock, Environment, ProcessId, TenantId,
    TesseraResult, Timestamp, Version, VersionError, VersionId, VersionNumber, VersionStatus,
};
use tessera_storage::VersionTransaction;
use tracing::{info, warn};

use crate::authoring::supersede_active;
use crate::context::LifecycleContext;

#[derive(Debug, Clone)]
pub struct PromoteRequest {
    pub tenant_id: TenantId,
    pub process_id: ProcessId,
    pub source_version_id: VersionId,
    pub change_notes: Option<String>,
    pub actor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionOutcome {
    pub promoted: Version,
    /// The PRODUCTION version that was live before, now DEPRECATED.
    pub deprecated: Option<Version>,
    /// SANDBOX version whose config was copied.
    pub source_version_number: VersionNumber,
}

/// Promote a SANDBOX version to PRODUCTION.
///
/// All-or-nothing: deprecating the live PRODUCTION version, inserting the
/// new one numbered `max + 1` with the source's config, and wiping the
/// process's cache commit together or not at all. Preconditions are checked
/// inside the transaction. A concurrent promotion of the same process that
/// commits first makes this one fail with a retryable conflict.
pub async fn promote(
    ctx: &LifecycleContext,
    request: PromoteRequest,
) -> TesseraResult<PromotionOutcome> {
    let now = ctx.clock.now();
    let mut tx = ctx.store.begin(request.tenant_id, request.process_id).await?;
    let outcome = match promote_in_tx(tx.as_mut(), &request, now).await {
        Ok(outcome) => outcome,
        Err(e) => {
            tx.abort().await;
            return Err(e);
        }
    };
    if let Err(e) = tx.commit().await {
        if e.is_retryable() {
            warn!(
                tenant_id = %request.tenant_id,
                process_id = %request.process_id,
                source_version_id = %request.source_version_id,
                "Promotion lost to a concurrent change"
            );
        }
        return Err(e);
    }

    info!(
        tenant_id = %request.tenant_id,
        process_id = %request.process_id,
        version_number = outcome.promoted.version_number,
        source_version_number = outcome.source_version_number,
        deprecated = ?outcome.deprecated.as_ref().map(|v| v.version_number),
        "Version promoted to production"
    );

    ctx.audit.emit(AuditEvent::new(
        AuditAction::VersionPromoted,
        request.tenant_id,
        request.process_id,
        request.actor,
        Environment::Production,
        outcome.deprecated.as_ref().map(|v| v.version_number),
        outcome.promoted.version_number,
        Some(outcome.source_version_number),
        now,
    ));

    Ok(outcome)
}

pub(crate) async fn promote_in_tx(
    tx: &mut dyn VersionTransaction,
    request: &PromoteRequest,
    now: Timestamp,
) -> TesseraResult<PromotionOutcome> {
    let source = tx
        .version_get(request.source_version_id)
        .await?
        .ok_or(VersionError::VersionIdNotFound {
            version_id: request.source_version_id,
        })?;

    if source.environment != Environment::Sandbox {
        return Err(VersionError::NotSandboxVersion {
            version_id: source.version_id,
            environment: source.environment,
        }
        .into());
    }
    if source.status != VersionStatus::Active {
        return Err(VersionError::NotActiveVersion {
            version_id: source.version_id,
            status: source.status,
        }
        .into());
    }

    let deprecated = supersede_active(tx, Environment::Production, now).await?;
    let number = next_version_number(tx.max_version_number().await?);
    let promoted = Version::new_active(
        request.tenant_id,
        request.process_id,
        number,
        source.config.clone(),
        Environment::Production,
        now,
        request.change_notes.clone(),
    );
    tx.version_insert(&promoted).await?;
    tx.cache_invalidate_process().await?;

    Ok(PromotionOutcome {
        promoted,
        deprecated,
        source_version_number: source.version_number,
    })
}
