//! Authoring: saving new sandbox versions and reading history.

use serde::Serialize;
use serde_json::Value;
use tessera_core::version::{CACHE_TTL_KEY, INPUT_SCHEMA_KEY};
use tessera_core::{
    diff_versions, next_version_number, AuditAction, AuditEvent, Clock, Environment, ProcessId,
    TenantId, TesseraResult, Timestamp, ValidationError, Version, VersionConfig, VersionDiff,
    VersionError, VersionId,
};
use tessera_storage::VersionTransaction;
use tracing::info;

use crate::context::LifecycleContext;

/// Save a new configuration for a process.
#[derive(Debug, Clone)]
pub struct CreateVersionRequest {
    pub tenant_id: TenantId,
    pub process_id: ProcessId,
    pub config: VersionConfig,
    pub change_notes: Option<String>,
    pub actor: Option<String>,
}

/// A version created by a transition, plus the version it superseded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionTransition {
    pub created: Version,
    pub deprecated: Option<Version>,
}

/// Check the keys of a config the serving path interprets.
pub fn validate_config(config: &VersionConfig) -> Result<(), ValidationError> {
    let Some(map) = config.as_value().as_object() else {
        return Err(ValidationError::InvalidValue {
            field: "config".to_string(),
            reason: "must be a JSON object".to_string(),
        });
    };
    if let Some(ttl) = map.get(CACHE_TTL_KEY) {
        if !ttl.is_u64() {
            return Err(ValidationError::InvalidValue {
                field: CACHE_TTL_KEY.to_string(),
                reason: "must be a non-negative integer".to_string(),
            });
        }
    }
    if let Some(schema) = map.get(INPUT_SCHEMA_KEY) {
        if !matches!(schema, Value::Object(_) | Value::Bool(_) | Value::Null) {
            return Err(ValidationError::InvalidSchema {
                reason: "input_schema must be an object or a boolean".to_string(),
            });
        }
    }
    Ok(())
}

/// Save a new SANDBOX version.
///
/// In one transaction: the current SANDBOX ACTIVE version (if any) becomes
/// DEPRECATED and a new ACTIVE SANDBOX version numbered `max + 1` is
/// inserted, published at creation. The cache is left alone; entries
/// stamped with the superseded number stop matching on their own.
pub async fn create_version(
    ctx: &LifecycleContext,
    request: CreateVersionRequest,
) -> TesseraResult<VersionTransition> {
    validate_config(&request.config)?;

    let now = ctx.clock.now();
    let mut tx = ctx.store.begin(request.tenant_id, request.process_id).await?;
    let transition = match create_in_tx(tx.as_mut(), &request, now).await {
        Ok(t) => t,
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
        deprecated = ?transition.deprecated.as_ref().map(|v| v.version_number),
        "Sandbox version created"
    );

    ctx.audit.emit(AuditEvent::new(
        AuditAction::VersionCreated,
        request.tenant_id,
        request.process_id,
        request.actor,
        Environment::Sandbox,
        transition.deprecated.as_ref().map(|v| v.version_number),
        transition.created.version_number,
        None,
        now,
    ));

    Ok(transition)
}

async fn create_in_tx(
    tx: &mut dyn VersionTransaction,
    request: &CreateVersionRequest,
    now: Timestamp,
) -> TesseraResult<VersionTransition> {
    let deprecated = supersede_active(tx, Environment::Sandbox, now).await?;
    let number = next_version_number(tx.max_version_number().await?);
    let created = Version::new_active(
        request.tenant_id,
        request.process_id,
        number,
        request.config.clone(),
        Environment::Sandbox,
        now,
        request.change_notes.clone(),
    );
    tx.version_insert(&created).await?;
    Ok(VersionTransition {
        created,
        deprecated,
    })
}

/// Deprecate the ACTIVE version of `environment`, returning its new state.
pub(crate) async fn supersede_active(
    tx: &mut dyn VersionTransaction,
    environment: Environment,
    now: Timestamp,
) -> TesseraResult<Option<Version>> {
    let Some(mut current) = tx.active_version(environment).await? else {
        return Ok(None);
    };
    tx.version_deprecate(current.version_id, now).await?;
    current.deprecate(now);
    Ok(Some(current))
}

/// History of a process, newest first, optionally for one environment.
pub async fn list_versions(
    ctx: &LifecycleContext,
    tenant_id: TenantId,
    process_id: ProcessId,
    environment: Option<Environment>,
) -> TesseraResult<Vec<Version>> {
    let versions = ctx.store.list(tenant_id, process_id).await?;
    Ok(match environment {
        Some(env) => versions
            .into_iter()
            .filter(|v| v.environment == env)
            .collect(),
        None => versions,
    })
}

pub async fn get_version(
    ctx: &LifecycleContext,
    tenant_id: TenantId,
    version_id: VersionId,
) -> TesseraResult<Version> {
    ctx.store
        .version_get(tenant_id, version_id)
        .await?
        .ok_or_else(|| VersionError::VersionIdNotFound { version_id }.into())
}

/// Load two versions of the caller's tenant and diff their configs.
pub async fn diff_version_ids(
    ctx: &LifecycleContext,
    tenant_id: TenantId,
    from: VersionId,
    to: VersionId,
) -> TesseraResult<VersionDiff> {
    let a = get_version(ctx, tenant_id, from).await?;
    let b = get_version(ctx, tenant_id, to).await?;
    Ok(diff_versions(&a, &b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seed, Fixture};
    use serde_json::json;
    use tessera_core::{TesseraError, VersionStatus};
    use tessera_storage::VersionStore;
    use uuid::Uuid;

    fn request(fx: &Fixture, config: Value) -> CreateVersionRequest {
        CreateVersionRequest {
            tenant_id: fx.tenant,
            process_id: fx.process,
            config: VersionConfig::new(config),
            change_notes: Some("tweak".into()),
            actor: Some("alice".into()),
        }
    }

    #[tokio::test]
    async fn test_first_version_is_number_one() {
        let fx = Fixture::new();
        let t = create_version(&fx.ctx, request(&fx, json!({"temperature": 0.7})))
            .await
            .unwrap();
        assert_eq!(t.created.version_number, 1);
        assert_eq!(t.created.environment, Environment::Sandbox);
        assert_eq!(t.created.status, VersionStatus::Active);
        assert_eq!(t.created.published_at, Some(t.created.created_at));
        assert!(t.deprecated.is_none());
    }

    #[tokio::test]
    async fn test_save_supersedes_sandbox_and_skips_deprecated_numbers() {
        let fx = Fixture::new();
        seed(&fx, 1, Environment::Production, VersionStatus::Active).await;
        let v2 = seed(&fx, 2, Environment::Sandbox, VersionStatus::Active).await;
        seed(&fx, 5, Environment::Sandbox, VersionStatus::Deprecated).await;

        let t = create_version(&fx.ctx, request(&fx, json!({"temperature": 1.0})))
            .await
            .unwrap();
        assert_eq!(t.created.version_number, 6);
        let deprecated = t.deprecated.expect("sandbox v2 superseded");
        assert_eq!(deprecated.version_id, v2.version_id);
        assert_eq!(deprecated.status, VersionStatus::Deprecated);

        let prod = fx
            .store
            .find_active(fx.tenant, fx.process, Environment::Production)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(prod.version_number, 1);

        let events = fx.audit_events(1).await;
        assert_eq!(events[0].action, AuditAction::VersionCreated);
        assert_eq!(events[0].old_version_number, Some(2));
        assert_eq!(events[0].actor.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let fx = Fixture::new();
        for bad in [
            json!("not an object"),
            json!({"cache_ttl_secs": -1}),
            json!({"input_schema": "string"}),
        ] {
            let err = create_version(&fx.ctx, request(&fx, bad)).await.unwrap_err();
            assert!(matches!(err, TesseraError::Validation(_)));
        }
        assert!(fx.store.list(fx.tenant, fx.process).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_filters_environment() {
        let fx = Fixture::new();
        seed(&fx, 1, Environment::Production, VersionStatus::Active).await;
        seed(&fx, 2, Environment::Sandbox, VersionStatus::Active).await;
        let all = list_versions(&fx.ctx, fx.tenant, fx.process, None).await.unwrap();
        assert_eq!(all.len(), 2);
        let prod = list_versions(&fx.ctx, fx.tenant, fx.process, Some(Environment::Production))
            .await
            .unwrap();
        assert_eq!(prod.len(), 1);
        assert_eq!(prod[0].version_number, 1);
    }

    #[tokio::test]
    async fn test_get_and_diff_are_tenant_scoped() {
        let fx = Fixture::new();
        let v1 = seed(&fx, 1, Environment::Production, VersionStatus::Active).await;
        let v2 = seed(&fx, 2, Environment::Sandbox, VersionStatus::Active).await;

        assert_eq!(get_version(&fx.ctx, fx.tenant, v1.version_id).await.unwrap(), v1);
        let err = get_version(&fx.ctx, Uuid::now_v7(), v1.version_id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TesseraError::Version(VersionError::VersionIdNotFound { .. })
        ));

        let diff = diff_version_ids(&fx.ctx, fx.tenant, v1.version_id, v2.version_id)
            .await
            .unwrap();
        assert!(diff.has_changes);
        assert_eq!(diff.change_count.modified, 1);
        assert!(diff.summary.starts_with("v1 -> v2"));

        assert!(diff_version_ids(&fx.ctx, Uuid::now_v7(), v1.version_id, v2.version_id)
            .await
            .is_err());
    }
}
