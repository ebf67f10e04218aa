//! Version REST API Routes
//!
//! History, saves, promotion, rollback and diffs. All operations are scoped
//! to the caller's tenant; the key's environment does not restrict them.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;
use tessera_core::{Environment, ProcessId, Version, VersionConfig, VersionDiff, VersionId};
use tessera_lifecycle::{
    create_version, diff_version_ids, get_version, list_versions, promote, rollback,
    CreateVersionRequest, InputValidator, LifecycleContext, PromoteRequest, PromotionOutcome,
    RollbackRequest,
};

use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthExtractor;
use crate::state::AppState;
use crate::validation::JsonSchemaValidator;

// ============================================================================
// REQUEST TYPES
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListVersionsQuery {
    /// `sandbox` or `production`, any case.
    pub environment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVersionBody {
    pub config: Value,
    #[serde(default)]
    pub change_notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromoteBody {
    pub source_version_id: VersionId,
    #[serde(default)]
    pub change_notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RollbackBody {
    pub target_version_id: VersionId,
    #[serde(default)]
    pub change_notes: Option<String>,
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/v1/processes/:process_id/versions - History, newest first
pub async fn list_process_versions(
    State(ctx): State<LifecycleContext>,
    AuthExtractor(auth): AuthExtractor,
    Path(process_id): Path<ProcessId>,
    Query(query): Query<ListVersionsQuery>,
) -> ApiResult<Json<Vec<Version>>> {
    let environment = query
        .environment
        .as_deref()
        .map(|raw| {
            raw.parse::<Environment>()
                .map_err(|_| ApiError::invalid_format("environment", "SANDBOX or PRODUCTION"))
        })
        .transpose()?;

    let versions = list_versions(&ctx, auth.tenant_id, process_id, environment).await?;
    Ok(Json(versions))
}

/// POST /api/v1/processes/:process_id/versions - Save a new SANDBOX version
pub async fn create_process_version(
    State(ctx): State<LifecycleContext>,
    AuthExtractor(auth): AuthExtractor,
    Path(process_id): Path<ProcessId>,
    Json(body): Json<CreateVersionBody>,
) -> ApiResult<impl IntoResponse> {
    let config = VersionConfig::new(body.config);
    // Reject schemas the serving path could never compile.
    if let Some(schema) = config.input_schema().filter(|s| !s.is_null()) {
        JsonSchemaValidator.check_schema(schema)?;
    }

    let transition = create_version(
        &ctx,
        CreateVersionRequest {
            tenant_id: auth.tenant_id,
            process_id,
            config,
            change_notes: body.change_notes,
            actor: auth.user_id.clone(),
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(transition)))
}

/// GET /api/v1/versions/:version_id
pub async fn get_version_by_id(
    State(ctx): State<LifecycleContext>,
    AuthExtractor(auth): AuthExtractor,
    Path(version_id): Path<VersionId>,
) -> ApiResult<Json<Version>> {
    Ok(Json(get_version(&ctx, auth.tenant_id, version_id).await?))
}

/// POST /api/v1/processes/:process_id/promote - Copy a SANDBOX version to PRODUCTION
pub async fn promote_version(
    State(ctx): State<LifecycleContext>,
    AuthExtractor(auth): AuthExtractor,
    Path(process_id): Path<ProcessId>,
    Json(body): Json<PromoteBody>,
) -> ApiResult<(StatusCode, Json<PromotionOutcome>)> {
    let outcome = promote(
        &ctx,
        PromoteRequest {
            tenant_id: auth.tenant_id,
            process_id,
            source_version_id: body.source_version_id,
            change_notes: body.change_notes,
            actor: auth.user_id.clone(),
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// POST /api/v1/processes/:process_id/rollback - Restore an earlier config in SANDBOX
pub async fn rollback_version(
    State(ctx): State<LifecycleContext>,
    AuthExtractor(auth): AuthExtractor,
    Path(process_id): Path<ProcessId>,
    Json(body): Json<RollbackBody>,
) -> ApiResult<impl IntoResponse> {
    let transition = rollback(
        &ctx,
        RollbackRequest {
            tenant_id: auth.tenant_id,
            process_id,
            target_version_id: body.target_version_id,
            change_notes: body.change_notes,
            actor: auth.user_id.clone(),
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(transition)))
}

/// GET /api/v1/versions/:version_id/diff/:other_id - Config differences between two versions
pub async fn diff_versions(
    State(ctx): State<LifecycleContext>,
    AuthExtractor(auth): AuthExtractor,
    Path((from, to)): Path<(VersionId, VersionId)>,
) -> ApiResult<Json<VersionDiff>> {
    Ok(Json(diff_version_ids(&ctx, auth.tenant_id, from, to).await?))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route(
            "/processes/:process_id/versions",
            get(list_process_versions).post(create_process_version),
        )
        .route("/processes/:process_id/promote", post(promote_version))
        .route("/processes/:process_id/rollback", post(rollback_version))
        .route("/versions/:version_id", get(get_version_by_id))
        .route("/versions/:version_id/diff/:other_id", get(diff_versions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_body_notes_optional() {
        let body: CreateVersionBody =
            serde_json::from_value(json!({"config": {"temperature": 0.3}})).unwrap();
        assert!(body.change_notes.is_none());
        assert_eq!(body.config["temperature"], 0.3);
    }

    #[test]
    fn test_promote_body_requires_source() {
        assert!(serde_json::from_value::<PromoteBody>(json!({"change_notes": "x"})).is_err());
    }
}
