//! Serving REST API Routes
//!
//! Resolution and execution always use the environment bound to the API key.
//! Responses carry the version headers; `/run` also reports `X-Cache`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tessera_core::{ProcessId, ResolvedVersion, Timestamp, Version, VersionNumber};
use tessera_lifecycle::{LifecycleContext, ServeRequest, ServingPipeline};
use tessera_storage::{CacheStats, ResponseCache};

use crate::constants::CACHE_STATUS_HEADER;
use crate::error::ApiResult;
use crate::headers::{insert, version_headers, PinnedVersion};
use crate::middleware::AuthExtractor;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct ResolveResponse {
    pub version: Version,
    pub is_deprecated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sunset_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunBody {
    pub input: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResponse {
    pub data: Value,
    pub version_number: VersionNumber,
    pub version_status: &'static str,
    pub cache: &'static str,
    pub produced_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecation_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStatsResponse {
    #[serde(flatten)]
    pub stats: CacheStats,
    pub hit_rate: f64,
}

fn deprecation_message(ctx: &LifecycleContext, resolved: &ResolvedVersion) -> Option<String> {
    match (resolved.is_deprecated, resolved.sunset_at) {
        (true, Some(sunset)) => Some(
            ctx.config
                .deprecation_message(resolved.version_number(), sunset),
        ),
        _ => None,
    }
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/v1/processes/:process_id/resolve - Which version would serve a call
pub async fn resolve_version(
    State(ctx): State<LifecycleContext>,
    State(serving): State<Arc<ServingPipeline>>,
    AuthExtractor(auth): AuthExtractor,
    PinnedVersion(pinned): PinnedVersion,
    Path(process_id): Path<ProcessId>,
) -> ApiResult<(HeaderMap, Json<ResolveResponse>)> {
    let resolved = serving
        .resolver()
        .resolve(auth.tenant_id, process_id, auth.environment, pinned)
        .await?;
    let message = deprecation_message(&ctx, &resolved);
    let headers = version_headers(&resolved, message.as_deref());

    Ok((
        headers,
        Json(ResolveResponse {
            is_deprecated: resolved.is_deprecated,
            sunset_at: resolved.sunset_at,
            deprecation_message: message,
            version: resolved.version,
        }),
    ))
}

/// POST /api/v1/processes/:process_id/run - Serve a request through the cache
pub async fn run_process(
    State(serving): State<Arc<ServingPipeline>>,
    AuthExtractor(auth): AuthExtractor,
    PinnedVersion(pinned): PinnedVersion,
    Path(process_id): Path<ProcessId>,
    Json(body): Json<RunBody>,
) -> ApiResult<(HeaderMap, Json<RunResponse>)> {
    let outcome = serving
        .serve(ServeRequest {
            tenant_id: auth.tenant_id,
            process_id,
            environment: auth.environment,
            pinned,
            input: body.input,
        })
        .await?;

    let mut headers = version_headers(&outcome.resolved, outcome.deprecation_message.as_deref());
    insert(&mut headers, CACHE_STATUS_HEADER, outcome.cache_status());

    Ok((
        headers,
        Json(RunResponse {
            version_number: outcome.resolved.version_number(),
            version_status: outcome.resolved.status_label(),
            cache: outcome.cache_status(),
            produced_at: outcome.produced_at,
            deprecation_message: outcome.deprecation_message,
            data: outcome.payload,
        }),
    ))
}

/// GET /api/v1/cache/stats - Response cache counters since startup
pub async fn cache_stats(
    State(cache): State<Arc<ResponseCache>>,
    AuthExtractor(_auth): AuthExtractor,
) -> ApiResult<Json<CacheStatsResponse>> {
    let stats = cache.stats().await?;
    Ok(Json(CacheStatsResponse {
        hit_rate: stats.hit_rate(),
        stats,
    }))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/processes/:process_id/resolve", get(resolve_version))
        .route("/processes/:process_id/run", post(run_process))
        .route("/cache/stats", get(cache_stats))
}
