//! REST API Routes
//!
//! Everything under `/api/v1` requires an API key; `/health` does not.
//!
//! - `/api/v1/processes/:process_id/versions` - history and saves
//! - `/api/v1/processes/:process_id/promote` and `/rollback` - transitions
//! - `/api/v1/processes/:process_id/resolve` and `/run` - serving
//! - `/api/v1/versions/...` - lookup and diff by version id
//! - `/api/v1/cache/stats` - response cache counters

pub mod health;
pub mod serving;
pub mod versions;

use std::time::Duration;

use axum::{
    http::{header, request::Parts, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use crate::constants::{
    API_KEY_HEADER, API_PREFIX, CACHE_STATUS_HEADER, DEPRECATED_HEADER, DEPRECATED_MESSAGE_HEADER,
    SUNSET_DATE_HEADER, VERSION_HEADER, VERSION_STATUS_HEADER,
};
use crate::middleware::{auth_middleware, AuthMiddlewareState};
use crate::state::AppState;

/// Create the complete API router.
///
/// Layers, outermost first: CORS, request tracing, then API-key
/// authentication on the `/api/v1` subtree.
pub fn create_api_router(state: AppState, api_config: &ApiConfig, auth_config: AuthConfig) -> Router {
    if auth_config.is_empty() {
        tracing::warn!("No API keys configured; every /api/v1 request will be rejected");
    }

    let api_routes = Router::new()
        .merge(versions::create_router())
        .merge(serving::create_router())
        .layer(from_fn_with_state(
            AuthMiddlewareState::new(auth_config),
            auth_middleware,
        ))
        .with_state(state.clone());

    Router::new()
        .nest(API_PREFIX, api_routes)
        .nest("/health", health::create_router(state))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(api_config))
}

/// Build the CORS layer from ApiConfig.
///
/// With no configured origins every origin is allowed (development mode).
/// Otherwise only matching origins are, including `*.example.com` wildcards.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let exposed = [
        HeaderName::from_static(VERSION_HEADER),
        HeaderName::from_static(VERSION_STATUS_HEADER),
        HeaderName::from_static(DEPRECATED_HEADER),
        HeaderName::from_static(DEPRECATED_MESSAGE_HEADER),
        HeaderName::from_static(SUNSET_DATE_HEADER),
        HeaderName::from_static(CACHE_STATUS_HEADER),
    ];
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(API_KEY_HEADER),
            HeaderName::from_static(VERSION_HEADER),
        ])
        .expose_headers(exposed)
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        return cors.allow_origin(Any);
    }

    tracing::info!(origins = ?config.cors_origins, "CORS: restricting origins");
    let matcher = config.clone();
    let cors = cors.allow_origin(AllowOrigin::predicate(
        move |origin: &HeaderValue, _parts: &Parts| {
            origin
                .to_str()
                .map(|o| matcher.is_origin_allowed(o))
                .unwrap_or(false)
        },
    ));
    if config.cors_allow_credentials {
        cors.allow_credentials(true)
    } else {
        cors
    }
}
