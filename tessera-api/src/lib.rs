//! Tessera API - HTTP Layer for Versioned Intelligence Endpoints
//!
//! Exposes version authoring, promotion, rollback and serving over REST
//! (Axum). Requests authenticate with API keys bound to a tenant and an
//! environment; serving responses describe the resolved version through
//! `X-Version*`, `X-Deprecated*` and `X-Sunset-Date` headers.
//!
//! Versions and cached responses live either in memory or in PostgreSQL.

pub mod auth;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod headers;
pub mod jobs;
pub mod macros;
pub mod middleware;
pub mod providers;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod validation;

pub use auth::{hash_api_key, AuthConfig, AuthContext};
pub use config::{ApiConfig, StorageBackend};
pub use db::{DbConfig, PgStore};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use headers::{parse_version_header, version_headers, PinnedVersion};
pub use middleware::{auth_middleware, AuthExtractor, AuthMiddlewareState};
pub use providers::{HttpProvider, ProviderConfig};
pub use routes::create_api_router;
pub use state::AppState;
pub use validation::JsonSchemaValidator;
