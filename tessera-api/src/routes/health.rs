//! Unauthenticated health checks under `/health`.
//!
//! `ping` and `live` answer as long as the process runs; `ready` also
//! round-trips to the version store and turns 503 when that fails.

use std::time::Instant;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use tessera_lifecycle::LifecycleContext;

use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    fn http_status(self) -> StatusCode {
        match self {
            Self::Healthy => StatusCode::OK,
            Self::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Outcome of the store round-trip done by the readiness check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreCheck {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store: Option<StoreCheck>,
}

impl HealthReport {
    fn alive() -> Self {
        Self {
            status: HealthStatus::Healthy,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: None,
            store: None,
        }
    }
}

async fn ping() -> &'static str {
    "pong"
}

async fn liveness() -> Json<HealthReport> {
    Json(HealthReport::alive())
}

async fn readiness(
    State(ctx): State<LifecycleContext>,
    State(booted_at): State<Instant>,
) -> (StatusCode, Json<HealthReport>) {
    let check_start = Instant::now();
    let check = match ctx.store.ping().await {
        Ok(()) => StoreCheck {
            status: HealthStatus::Healthy,
            latency_ms: Some(check_start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "version store did not answer readiness check");
            StoreCheck {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                error: Some(e.to_string()),
            }
        }
    };

    let report = HealthReport {
        status: check.status,
        uptime_seconds: Some(booted_at.elapsed().as_secs()),
        store: Some(check),
        ..HealthReport::alive()
    };
    (report.status.http_status(), Json(report))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_report_omits_store_fields() {
        let json = serde_json::to_value(HealthReport::alive()).unwrap();
        assert_eq!(json["status"], "healthy");
        assert!(json.get("store").is_none());
        assert!(json.get("uptime_seconds").is_none());
    }

    #[test]
    fn test_unhealthy_maps_to_503() {
        assert_eq!(
            HealthStatus::Unhealthy.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(HealthStatus::Healthy.http_status(), StatusCode::OK);
    }
}
