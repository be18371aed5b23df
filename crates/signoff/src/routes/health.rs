//! Health check endpoints.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use serde::Serialize;

use crate::config::StoreBackend;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    store: bool,
}

/// Readiness check (is the code store reachable?)
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadyResponse>, StatusCode> {
    if state.codes.store_ready().await {
        Ok(Json(ReadyResponse {
            status: "ready",
            store: true,
        }))
    } else {
        // Return 503 if not ready
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[derive(Serialize)]
pub struct StatsResponse {
    store: &'static str,
    code_ttl_secs: u64,
    retention_secs: u64,
    uptime_secs: u64,
}

/// Effective settings and uptime (for monitoring)
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let policy = state.codes.policy();

    Json(StatsResponse {
        store: match state.config.store {
            StoreBackend::Redis => "redis",
            StoreBackend::Memory => "memory",
        },
        code_ttl_secs: policy.ttl_secs,
        retention_secs: policy.retention_secs,
        uptime_secs: state.started.elapsed().as_secs(),
    })
}
