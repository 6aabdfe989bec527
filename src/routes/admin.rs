//! Operational endpoints: /health, /ts

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub node_name: String,
    pub uptime_secs: u64,
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    tracing::debug!("health check requested");
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        node_name: state.config.node_name.clone(),
        uptime_secs: state.uptime_secs(),
    })
}

/// GET /ts
///
/// Current node clock, unix microseconds. Clients use this to timestamp
/// against the server's timeline instead of their own (clock skew).
pub async fn ts(State(state): State<Arc<AppState>>) -> Json<i64> {
    Json(state.clock.now_micros())
}
