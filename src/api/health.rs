//! Health and diagnostics endpoints. The /stats handler is the concurrent
//! reader that motivates the registry's read lock: it runs on the HTTP task
//! while the hub loop keeps mutating.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

use crate::bridge::BridgeStats;
use crate::registry::RegistryStats;
use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub hub_state: &'static str,
    pub timestamp: chrono::DateTime<Utc>,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: if state.hub.is_running() { "ok" } else { "stopped" },
        hub_state: state.hub.state().as_str(),
        timestamp: Utc::now(),
    })
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub hub_state: &'static str,
    pub registry: RegistryStats,
    pub bridge: BridgeStats,
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        hub_state: state.hub.state().as_str(),
        registry: state.hub.registry().stats().await,
        bridge: state.bridge.stats(),
    })
}
