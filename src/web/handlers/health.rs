//! # Health Check Handlers

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::resilience::CircuitBreakerMetrics;
use crate::web::state::AppState;

/// Basic health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    timestamp: String,
    environment: String,
    uptime_seconds: u64,
    /// Post-processing tasks still running
    background_tasks: usize,
    asset_probe: CircuitBreakerMetrics,
}

/// Liveness probe: GET /health
pub async fn basic_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        environment: state.config().environment.clone(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        background_tasks: state.context.tasks.len(),
        asset_probe: state.context.asset_probe.metrics(),
    })
}
