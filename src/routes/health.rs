use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;
use crate::models::stats::QueueStats;
use crate::services::scheduler::RunState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: String,
    pub max_concurrent: usize,
    pub run_state: RunState,
    pub jobs: QueueStats,
}

/// GET /health — liveness plus a summary of the current session.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.config.gemini_model.clone(),
        max_concurrent: state.scheduler.config().max_concurrent,
        run_state: state.scheduler.run_state(),
        jobs: state.scheduler.stats(),
    };

    (StatusCode::OK, Json(response))
}
