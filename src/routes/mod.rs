use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

pub mod error;
pub mod health;
pub mod jobs;
pub mod metrics;

/// API routes without the Prometheus endpoint, which needs its own recorder.
pub fn api_router(state: AppState) -> Router {
    let upload_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_check))
        .route(
            "/api/v1/jobs",
            post(jobs::submit_jobs)
                .get(jobs::list_jobs)
                .delete(jobs::clear_jobs),
        )
        .route("/api/v1/jobs/start", post(jobs::start_jobs))
        .route("/api/v1/jobs/{job_id}", get(jobs::get_job))
        .route("/api/v1/jobs/{job_id}/preview", get(jobs::get_preview))
        .route("/api/v1/stats", get(jobs::get_stats))
        .route("/api/v1/export.csv", get(jobs::export_csv))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(upload_limit))
}
