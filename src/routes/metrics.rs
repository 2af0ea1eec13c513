use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

/// GET /metrics — scheduler counters and gauges in Prometheus text format.
pub async fn prometheus_metrics(State(handle): State<Arc<PrometheusHandle>>) -> impl IntoResponse {
    handle.render()
}

/// Registers descriptions for the metrics the scheduler emits.
pub fn describe() {
    metrics::describe_counter!(
        "stockmeta_jobs_submitted_total",
        "Total images submitted for analysis"
    );
    metrics::describe_counter!(
        "stockmeta_jobs_completed_total",
        "Total images that received metadata"
    );
    metrics::describe_counter!(
        "stockmeta_jobs_failed_total",
        "Total images whose analysis failed"
    );
    metrics::describe_gauge!(
        "stockmeta_queue_depth",
        "Images waiting for an analysis slot"
    );
    metrics::describe_gauge!(
        "stockmeta_jobs_in_flight",
        "Analysis calls currently outstanding"
    );
    metrics::describe_histogram!(
        "stockmeta_analysis_seconds",
        "Time from admission to settlement of one analysis call"
    );
}
