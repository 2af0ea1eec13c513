use std::sync::Arc;

use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use stockmeta::app_state::AppState;
use stockmeta::config::AppConfig;
use stockmeta::routes;
use stockmeta::services::analysis::GeminiClient;
use stockmeta::services::scheduler::{Scheduler, SchedulerConfig};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing stockmeta server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe();

    // Initialize Gemini client
    tracing::info!(model = %config.gemini_model, "Initializing Gemini client");
    let gemini = Arc::new(GeminiClient::from_config(&config));

    // Start the scheduler and its settlement loop
    let scheduler_config = SchedulerConfig::from(&config);
    tracing::info!(
        max_concurrent = scheduler_config.max_concurrent,
        auto_start = scheduler_config.auto_start,
        "Starting scheduler"
    );
    let (scheduler, settlement_loop) = Scheduler::new(scheduler_config, gemini);
    let shutdown = CancellationToken::new();
    let loop_handle = tokio::spawn(settlement_loop.run(shutdown.clone()));

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(scheduler, config);

    let app = routes::api_router(state).route(
        "/metrics",
        get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
    );

    tracing::info!("Starting stockmeta on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", bind_addr);

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
            server_shutdown.cancel();
        })
        .await
        .expect("Server error");

    shutdown.cancel();
    if let Err(e) = loop_handle.await {
        tracing::error!(error = %e, "Settlement loop ended abnormally");
    }
}
