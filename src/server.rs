use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::{Config, MetricsConfig},
    handlers::{self, AppState},
    metrics,
    signals::{setup_signal_handlers, shutdown_channel},
    storage::ObservabilityStorage,
};

/// Ingestion batches larger than this are rejected
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Start the telemetry hub server
///
/// This function:
/// 1. Initializes metrics (when enabled)
/// 2. Sets up signal handlers for graceful shutdown
/// 3. Creates the storage engine and the Axum application
/// 4. Serves requests until SIGINT/SIGTERM, then stops live feeds and drains
pub async fn start_server(config: Config) -> Result<()> {
    let metrics_handle = if config.metrics.enabled {
        info!("Initializing Prometheus metrics...");
        Some(Arc::new(metrics::init_metrics()?))
    } else {
        None
    };

    let shutdown_tx = shutdown_channel();
    let signal_handle = setup_signal_handlers(shutdown_tx.clone());
    let mut shutdown_rx = shutdown_tx.subscribe();

    let state = AppState::new(
        Arc::new(ObservabilityStorage::new(&config.storage)),
        config.stream.clone(),
        shutdown_tx,
    );

    let app = create_router(state, &config.metrics, metrics_handle);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting telemetry hub on {}", addr);
    info!(
        trace_capacity = config.storage.trace_capacity,
        log_capacity = config.storage.log_capacity,
        metric_capacity = config.storage.metric_capacity,
        "Storage configured"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Live feeds subscribe to the same channel and end their streams on shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    signal_handle.await?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
///
/// The Prometheus route is only mounted when a handle is given.
pub fn create_router(
    state: AppState,
    metrics_config: &MetricsConfig,
    metrics_handle: Option<Arc<PrometheusHandle>>,
) -> Router {
    use handlers::{health, ingest_api, live, query_api};

    let api_routes = Router::new()
        .route(
            "/api/v1/spans",
            get(query_api::get_spans).post(ingest_api::post_spans),
        )
        .route(
            "/api/v1/logs",
            get(query_api::get_logs).post(ingest_api::post_logs),
        )
        .route(
            "/api/v1/metrics",
            get(query_api::get_metrics).post(ingest_api::post_metrics),
        )
        .route("/api/v1/query", get(query_api::query))
        .route("/api/v1/traces/:trace_id", get(query_api::get_trace))
        .route("/api/v1/services", get(query_api::get_services))
        .route("/api/v1/status", get(query_api::get_status))
        .route("/api/v1/live", get(live::live))
        .route("/api/v1/live/:subscriber_id/pause", post(live::pause_feed))
        .route("/api/v1/live/:subscriber_id/resume", post(live::resume_feed))
        .with_state(state);

    let mut app = Router::new()
        .route("/health", get(health::health_check))
        .merge(api_routes);

    if let Some(handle) = metrics_handle {
        app = app.merge(
            Router::new()
                .route(
                    &metrics_config.endpoint,
                    get(handlers::metrics_handler::metrics),
                )
                .with_state(handle),
        );
    }

    app.layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}
