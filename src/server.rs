use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, Request},
    handler::HandlerWithoutStateExt,
    http::StatusCode,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc, time::Instant};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;

use crate::{
    config::Config,
    handlers::{self, AppState},
    ledger::UsageLedger,
    metrics,
    signals::setup_signal_handlers,
    store::{FileStore, UsageStore},
};

/// Start the usage tracker server
///
/// This function:
/// 1. Creates the usage file with configured limits if it does not exist
/// 2. Initializes metrics (when enabled)
/// 3. Sets up signal handlers for graceful shutdown
/// 4. Binds to the configured address and serves until shutdown
pub async fn start_server(config: Config) -> Result<()> {
    let store = Arc::new(FileStore::new(
        config.storage.data_file.clone(),
        config.limits.default_document(),
    ));

    if store.bootstrap()? {
        info!("Created usage file {}", store.path().display());
    } else {
        let doc = store.load()?;
        info!(
            sessions = doc.sessions.len(),
            total_tokens = doc.total_tokens(),
            "Loaded usage file {}",
            store.path().display()
        );
    }

    let metrics_handle = if config.metrics.enabled {
        info!("Initializing Prometheus metrics...");
        Some(Arc::new(metrics::init_metrics()?))
    } else {
        None
    };

    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let state = AppState {
        ledger: Arc::new(UsageLedger::new(store)),
        log_scan: Arc::new(config.log_scan.clone()),
    };

    let app = create_router(&config, state, metrics_handle);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Token usage tracker running at http://{}", addr);
    info!("Data file: {}", config.storage.data_file.display());
    info!("OTEL logs endpoint: http://{}/v1/logs", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

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
/// API paths answer only their listed method; anything else, on any path,
/// falls through to the static dashboard files and finally to 404.
pub fn create_router(
    config: &Config,
    state: AppState,
    metrics_handle: Option<Arc<PrometheusHandle>>,
) -> Router {
    let api_routes = Router::new()
        .route(
            "/api/usage",
            get(handlers::usage::get_usage).fallback(not_found),
        )
        .route(
            "/api/scan-logs",
            get(handlers::scan::scan_logs).fallback(not_found),
        )
        .route(
            "/api/session",
            post(handlers::usage::create_session).fallback(not_found),
        )
        .route(
            "/api/settings",
            post(handlers::usage::update_settings).fallback(not_found),
        )
        .route(
            "/api/delete-session",
            post(handlers::usage::delete_session).fallback(not_found),
        )
        .route(
            "/api/calibration",
            post(handlers::usage::add_calibration).fallback(not_found),
        )
        .route(
            "/v1/logs",
            post(handlers::otel::ingest_logs).fallback(not_found),
        )
        .route_layer(middleware::from_fn(track_api_metrics))
        .with_state(state);

    let static_files = ServeDir::new(&config.storage.public_dir)
        .call_fallback_on_method_not_allowed(true)
        .not_found_service(not_found.into_service());

    let mut app = Router::new().merge(api_routes);

    if let Some(handle) = metrics_handle {
        let metrics_routes = Router::new()
            .route(
                &config.metrics.endpoint,
                get(handlers::metrics_handler::metrics),
            )
            .with_state(handle);
        app = app.merge(metrics_routes);
    }

    app.fallback_service(static_files)
        // Limit request body size to 10MB
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

async fn track_api_metrics(request: Request, next: Next) -> Response {
    let endpoint = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    metrics::record_request(&endpoint);
    metrics::record_duration(&endpoint, start.elapsed());
    response
}
