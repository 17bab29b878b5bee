use std::net::SocketAddr;
use std::process::ExitCode;

use tokio::net::TcpListener;
use tracing::{error, info};

use product_ingest::config::LogFormat;
use product_ingest::{AppState, Config, build_router, metrics, store, utils};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    // Load configuration before logging so LOG_FORMAT applies from the first line
    let config = Config::from_env().map_err(|e| {
        utils::init_tracing(LogFormat::Json, "info");
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;

    utils::init_tracing(config.log_format, &config.log_level);

    info!(
        "Starting Product Ingest Service v{}",
        env!("CARGO_PKG_VERSION")
    );
    info!(
        host = %config.host,
        port = %config.port,
        backend = %config.store_backend,
        database = %config.mongo_database,
        collection = %config.mongo_collection,
        "Configuration loaded"
    );

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    // Connect to the document store; failure here is fatal
    info!("Connecting to document store...");
    let store = store::connect(&config).await.map_err(|e| {
        error!("Failed to connect to document store: {e}");
        exitcode::UNAVAILABLE
    })?;
    info!(backend = store.backend(), "Document store ready");

    // Build application state and router
    let state = AppState::new(store, config.clone());
    state.start_background_tasks();
    let app = build_router(state.clone());

    // Start server
    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("API endpoints:");
    info!("  GET  /health    - Health check");
    info!("  POST /products  - Create a product");

    // Peer addresses feed the rate limiter when no X-Forwarded-For is present
    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await;

    // Gracefully shutdown background tasks
    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;

    served.map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("Server shutdown complete");
    Ok(())
}
