//! Telemetry Ingest - Binary Entry Point
//!
//! Loads configuration, starts the ingestion pipeline and serves the HTTP
//! API until Ctrl+C or SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing::{error, info, warn};

use telemetry_ingest::{
    create_router, AppState, EventStore, IngestPipeline, ServerConfig, SqliteStore,
};

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("telemetry_ingest=info".parse()?)
                .add_directive("ingest_server=info".parse()?),
        )
        .init();

    let config = ServerConfig::load()?;
    info!(app = %config.app_name, env = %config.env, "Starting ingest server");
    info!("Version: {}", telemetry_ingest::VERSION);

    if let Some(dir) = config.database_path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!(error = %e, dir = ?dir, "Could not create database directory");
        }
    }

    let auth = config.tenant_auth();
    if !auth.is_enforcing() {
        warn!("API key or tenant not configured; requests will not be authenticated");
    }

    let sqlite = SqliteStore::new(&config.database_path).with_busy_timeout(config.busy_timeout());
    info!("Database path: {:?}", sqlite.path());
    let store: Arc<dyn EventStore> = Arc::new(sqlite);
    let pipeline = IngestPipeline::new(Arc::clone(&store), config.pipeline_config());
    if pipeline.bootstrap().await {
        info!("Storage reachable");
    }

    let addr: SocketAddr = config.listen_addr.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let handle = pipeline.spawn();
    let state = Arc::new(AppState::new(&pipeline, auth));
    let app = create_router(state);

    info!("Starting HTTP server on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Stop background tasks before the store goes away, even if serving failed
    let remaining = handle.shutdown().await;
    drop(pipeline);
    drop(store);

    served?;
    info!(remaining, "Server shutdown complete");
    Ok(())
}
