//! fetchd server binary
//!
//! Wires the durable store, the download manager, and the REST API
//! together, then runs until SIGINT/SIGTERM triggers an orderly shutdown.

use fetchd::{api, Config, DownloadManager, ManagerConfig, TaskStore};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// How long shutdown waits for workers to drain before giving up
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() {
    let config = Config::load();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(error) = run(config).await {
        tracing::error!(%error, "Fatal error");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> fetchd::Result<()> {
    tracing::info!(
        port = config.port,
        workers = config.workers,
        data_dir = %config.data_dir.display(),
        state_dir = %config.state_dir.display(),
        "Starting fetchd"
    );

    tokio::fs::create_dir_all(&config.data_dir).await?;

    let store = Arc::new(TaskStore::open(&config.state_dir, config.force_reset).await?);
    let manager = Arc::new(DownloadManager::new(
        Arc::clone(&store),
        ManagerConfig::from(&config),
    ));
    manager.start().await?;

    let shutdown = CancellationToken::new();
    let server = tokio::spawn(api::start_api_server(
        Arc::clone(&manager),
        Arc::new(config),
        shutdown.clone(),
    ));

    fetchd::wait_for_signal().await;
    tracing::info!("Shutdown signal received");

    // Stop accepting connections first, then drain the workers, then write
    // a final snapshot so the next start replays almost nothing.
    shutdown.cancel();
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => tracing::warn!(%error, "API server exited with error"),
        Err(error) => tracing::warn!(%error, "API server task panicked"),
    }

    if let Err(error) = manager.stop_and_wait(SHUTDOWN_DEADLINE).await {
        tracing::warn!(%error, "Download manager did not stop cleanly");
    }
    if let Err(error) = store.save_snapshot().await {
        tracing::warn!(%error, "Final snapshot failed");
    }
    store.close().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
