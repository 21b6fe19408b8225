//! # fetchd
//!
//! Durable, multi-worker file-download service.
//!
//! Clients submit a *task* of one or more source URLs over a small REST
//! API; the service downloads each URL to a local data directory, tracks
//! per-item progress, retries transient failures with linear backoff, and
//! survives process restarts.
//!
//! ## Architecture
//!
//! - [`store`] - durable task store: an fsynced write-ahead log plus
//!   periodic snapshots, replayed at startup
//! - [`manager`] - worker pool consuming a bounded queue of
//!   `(task, item-index)` tickets, per-task serialization, a linear-backoff
//!   retry scheduler, and a resumable-download state machine
//! - [`api`] - axum REST facade
//! - [`config`] - environment configuration with `.env` support
//!
//! Crash recovery ties these together: at startup the store replays its
//! log, then the manager re-queues every non-terminal item. Partial
//! `.part` files left on disk make the next GET resume from the correct
//! byte offset.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fetchd::{Config, DownloadManager, ManagerConfig, TaskStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load();
//!     let store = Arc::new(TaskStore::open(&config.state_dir, config.force_reset).await?);
//!     let manager = Arc::new(DownloadManager::new(store.clone(), ManagerConfig::from(&config)));
//!     manager.start().await?;
//!
//!     let id = manager
//!         .create_task(vec!["http://example.com/archive.zip".to_string()])
//!         .await?;
//!     println!("submitted {id}");
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// REST API module
pub mod api;
/// Configuration
pub mod config;
/// Error types
pub mod error;
/// Download manager: worker pool, queue, retries
pub mod manager;
/// Durable task store (WAL + snapshots)
pub mod store;
/// Core task/item types
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{ApiError, Error, ErrorDetail, Result, ToHttpStatus};
pub use manager::{DownloadManager, ManagerConfig};
pub use store::TaskStore;
pub use types::{derive_file_name, Item, ItemStatus, Task, TaskId, TaskStatus};

/// Wait for a termination signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with a Ctrl+C fallback if
///   signal registration fails (restricted environments, containers).
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        _ => {
            tracing::warn!("Could not register signal handlers, using ctrl_c fallback");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

/// Wait for a termination signal (Ctrl+C on non-Unix platforms).
#[cfg(not(unix))]
pub async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(error) => tracing::error!(%error, "Failed to listen for Ctrl+C signal"),
    }
}
