//! Application state for the API server

use crate::config::Config;
use crate::manager::DownloadManager;
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// Cloned per request (cheap `Arc` clones); hands route handlers the
/// download manager and the service configuration.
#[derive(Clone)]
pub struct AppState {
    /// The download manager instance
    pub manager: Arc<DownloadManager>,

    /// Service configuration (read-only at runtime)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(manager: Arc<DownloadManager>, config: Arc<Config>) -> Self {
        Self { manager, config }
    }
}
