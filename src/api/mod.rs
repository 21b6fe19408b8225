//! REST API server module
//!
//! A thin adapter over the download manager: task submission, task listing,
//! and a liveness probe. All successful responses are pretty-printed JSON
//! with two-space indentation; method mismatches on known paths return 405
//! through axum's method routing.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::manager::DownloadManager;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

pub mod openapi;
pub mod response;
pub mod routes;
pub mod state;


pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// - `POST /tasks` - Submit a batch of URLs to download
/// - `GET /tasks` - List all tasks (full detail)
/// - `GET /tasks/:id` - Get a single task
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
pub fn create_router(manager: Arc<DownloadManager>, config: Arc<Config>) -> Router {
    let state = AppState::new(manager, config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/tasks", post(routes::create_task).get(routes::list_tasks))
        .route("/tasks/:id", get(routes::get_task))
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .with_state(state)
        .layer(cors)
}

/// Start the API server on the configured bind address
///
/// Binds a TCP listener and serves the router until `shutdown` is
/// cancelled, at which point in-flight connections are drained and the
/// function returns.
pub async fn start_api_server(
    manager: Arc<DownloadManager>,
    config: Arc<Config>,
    shutdown: CancellationToken,
) -> Result<()> {
    let bind_address = config.bind_address();
    let app = create_router(manager, config);

    let listener = TcpListener::bind(bind_address).await.map_err(Error::Io)?;
    tracing::info!(address = %bind_address, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(Error::Io)?;

    tracing::info!("API server stopped");
    Ok(())
}
