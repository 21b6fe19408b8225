//! Task management handlers.

use super::response::PrettyJson;
use crate::api::AppState;
use crate::error::{ApiError, ToHttpStatus};
use crate::types::TaskId;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// POST /tasks - Submit a batch of URLs to download
#[utoipa::path(
    post,
    path = "/tasks",
    tag = "tasks",
    request_body(content = String, description = "JSON object with a non-empty \"urls\" string array", content_type = "application/json"),
    responses(
        (status = 201, description = "Task created, body carries its id"),
        (status = 400, description = "Malformed JSON or missing/empty urls", body = ApiError),
        (status = 500, description = "Store failure while persisting the task", body = ApiError),
        (status = 503, description = "Shutdown in progress", body = ApiError)
    )
)]
pub async fn create_task(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Response {
    let urls = match parse_urls(&payload) {
        Ok(urls) => urls,
        Err(response) => return response,
    };

    match state.manager.create_task(urls).await {
        Ok(id) => (StatusCode::CREATED, PrettyJson(json!({ "id": id }))).into_response(),
        Err(error) => {
            tracing::error!(%error, "Failed to create task");
            error_response(&error)
        }
    }
}

/// GET /tasks - List all tasks
#[utoipa::path(
    get,
    path = "/tasks",
    tag = "tasks",
    responses(
        (status = 200, description = "All tasks in creation order", body = Vec<crate::types::Task>)
    )
)]
pub async fn list_tasks(State(state): State<AppState>) -> Response {
    let tasks = state.manager.list().await;
    (StatusCode::OK, PrettyJson(tasks)).into_response()
}

/// GET /tasks/:id - Get a single task
#[utoipa::path(
    get,
    path = "/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "Hex task id")
    ),
    responses(
        (status = 200, description = "The task record", body = crate::types::Task),
        (status = 404, description = "No task with this id", body = ApiError)
    )
)]
pub async fn get_task(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.manager.get(&TaskId::from(id.clone())).await {
        Some(task) => (StatusCode::OK, PrettyJson(task)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            PrettyJson(ApiError::not_found(format!("task {id}"))),
        )
            .into_response(),
    }
}

/// GET /health - Health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Service is alive")
    )
)]
pub async fn health_check() -> Response {
    (StatusCode::OK, PrettyJson(json!({ "status": "ok" }))).into_response()
}

/// GET /openapi.json - OpenAPI specification
pub async fn openapi_spec() -> Response {
    use utoipa::OpenApi;
    (StatusCode::OK, PrettyJson(super::ApiDoc::openapi())).into_response()
}

/// Extract and validate the `urls` field from the request payload
fn parse_urls(payload: &serde_json::Value) -> Result<Vec<String>, Response> {
    let Some(values) = payload.get("urls").and_then(|value| value.as_array()) else {
        return Err(bad_request("missing required field: urls"));
    };
    if values.is_empty() {
        return Err(bad_request("urls must not be empty"));
    }

    let mut urls = Vec::with_capacity(values.len());
    for value in values {
        match value.as_str() {
            Some(url) if !url.is_empty() => urls.push(url.to_string()),
            _ => return Err(bad_request("urls entries must be non-empty strings")),
        }
    }
    Ok(urls)
}

fn bad_request(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        PrettyJson(ApiError::validation(message)),
    )
        .into_response()
}

fn error_response(error: &crate::error::Error) -> Response {
    let status =
        StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, PrettyJson(ApiError::from(error))).into_response()
}
