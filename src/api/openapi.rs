//! OpenAPI documentation for the REST API

use utoipa::OpenApi;

/// OpenAPI specification for the fetchd API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "fetchd",
        description = "Durable, multi-worker file-download service",
        license(name = "MIT")
    ),
    paths(
        crate::api::routes::create_task,
        crate::api::routes::list_tasks,
        crate::api::routes::get_task,
        crate::api::routes::health_check,
    ),
    components(schemas(
        crate::types::Task,
        crate::types::Item,
        crate::types::TaskId,
        crate::types::TaskStatus,
        crate::types::ItemStatus,
        crate::error::ApiError,
        crate::error::ErrorDetail,
    )),
    tags(
        (name = "tasks", description = "Task submission and inspection"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_the_task_routes() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();

        assert!(json["paths"]["/tasks"].get("post").is_some());
        assert!(json["paths"]["/tasks"].get("get").is_some());
        assert!(json["paths"]["/tasks/{id}"].get("get").is_some());
        assert!(json["paths"]["/health"].get("get").is_some());
    }

    #[test]
    fn openapi_document_carries_the_model_schemas() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_value(&doc).unwrap();
        let schemas = json["components"]["schemas"].as_object().unwrap();

        assert!(schemas.contains_key("Task"));
        assert!(schemas.contains_key("Item"));
        assert!(schemas.contains_key("ApiError"));
    }
}
