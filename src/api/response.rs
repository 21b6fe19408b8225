//! Pretty-printed JSON responder
//!
//! Every body this API returns is indented with two spaces and ends with a
//! trailing newline, so `curl` output reads cleanly without piping through a
//! formatter.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Response wrapper that serializes its payload as pretty-printed JSON
pub struct PrettyJson<T>(pub T);

impl<T: Serialize> IntoResponse for PrettyJson<T> {
    fn into_response(self) -> Response {
        match serde_json::to_string_pretty(&self.0) {
            Ok(mut body) => {
                body.push('\n');
                (
                    [(header::CONTENT_TYPE, "application/json")],
                    body,
                )
                    .into_response()
            }
            Err(error) => {
                tracing::error!(%error, "Failed to serialize response body");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
