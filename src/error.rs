//! Error types for fetchd
//!
//! One error enum for the whole service, an HTTP mapping for the API layer,
//! and the JSON error envelope returned to clients. Worker-level download
//! failures flow into item state rather than propagating; the variants here
//! surface at component boundaries (store, manager, API, startup).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use utoipa::ToSchema;

/// Result type alias for fetchd operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for fetchd
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description of the configuration issue
        message: String,
    },

    /// I/O error (filesystem, WAL, sockets)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error while downloading
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON encoding/decoding error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Download response carried a non-200/206 status
    #[error("bad status: {status}")]
    BadStatus {
        /// The offending HTTP status
        status: reqwest::StatusCode,
    },

    /// The snapshot file exists but does not parse; refusing to silently
    /// discard state (set `FORCE_RESET=true` to start empty)
    #[error("corrupt snapshot at {path}: {reason}")]
    CorruptSnapshot {
        /// Path of the unreadable snapshot
        path: PathBuf,
        /// Parse failure detail
        reason: String,
    },

    /// Operation attempted after the store was closed
    #[error("store is closed")]
    StoreClosed,

    /// Task not found
    #[error("task not found: {0}")]
    NotFound(String),

    /// Client-supplied input was rejected
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Shutdown in progress - not accepting new tasks
    #[error("shutdown in progress: not accepting new tasks")]
    ShuttingDown,

    /// Workers did not drain within the shutdown deadline
    #[error("shutdown deadline exceeded with workers still running")]
    ShutdownTimedOut,
}

/// API error response format
///
/// ```json
/// {
///   "error": {
///     "code": "not_found",
///     "message": "task abc123 not found"
///   }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// The error details
    pub error: ErrorDetail,
}

/// Detailed error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code (e.g. "not_found", "validation_error")
    pub code: String,

    /// Human-readable error message
    pub message: String,
}

impl ApiError {
    /// Create a new API error with code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    /// Create a "not found" error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new("not_found", format!("{} not found", resource.into()))
    }

    /// Create a "validation error" error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    /// Create an "internal server error"
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", message)
    }
}

/// Convert errors to HTTP status codes for API responses
pub trait ToHttpStatus {
    /// Get the HTTP status code for this error
    fn status_code(&self) -> u16;

    /// Get the machine-readable error code
    fn error_code(&self) -> &str;
}

impl ToHttpStatus for Error {
    fn status_code(&self) -> u16 {
        match self {
            // 400 Bad Request - client-side input problems
            Error::InvalidRequest(_) => 400,

            // 404 Not Found
            Error::NotFound(_) => 404,

            // 502 Bad Gateway - the download origin misbehaved
            Error::Network(_) | Error::BadStatus { .. } => 502,

            // 503 Service Unavailable
            Error::ShuttingDown => 503,

            // 500 Internal Server Error - everything server-side
            Error::Config { .. }
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::CorruptSnapshot { .. }
            | Error::StoreClosed
            | Error::ShutdownTimedOut => 500,
        }
    }

    fn error_code(&self) -> &str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Io(_) => "io_error",
            Error::Network(_) => "network_error",
            Error::Serialization(_) => "serialization_error",
            Error::BadStatus { .. } => "bad_status",
            Error::CorruptSnapshot { .. } => "corrupt_snapshot",
            Error::StoreClosed => "store_closed",
            Error::NotFound(_) => "not_found",
            Error::InvalidRequest(_) => "validation_error",
            Error::ShuttingDown => "shutting_down",
            Error::ShutdownTimedOut => "shutdown_timeout",
        }
    }
}

impl From<&Error> for ApiError {
    fn from(error: &Error) -> Self {
        ApiError::new(error.error_code(), error.to_string())
    }
}
