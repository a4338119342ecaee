//! Error types for the HTTP server.

use std::path::PathBuf;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Listening socket could not be bound.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// File watcher could not be created.
    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// A watch root could not be watched.
    #[error("Cannot watch {}: {source}", path.display())]
    Watch {
        /// Root directory that failed.
        path: PathBuf,
        /// Underlying watcher error.
        source: notify::Error,
    },

    /// Response body could not be buffered for script injection.
    #[error("Failed to read response body: {0}")]
    Body(#[from] axum::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Request failed");

        let body = json!({"error": self.to_string()});
        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
    }
}
