//! Error types for the codepad server.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use codepad_store::StoreError;

/// Server error type.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Snippet store failure; carries its own 400/404 taxonomy.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The caller supplied bad input.
    #[error("{0}")]
    BadRequest(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::BadRequest(_) | ServerError::Store(StoreError::BadRequest(_)) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            _ => {
                tracing::error!("internal error: {self}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
