//! Storage error types.

use thiserror::Error;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors produced by snippet storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The caller supplied bad input; rendered as HTTP 400 at the boundary.
    #[error("{0}")]
    BadRequest(String),

    /// No snippet with the requested id; rendered as HTTP 404.
    #[error("not found")]
    NotFound,

    /// The storage engine failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// IO failure opening or creating the database.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn bad_request(msg: impl Into<String>) -> Self {
        StoreError::BadRequest(msg.into())
    }
}
