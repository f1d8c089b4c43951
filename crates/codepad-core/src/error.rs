//! Error types for codepad-core.

use thiserror::Error;

/// Result type for codepad-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in codepad-core.
#[derive(Debug, Error)]
pub enum Error {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
