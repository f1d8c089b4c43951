//! Persistent snippet storage for the codepad playground.
//!
//! Snippets live in a single-file SQLite database with two orderings (by
//! id and by modification time) plus an in-memory name index for
//! relevance queries.
//!
//! # Modules
//!
//! - [`error`]: the `StoreError` taxonomy (bad request / not found /
//!   engine failure)
//! - [`snippet`]: the snippet record
//! - [`schema`]: database opening and embedded migrations
//! - [`sqlite`]: the [`SnippetStore`] implementation

pub mod error;
pub mod schema;
pub mod snippet;
pub mod sqlite;

pub use error::{Result, StoreError};
pub use snippet::Snippet;
pub use sqlite::{SnippetStore, DB_FILE, DEFAULT_ID, DEFAULT_NAME};
