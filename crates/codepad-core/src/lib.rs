//! Core of the codepad playground service.
//!
//! Provides the pieces the server wires together per WebSocket session:
//!
//! - **Executor**: one-job-at-a-time runner that drives the Go toolchain
//!   inside a scratch directory and streams frames back to the client
//! - **Directives**: magic-comment extraction and program classification
//! - **Blob store**: content-addressed cache for generated profile reports
//! - **Frames**: the `(action, data)` message vocabulary

pub mod blob;
pub mod directives;
pub mod error;
pub mod exec;
pub mod frame;
pub mod toolchain;

pub use blob::{Blob, BlobStore};
pub use error::{Error, Result};
pub use exec::{Executor, StartAction};
pub use frame::{Action, Frame, FrameSender};
pub use toolchain::Toolchain;
