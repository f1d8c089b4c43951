//! codepad playground server.
//!
//! Serves the authenticated HTTP surface (snippet CRUD, profile blob
//! delivery, login) and the WebSocket endpoint that wires each client to
//! its own executor.
//!
//! # Architecture
//!
//! - **Routes**: router construction and the HTTP handlers
//! - **Session**: WebSocket ↔ executor wiring, one executor per client
//! - **Auth**: HMAC-signed sliding token and the auth middleware
//! - **Error**: taxonomy mapping to HTTP status codes

pub mod auth;
pub mod error;
pub mod routes;
pub mod session;

pub use auth::AuthKeys;
pub use error::{ServerError, ServerResult};
pub use routes::{create_router, AppState};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `localhost:8080`.
    pub serve_address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            serve_address: "localhost:8080".to_string(),
        }
    }
}

/// Serve until interrupted.
pub async fn serve(
    state: std::sync::Arc<AppState>,
    config: ServerConfig,
) -> ServerResult<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.serve_address).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received shutdown signal");
            let _ = shutdown_tx.send(());
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.await;
        })
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}
