//! HTTP and WebSocket routes.

use std::sync::atomic::AtomicI64;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::http::header::{CONTENT_TYPE, SET_COOKIE};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use codepad_core::blob::BlobStore;
use codepad_core::toolchain::Toolchain;
use codepad_store::{Snippet, SnippetStore};

use crate::auth::{self, AuthKeys};
use crate::error::{ServerError, ServerResult};
use crate::session;

/// Application state shared across handlers and sessions.
pub struct AppState {
    /// Snippet persistence, shared by every client.
    pub store: Arc<SnippetStore>,
    /// Profile report cache, shared by every executor.
    pub blobs: Arc<BlobStore>,
    /// Toolchain configuration handed to each executor.
    pub toolchain: Toolchain,
    /// Authentication material.
    pub auth: AuthKeys,
    /// Sequence for client connection ids (logging only).
    pub(crate) client_seq: AtomicI64,
    /// Currently connected clients (logging only).
    pub(crate) clients_active: AtomicI64,
}

impl AppState {
    pub fn new(
        store: Arc<SnippetStore>,
        blobs: Arc<BlobStore>,
        toolchain: Toolchain,
        auth: AuthKeys,
    ) -> Self {
        Self {
            store,
            blobs,
            toolchain,
            auth,
            client_seq: AtomicI64::new(0),
            clients_active: AtomicI64::new(0),
        }
    }
}

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/", get(index_handler))
        .route("/snippets", get(list_snippets).post(create_snippet))
        .route(
            "/snippets/{id}",
            get(get_snippet).put(update_snippet).delete(delete_snippet),
        )
        .route("/websocket", get(ws_handler))
        .route("/dynamic/{id}", get(dynamic_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    Router::new()
        .route("/login", axum::routing::post(login_handler))
        .merge(protected)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Minimal index page; the real frontend is served separately.
async fn index_handler() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head><title>codepad</title></head>
<body>
    <h1>codepad</h1>
    <p>WebSocket endpoint: <code>/websocket</code></p>
    <ul>
        <li><code>GET /snippets</code> - query snippets</li>
        <li><code>POST /snippets</code> - create a snippet</li>
        <li><code>GET /dynamic/{id}</code> - fetch a profile report</li>
    </ul>
</body>
</html>"#,
    )
}

/// Query parameters of the snippet listing endpoint. Unknown parameters
/// are rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ListingParams {
    /// JSON-encoded snippet whose fields seed the query cursor.
    query: Option<String>,
    #[serde(rename = "queryBy")]
    query_by: Option<String>,
    limit: Option<i64>,
    #[serde(rename = "allFields")]
    all_fields: Option<bool>,
}

/// `GET /snippets` — list snippets by id, modification time, or name
/// relevance. Without `allFields` the `code` field is omitted.
async fn list_snippets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListingParams>,
) -> ServerResult<Json<Vec<Snippet>>> {
    let cursor: Snippet = match params.query.as_deref() {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| ServerError::BadRequest(format!("invalid query: {e}")))?,
        None => Snippet::default(),
    };
    let limit = params.limit.unwrap_or(100);

    let mut snippets = match params.query_by.as_deref().unwrap_or("id") {
        "id" => state.store.query_by_id(cursor.id, limit)?,
        "modified" => state
            .store
            .query_by_modified(cursor.modified, cursor.id, limit)?,
        "name" => state.store.query_by_name(&cursor.name, limit)?,
        other => {
            return Err(ServerError::BadRequest(format!(
                "invalid queryBy value: {other}"
            )))
        }
    };

    if !params.all_fields.unwrap_or(false) {
        for s in &mut snippets {
            s.code.clear();
        }
    }
    Ok(Json(snippets))
}

/// `POST /snippets`
async fn create_snippet(
    State(state): State<Arc<AppState>>,
    Json(snippet): Json<Snippet>,
) -> ServerResult<Json<Snippet>> {
    let created = state.store.create(&snippet)?;
    tracing::info!("created snippet {}", created.id);
    Ok(Json(created))
}

/// `GET /snippets/{id}`
async fn get_snippet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ServerResult<Json<Snippet>> {
    let snippet = state.store.retrieve(id)?;
    tracing::info!("retrieved snippet {id}");
    Ok(Json(snippet))
}

/// `PUT /snippets/{id}`
async fn update_snippet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(snippet): Json<Snippet>,
) -> ServerResult<StatusCode> {
    state.store.update(&snippet, id)?;
    tracing::info!("updated snippet {id}");
    Ok(StatusCode::OK)
}

/// `DELETE /snippets/{id}`
async fn delete_snippet(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ServerResult<StatusCode> {
    state.store.delete(id)?;
    tracing::info!("deleted snippet {id}");
    Ok(StatusCode::OK)
}

/// `GET /dynamic/{id}` — serve a generated profile report.
async fn dynamic_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.blobs.retrieve(&id) {
        Some(blob) if !blob.data.is_empty() && !blob.mime.is_empty() => {
            ([(CONTENT_TYPE, blob.mime)], blob.data).into_response()
        }
        _ => (StatusCode::NOT_FOUND, "blob not found").into_response(),
    }
}

/// `POST /login` — the body is the raw password; success installs the
/// auth cookie.
async fn login_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    if state.auth.check_password(&body) {
        tracing::info!("authentication success");
        let token = state.auth.format_token(Utc::now());
        (
            StatusCode::OK,
            [(SET_COOKIE, auth::cookie_header(&token))],
        )
            .into_response()
    } else {
        tracing::warn!("authentication failure");
        (StatusCode::UNAUTHORIZED, "unauthorized").into_response()
    }
}

/// `GET /websocket` — upgrade and hand the socket to a session.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session::handle_socket(socket, state))
}
