//! End-to-end tests for the HTTP API.
//!
//! Each test builds a fresh router over an in-memory snippet store and
//! drives it with `tower::ServiceExt::oneshot`, no network server needed.

use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{Request, StatusCode};
use axum::Router;
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use codepad_core::blob::{Blob, BlobStore};
use codepad_core::toolchain::Toolchain;
use codepad_server::{create_router, AppState, AuthKeys};
use codepad_store::{SnippetStore, DEFAULT_ID, DEFAULT_NAME};

const PASSWORD: &[u8] = b"correct horse";

fn open_state() -> Arc<AppState> {
    let store = Arc::new(SnippetStore::in_memory().unwrap());
    let blobs = Arc::new(BlobStore::new());
    Arc::new(AppState::new(
        store,
        blobs,
        Toolchain::new("go", "gofmt"),
        AuthKeys::disabled(),
    ))
}

fn password_keys() -> AuthKeys {
    let salt = [9u8; 32];
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(PASSWORD);
    AuthKeys::new(hasher.finalize().into(), salt)
}

fn app(state: &Arc<AppState>) -> Router {
    create_router(state.clone())
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn snippet_crud_round_trip() {
    let state = open_state();

    // Create.
    let response = app(&state)
        .oneshot(json_request(
            "POST",
            "/snippets",
            serde_json::json!({"name": "demo", "code": "package main\n"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    let id = created["id"].as_i64().unwrap();
    assert_eq!(id, DEFAULT_ID + 1);
    assert_eq!(created["name"], "demo");
    assert_eq!(created["created"], created["modified"]);

    // Retrieve.
    let response = app(&state)
        .oneshot(get(&format!("/snippets/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let fetched = body_json(response).await;
    assert_eq!(fetched["code"], "package main\n");

    // Update.
    let response = app(&state)
        .oneshot(json_request(
            "PUT",
            &format!("/snippets/{id}"),
            serde_json::json!({"name": "demo renamed"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Delete.
    let response = app(&state)
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/snippets/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&state)
        .oneshot(get(&format!("/snippets/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn create_rejects_bad_input() {
    let state = open_state();

    let response = app(&state)
        .oneshot(json_request(
            "POST",
            "/snippets",
            serde_json::json!({"name": "", "code": "x"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app(&state)
        .oneshot(json_request(
            "POST",
            "/snippets",
            serde_json::json!({"id": 7, "name": "x"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn update_guards_default_snippet() {
    let state = open_state();
    let response = app(&state)
        .oneshot(json_request(
            "PUT",
            &format!("/snippets/{DEFAULT_ID}"),
            serde_json::json!({"name": "hijacked"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app(&state)
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/snippets/{DEFAULT_ID}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn listing_modes_and_field_filter() {
    let state = open_state();
    for name in ["first", "second"] {
        let response = app(&state)
            .oneshot(json_request(
                "POST",
                "/snippets",
                serde_json::json!({"name": name, "code": "package main\n"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Default listing: by id, code omitted.
    let response = app(&state).oneshot(get("/snippets")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listing = body_json(response).await;
    let items = listing.as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["id"].as_i64().unwrap(), DEFAULT_ID);
    assert!(items.iter().all(|s| s.get("code").is_none()));

    // allFields keeps the code.
    let response = app(&state)
        .oneshot(get("/snippets?allFields=true&limit=-1"))
        .await
        .unwrap();
    let listing = body_json(response).await;
    assert!(listing.as_array().unwrap().iter().all(|s| s.get("code").is_some()));

    // Cursor by id.
    let query = serde_json::json!({"id": DEFAULT_ID}).to_string();
    let response = app(&state)
        .oneshot(get(&format!(
            "/snippets?query={}",
            urlencode(&query)
        )))
        .await
        .unwrap();
    let listing = body_json(response).await;
    let ids: Vec<i64> = listing
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![DEFAULT_ID + 1, DEFAULT_ID + 2]);

    // Name relevance.
    let query = serde_json::json!({"name": "second"}).to_string();
    let response = app(&state)
        .oneshot(get(&format!(
            "/snippets?queryBy=name&query={}",
            urlencode(&query)
        )))
        .await
        .unwrap();
    let listing = body_json(response).await;
    let items = listing.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "second");

    // Modified ordering puts the newest first and the epoch-stamped
    // default snippet last.
    let response = app(&state)
        .oneshot(get("/snippets?queryBy=modified"))
        .await
        .unwrap();
    let listing = body_json(response).await;
    let ids: Vec<i64> = listing
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_i64().unwrap())
        .collect();
    assert_eq!(*ids.last().unwrap(), DEFAULT_ID);
}

#[tokio::test]
async fn listing_rejects_bad_parameters() {
    let state = open_state();

    let response = app(&state)
        .oneshot(get("/snippets?queryBy=owner"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app(&state)
        .oneshot(get("/snippets?bogus=1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app(&state)
        .oneshot(get("/snippets?query=notjson"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dynamic_serves_blobs_with_mime() {
    let state = open_state();
    let id = state.blobs.insert(Blob {
        data: b"<svg/>".to_vec(),
        mime: "image/svg+xml".to_string(),
    });

    let response = app(&state)
        .oneshot(get(&format!("/dynamic/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(CONTENT_TYPE).unwrap(),
        "image/svg+xml"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"<svg/>");

    let response = app(&state)
        .oneshot(get("/dynamic/0000missing"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn login_gates_protected_routes() {
    let store = Arc::new(SnippetStore::in_memory().unwrap());
    let state = Arc::new(AppState::new(
        store,
        Arc::new(BlobStore::new()),
        Toolchain::new("go", "gofmt"),
        password_keys(),
    ));

    // No cookie: rejected.
    let response = app(&state).oneshot(get("/snippets")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Wrong password: rejected.
    let response = app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .body(Body::from("nope"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Right password: cookie issued.
    let response = app(&state)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/login")
                .body(Body::from(PASSWORD))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let token = cookie.split(';').next().unwrap().to_string();

    // Cookie unlocks the API.
    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/snippets")
                .header(COOKIE, token)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // A forged cookie does not.
    let response = app(&state)
        .oneshot(
            Request::builder()
                .uri("/snippets")
                .header(COOKIE, "auth=00ff00ff")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn default_snippet_is_present() {
    let state = open_state();
    let response = app(&state)
        .oneshot(get(&format!("/snippets/{DEFAULT_ID}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let snippet = body_json(response).await;
    assert_eq!(snippet["name"], DEFAULT_NAME);
    assert!(snippet["code"].as_str().unwrap().contains("package main"));
}

/// Percent-encode a query value (just enough for the JSON cursors used
/// here).
fn urlencode(raw: &str) -> String {
    let mut out = String::new();
    for b in raw.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
