//! Axum route handlers for the ChatOps RPC endpoint.

use crate::{
    dispatch::{self, Inbound, TestingAuth},
    envelope::Reply,
    state::AppState,
};
use axum::{
    body::Bytes,
    extract::{OriginalUri, Path, State},
    http::HeaderMap,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

/// Build the router. Paths are signed as received, so mount it where the
/// signing clients expect to find it.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/_chatops", get(list_chatops).post(execute_from_body))
        .route("/_chatops/:chatop", post(execute_chatop))
        .with_state(state)
}

// ── Health ────────────────────────────────────────────────────────────────────

/// `GET /health`: Health check
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "chatops-rpc",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── List ──────────────────────────────────────────────────────────────────────

/// `GET /_chatops`: Discovery payload with namespace, help and every command.
pub async fn list_chatops(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    testing: Option<Extension<TestingAuth>>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    let inbound = Inbound {
        name: Some(crate::registry::LIST),
        path: uri.path(),
        headers: &headers,
        body: &body,
        testing: testing.is_some(),
    };
    dispatch::dispatch(&state, inbound, chrono::Utc::now()).await
}

// ── Execute ───────────────────────────────────────────────────────────────────

/// `POST /_chatops/:chatop`: Run the named command.
///
/// Body: `{ "id": ..., "user": "...", "room_id": "...", "params": { ... } }`
pub async fn execute_chatop(
    State(state): State<Arc<AppState>>,
    Path(chatop): Path<String>,
    OriginalUri(uri): OriginalUri,
    testing: Option<Extension<TestingAuth>>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    let inbound = Inbound {
        name: Some(chatop.as_str()),
        path: uri.path(),
        headers: &headers,
        body: &body,
        testing: testing.is_some(),
    };
    dispatch::dispatch(&state, inbound, chrono::Utc::now()).await
}

/// `POST /_chatops`: Run the command named by the body's `method` field.
pub async fn execute_from_body(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    testing: Option<Extension<TestingAuth>>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    let inbound = Inbound {
        name: None,
        path: uri.path(),
        headers: &headers,
        body: &body,
        testing: testing.is_some(),
    };
    dispatch::dispatch(&state, inbound, chrono::Utc::now()).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────
