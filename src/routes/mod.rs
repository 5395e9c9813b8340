//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the full HTTP surface: the streamed chat turn, health
//! and quota introspection, session CRUD, and tool discovery/testing.
//! CORS is permissive — the portfolio frontend is served from another
//! origin and talks to this API directly from the browser.

pub mod chat;
pub mod client_ip;
pub mod sessions;
pub mod tools;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::{get, post};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use client_ip::ClientIp;

use crate::state::AppState;

pub const SERVICE_NAME: &str = "foliochat";

/// Build the application router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/stream", post(chat::stream))
        .route("/health", get(health))
        .route("/rate-limit-info", get(rate_limit_info))
        .route("/session", post(sessions::create_session))
        .route(
            "/session/{id}",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/sessions", get(sessions::list_sessions))
        .route("/tools", get(tools::list_tools))
        .route("/tools/test", post(tools::test_tool))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// `GET /` — liveness/info.
async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": SERVICE_NAME, "status": "running" }))
}

/// `GET /health` — service health including store reachability.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let redis = if state.store.ping().await { "up" } else { "down" };
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "redis": redis,
    }))
}

/// `GET /rate-limit-info` — quota snapshot for the caller's IP.
async fn rate_limit_info(State(state): State<AppState>, ClientIp(ip): ClientIp) -> Json<serde_json::Value> {
    let status = state.rate_limiter.status(&ip).await;
    Json(json!({
        "ip": ip,
        "limit": status.limit,
        "remaining": status.remaining,
        "reset": status.reset,
    }))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
