//! `POST /stream` — the chat turn endpoint.
//!
//! DESIGN
//! ======
//! Validation and quota run before the stream starts so the client gets
//! proper 4xx statuses; once the SSE response begins, all outcomes travel
//! as typed events (`chunk`/`tool_result`/`end`/`error`). The orchestration
//! task owns the sender half of the frame channel; dropping the response
//! body tears the channel down and cancels the turn.

use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;

use super::client_ip::ClientIp;
use crate::rate_limit::{RateLimitError, RateLimitStatus};
use crate::services::chat;
use crate::state::AppState;

/// Frames buffered between the orchestrator and the SSE body.
const FRAME_BUFFER: usize = 32;

#[derive(Deserialize)]
pub struct StreamRequest {
    prompt: String,
    session_id: Option<String>,
}

fn apply_rate_limit_headers(response: &mut Response, status: &RateLimitStatus) {
    let headers = response.headers_mut();
    for (name, value) in [
        ("x-ratelimit-limit", status.limit.to_string()),
        ("x-ratelimit-remaining", status.remaining.to_string()),
        ("x-ratelimit-reset", status.reset.to_string()),
    ] {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name, value);
        }
    }
}

/// `POST /stream` — run one chat turn, streamed as SSE.
pub async fn stream(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<StreamRequest>,
) -> Response {
    // Input validation happens before the quota charge: a rejected prompt
    // must not consume the caller's daily budget.
    if body.prompt.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_prompt", "message": "Prompt cannot be empty" })),
        )
            .into_response();
    }

    let Some(llm) = state.llm.clone() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "llm_unavailable", "message": "LLM is not configured" })),
        )
            .into_response();
    };

    let status = match state.rate_limiter.check_and_record(&ip).await {
        Ok(status) => status,
        Err(RateLimitError::Exceeded { limit, window_secs, reset }) => {
            let message = format!("rate limit exceeded (max {limit} requests/{window_secs}s)");
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({ "error": "rate_limited", "message": message })),
            )
                .into_response();
            apply_rate_limit_headers(&mut response, &RateLimitStatus { limit, remaining: 0, reset });
            return response;
        }
    };

    let (tx, rx) = mpsc::channel(FRAME_BUFFER);
    tokio::spawn(chat::stream_prompt(state, llm, body.prompt, body.session_id, tx));

    let events = futures::stream::unfold(rx, |mut rx| async move {
        let frame = rx.recv().await?;
        let event = Event::default().data(frame.to_json().to_string());
        Some((Ok::<_, Infallible>(event), rx))
    });

    let mut response = Sse::new(events).keep_alive(KeepAlive::default()).into_response();
    apply_rate_limit_headers(&mut response, &status);
    // Defeat proxy buffering so tokens reach the browser as they arrive.
    response
        .headers_mut()
        .insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}
