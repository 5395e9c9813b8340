use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt;

use super::*;
use crate::llm::types::{LlmChat, LlmError, Message, STOP_END_TURN, STOP_TOOL_USE, StreamEvent, Tool};
use crate::state::test_helpers;
use crate::store::memory::DownStore;

// =========================================================================
// Helpers
// =========================================================================

struct ScriptedLlm {
    scripts: std::sync::Mutex<Vec<Vec<StreamEvent>>>,
}

impl ScriptedLlm {
    fn new(scripts: Vec<Vec<StreamEvent>>) -> Self {
        Self { scripts: std::sync::Mutex::new(scripts) }
    }

    fn text_reply(text: &str) -> Arc<Self> {
        Arc::new(Self::new(vec![vec![
            StreamEvent::TextDelta(text.to_string()),
            StreamEvent::Done { stop_reason: STOP_END_TURN.into() },
        ]]))
    }
}

#[async_trait::async_trait]
impl LlmChat for ScriptedLlm {
    async fn chat_stream(
        &self,
        _max_tokens: u32,
        _system: &str,
        _messages: &[Message],
        _tools: Option<&[Tool]>,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        let script = {
            let mut scripts = self.scripts.lock().unwrap();
            if scripts.is_empty() {
                vec![
                    StreamEvent::TextDelta("ok".into()),
                    StreamEvent::Done { stop_reason: STOP_END_TURN.into() },
                ]
            } else {
                scripts.remove(0)
            }
        };
        for event in script {
            let _ = tx.send(event).await;
        }
        Ok(())
    }
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

async fn post_stream(app: Router, ip: &str, body: Value) -> axum::http::Response<Body> {
    app.oneshot(
        Request::builder()
            .method("POST")
            .uri("/stream")
            .header("content-type", "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// Decode an SSE body into its JSON event payloads.
async fn sse_events(response: axum::http::Response<Body>) -> Vec<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    text.lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|data| serde_json::from_str(data).unwrap())
        .collect()
}

// =========================================================================
// GET / and /health
// =========================================================================

#[tokio::test]
async fn root_reports_running() {
    let app = app(test_helpers::test_app_state());
    let (status, body) = get_json(app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert_eq!(body["message"], SERVICE_NAME);
}

#[tokio::test]
async fn health_reports_store_up() {
    let app = app(test_helpers::test_app_state());
    let (status, body) = get_json(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["redis"], "up");
}

#[tokio::test]
async fn health_reports_store_down() {
    let app = app(test_helpers::test_app_state_with_store(Arc::new(DownStore)));
    let (status, body) = get_json(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["redis"], "down");
}

// =========================================================================
// GET /rate-limit-info
// =========================================================================

#[tokio::test]
async fn rate_limit_info_reflects_usage() {
    let state = test_helpers::test_app_state_with_llm(ScriptedLlm::text_reply("hi"));
    let app = app(state);

    let (status, body) = get_json(app.clone(), "/rate-limit-info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["limit"], 10);
    assert_eq!(body["remaining"], 10);
    assert!(body["reset"].as_i64().unwrap() > 0);

    let response = post_stream(app.clone(), "unknown", json!({ "prompt": "hi" })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let _ = sse_events(response).await;

    let (_, body) = get_json(app, "/rate-limit-info").await;
    assert_eq!(body["remaining"], 9);
}

// =========================================================================
// POST /stream
// =========================================================================

#[tokio::test]
async fn stream_emits_chunks_then_end() {
    let state = test_helpers::test_app_state_with_llm(ScriptedLlm::text_reply("Hello!"));
    let app = app(state);

    let response = post_stream(app, "203.0.113.5", json!({ "prompt": "hi" })).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap().to_str().unwrap(),
        "text/event-stream"
    );
    assert_eq!(response.headers().get("x-ratelimit-limit").unwrap(), "10");
    assert_eq!(response.headers().get("x-ratelimit-remaining").unwrap(), "9");

    let events = sse_events(response).await;
    assert_eq!(events[0]["type"], "chunk");
    assert_eq!(events[0]["content"], "Hello!");
    assert_eq!(events.last().unwrap()["type"], "end");
    assert!(events[0]["timestamp"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn stream_tool_result_precedes_end() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        vec![
            StreamEvent::ToolUse {
                id: "call_1".into(),
                name: "calculate".into(),
                input: json!({ "expression": "2+2*3" }),
            },
            StreamEvent::Done { stop_reason: STOP_TOOL_USE.into() },
        ],
        vec![
            StreamEvent::TextDelta("It is 8.".into()),
            StreamEvent::Done { stop_reason: STOP_END_TURN.into() },
        ],
    ]));
    let app = app(test_helpers::test_app_state_with_llm(llm));

    let response = post_stream(app, "203.0.113.5", json!({ "prompt": "calculate 2+2*3" })).await;
    let events = sse_events(response).await;

    let tool_pos = events.iter().position(|e| e["type"] == "tool_result").unwrap();
    let end_pos = events.iter().position(|e| e["type"] == "end").unwrap();
    assert!(tool_pos < end_pos);
    assert_eq!(events[tool_pos]["tool_name"], "calculate");
    assert_eq!(events[tool_pos]["result"], "8");
}

#[tokio::test]
async fn stream_rejects_empty_prompt_without_charging_quota() {
    let state = test_helpers::test_app_state_with_llm(ScriptedLlm::text_reply("hi"));
    let app = app(state);

    let response = post_stream(app.clone(), "203.0.113.5", json!({ "prompt": "   " })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/rate-limit-info")
                .header("x-forwarded-for", "203.0.113.5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["remaining"], 10, "rejected prompt must not consume quota");
}

#[tokio::test]
async fn stream_enforces_daily_quota_per_ip() {
    let state = test_helpers::test_app_state_with_llm(Arc::new(ScriptedLlm::new(vec![])));
    let app = app(state);

    for i in 0..10 {
        let response = post_stream(app.clone(), "198.51.100.1", json!({ "prompt": "hi" })).await;
        assert_eq!(response.status(), StatusCode::OK, "request {i} should pass");
        let _ = sse_events(response).await;
    }

    let response = post_stream(app.clone(), "198.51.100.1", json!({ "prompt": "hi" })).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get("x-ratelimit-remaining").unwrap(), "0");
    assert!(response.headers().get("x-ratelimit-reset").is_some());

    // Another IP is unaffected.
    let response = post_stream(app, "198.51.100.2", json!({ "prompt": "hi" })).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn stream_without_llm_is_unavailable() {
    let app = app(test_helpers::test_app_state());
    let response = post_stream(app, "203.0.113.5", json!({ "prompt": "hi" })).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn stream_surfaces_upstream_failure_as_error_event() {
    let llm = Arc::new(ScriptedLlm::new(vec![vec![StreamEvent::Error("model offline".into())]]));
    let app = app(test_helpers::test_app_state_with_llm(llm));

    let response = post_stream(app, "203.0.113.5", json!({ "prompt": "hi" })).await;
    assert_eq!(response.status(), StatusCode::OK, "failure arrives in-stream");

    let events = sse_events(response).await;
    assert_eq!(events.last().unwrap()["type"], "error");
    assert_eq!(events.last().unwrap()["error"], "model offline");
    assert!(!events.iter().any(|e| e["type"] == "end"));
}
