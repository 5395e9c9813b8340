//! Anthropic Messages API client (`/v1/messages`, streaming).
//!
//! Thin HTTP wrapper; the provider-neutral [`Message`] types serialize
//! directly onto the Anthropic wire. Stream events follow the
//! content-block model: `content_block_start` opens a text or tool_use
//! block, deltas carry text or partial JSON, `content_block_stop` closes
//! it, `message_delta` carries the stop reason.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use super::config::LlmTimeouts;
use super::sse::{self, SseParseAction, SseParser, emit_or_continue};
use super::types::{LlmError, Message, STOP_END_TURN, STOP_MAX_TOKENS, STOP_TOOL_USE, StreamEvent, Tool};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

// =============================================================================
// CLIENT
// =============================================================================

pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
}

impl AnthropicClient {
    pub fn new(api_key: String, timeouts: LlmTimeouts) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key })
    }

    pub async fn chat_stream(
        &self,
        model: &str,
        max_tokens: u32,
        system: &str,
        messages: &[Message],
        tools: Option<&[Tool]>,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        let body = ApiRequest { model, max_tokens, stream: true, system, messages, tools };

        let response = match self
            .http
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let err = LlmError::ApiRequest(e.to_string());
                let _ = tx.send(StreamEvent::Error(err.to_string())).await;
                return Err(err);
            }
        };

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            let err = LlmError::ApiResponse { status, body };
            let _ = tx.send(StreamEvent::Error(err.to_string())).await;
            return Err(err);
        }

        let mut parser = AnthropicStreamParser::default();
        sse::process_stream(response, &mut parser, &tx).await
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(serde::Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    stream: bool,
    system: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [Tool]>,
}

// =============================================================================
// STREAM PARSING
// =============================================================================

struct PendingToolUse {
    id: String,
    name: String,
    partial_json: String,
}

#[derive(Default)]
struct AnthropicStreamParser {
    /// tool_use block currently open, if any.
    pending: Option<PendingToolUse>,
    stop_reason: Option<String>,
}

fn map_stop_reason(raw: Option<&str>) -> &'static str {
    match raw {
        Some("tool_use") => STOP_TOOL_USE,
        Some("max_tokens") => STOP_MAX_TOKENS,
        _ => STOP_END_TURN,
    }
}

impl AnthropicStreamParser {
    fn close_pending(&mut self) -> Option<StreamEvent> {
        let pending = self.pending.take()?;
        let input = if pending.partial_json.trim().is_empty() {
            Value::Object(serde_json::Map::default())
        } else {
            serde_json::from_str(&pending.partial_json)
                .unwrap_or_else(|_| Value::Object(serde_json::Map::default()))
        };
        Some(StreamEvent::ToolUse { id: pending.id, name: pending.name, input })
    }
}

impl SseParser for AnthropicStreamParser {
    fn parse(&mut self, json: &Value) -> SseParseAction {
        let event_type = json.get("type").and_then(Value::as_str).unwrap_or("");

        match event_type {
            "content_block_start" => {
                let block = json.get("content_block");
                if block.and_then(|b| b.get("type")).and_then(Value::as_str) == Some("tool_use") {
                    let id = block
                        .and_then(|b| b.get("id"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    let name = block
                        .and_then(|b| b.get("name"))
                        .and_then(Value::as_str)
                        .unwrap_or_default();
                    if id.is_empty() || name.is_empty() {
                        return SseParseAction::Error("tool_use block missing id or name".to_string());
                    }
                    self.pending =
                        Some(PendingToolUse { id: id.to_string(), name: name.to_string(), partial_json: String::new() });
                }
                SseParseAction::Continue
            }

            "content_block_delta" => {
                let delta = json.get("delta");
                let delta_type = delta
                    .and_then(|d| d.get("type"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                match delta_type {
                    "text_delta" => {
                        let text = delta
                            .and_then(|d| d.get("text"))
                            .and_then(Value::as_str)
                            .unwrap_or("");
                        if text.is_empty() {
                            SseParseAction::Continue
                        } else {
                            SseParseAction::Emit(vec![StreamEvent::TextDelta(text.to_string())])
                        }
                    }
                    "input_json_delta" => {
                        if let Some(pending) = self.pending.as_mut() {
                            if let Some(fragment) = delta
                                .and_then(|d| d.get("partial_json"))
                                .and_then(Value::as_str)
                            {
                                pending.partial_json.push_str(fragment);
                            }
                        }
                        SseParseAction::Continue
                    }
                    _ => SseParseAction::Continue,
                }
            }

            "content_block_stop" => emit_or_continue(self.close_pending().into_iter().collect()),

            "message_delta" => {
                if let Some(reason) = json
                    .get("delta")
                    .and_then(|d| d.get("stop_reason"))
                    .and_then(Value::as_str)
                {
                    self.stop_reason = Some(reason.to_string());
                }
                SseParseAction::Continue
            }

            "message_stop" => {
                let mut events: Vec<StreamEvent> = self.close_pending().into_iter().collect();
                events.push(StreamEvent::Done {
                    stop_reason: map_stop_reason(self.stop_reason.as_deref()).to_string(),
                });
                SseParseAction::Emit(events)
            }

            "error" => {
                let message = json
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown stream error");
                SseParseAction::Error(message.to_string())
            }

            // ping, message_start, unknown event types.
            _ => SseParseAction::Continue,
        }
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        self.close_pending().into_iter().collect()
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_all(parser: &mut AnthropicStreamParser, chunks: &[Value]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for chunk in chunks {
            if let SseParseAction::Emit(mut batch) = parser.parse(chunk) {
                events.append(&mut batch);
            }
        }
        events
    }

    #[test]
    fn text_deltas_stream_through() {
        let mut parser = AnthropicStreamParser::default();
        let events = parse_all(
            &mut parser,
            &[
                json!({ "type": "message_start", "message": {} }),
                json!({ "type": "content_block_start", "index": 0, "content_block": { "type": "text", "text": "" } }),
                json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "text_delta", "text": "Hi" } }),
                json!({ "type": "content_block_delta", "index": 0, "delta": { "type": "text_delta", "text": "!" } }),
                json!({ "type": "content_block_stop", "index": 0 }),
                json!({ "type": "message_delta", "delta": { "stop_reason": "end_turn" }, "usage": { "output_tokens": 3 } }),
                json!({ "type": "message_stop" }),
            ],
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta("Hi".into()),
                StreamEvent::TextDelta("!".into()),
                StreamEvent::Done { stop_reason: STOP_END_TURN.into() },
            ]
        );
    }

    #[test]
    fn tool_use_block_assembles_from_json_deltas() {
        let mut parser = AnthropicStreamParser::default();
        let events = parse_all(
            &mut parser,
            &[
                json!({ "type": "content_block_start", "index": 0, "content_block": {
                    "type": "tool_use", "id": "toolu_1", "name": "calculate" } }),
                json!({ "type": "content_block_delta", "index": 0, "delta": {
                    "type": "input_json_delta", "partial_json": "{\"expr" } }),
                json!({ "type": "content_block_delta", "index": 0, "delta": {
                    "type": "input_json_delta", "partial_json": "ession\":\"2+2\"}" } }),
                json!({ "type": "content_block_stop", "index": 0 }),
                json!({ "type": "message_delta", "delta": { "stop_reason": "tool_use" }, "usage": {} }),
                json!({ "type": "message_stop" }),
            ],
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            StreamEvent::ToolUse { id, name, input }
                if id == "toolu_1" && name == "calculate" && input["expression"] == "2+2"
        ));
        assert!(matches!(
            &events[1],
            StreamEvent::Done { stop_reason } if stop_reason == STOP_TOOL_USE
        ));
    }

    #[test]
    fn empty_tool_input_becomes_empty_object() {
        let mut parser = AnthropicStreamParser::default();
        let events = parse_all(
            &mut parser,
            &[
                json!({ "type": "content_block_start", "index": 0, "content_block": {
                    "type": "tool_use", "id": "toolu_1", "name": "get_current_time" } }),
                json!({ "type": "content_block_stop", "index": 0 }),
            ],
        );
        assert!(matches!(
            &events[0],
            StreamEvent::ToolUse { input, .. } if input.as_object().is_some_and(serde_json::Map::is_empty)
        ));
    }

    #[test]
    fn tool_use_missing_id_is_an_error() {
        let mut parser = AnthropicStreamParser::default();
        let action = parser.parse(&json!({
            "type": "content_block_start", "index": 0,
            "content_block": { "type": "tool_use", "id": "", "name": "calculate" }
        }));
        assert!(matches!(action, SseParseAction::Error(_)));
    }

    #[test]
    fn max_tokens_stop_reason_maps() {
        let mut parser = AnthropicStreamParser::default();
        let events = parse_all(
            &mut parser,
            &[
                json!({ "type": "message_delta", "delta": { "stop_reason": "max_tokens" }, "usage": {} }),
                json!({ "type": "message_stop" }),
            ],
        );
        assert!(matches!(
            &events[0],
            StreamEvent::Done { stop_reason } if stop_reason == STOP_MAX_TOKENS
        ));
    }

    #[test]
    fn error_event_surfaces_message() {
        let mut parser = AnthropicStreamParser::default();
        let action = parser.parse(&json!({
            "type": "error",
            "error": { "type": "overloaded_error", "message": "Overloaded" }
        }));
        assert!(matches!(action, SseParseAction::Error(msg) if msg == "Overloaded"));
    }

    #[test]
    fn ping_events_are_ignored() {
        let mut parser = AnthropicStreamParser::default();
        assert!(matches!(parser.parse(&json!({ "type": "ping" })), SseParseAction::Continue));
    }
}
