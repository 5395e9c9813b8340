//! OpenAI-compatible API client (`/v1/chat/completions`, streaming).
//!
//! Wire types are private to this module. Tool-call arguments arrive as
//! JSON string fragments keyed by call index; [`OpenAiStreamParser`]
//! accumulates them and emits whole [`StreamEvent::ToolUse`] events at
//! end of stream. Parsing is pure for testability.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use super::config::LlmTimeouts;
use super::sse::{self, SseParseAction, SseParser, emit_or_continue};
use super::types::{
    Content, ContentBlock, LlmError, Message, STOP_END_TURN, STOP_MAX_TOKENS, STOP_TOOL_USE, StreamEvent, Tool,
};

// =============================================================================
// CLIENT
// =============================================================================

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, base_url: String, timeouts: LlmTimeouts) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key, base_url: base_url.trim_end_matches('/').to_string() })
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
        let msgs = build_messages(system, messages);
        let tool_defs: Option<Vec<ToolDef<'_>>> = tools.map(|t| t.iter().map(ToolDef::from).collect());
        let body = Request { model, max_tokens, stream: true, messages: &msgs, tools: tool_defs.as_deref() };

        let url = format!("{}/chat/completions", self.base_url);
        let response = match self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
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

        let mut parser = OpenAiStreamParser::default();
        sse::process_stream(response, &mut parser, &tx).await
    }
}

// =============================================================================
// WIRE TYPES — request
// =============================================================================

#[derive(Serialize)]
struct Request<'a> {
    model: &'a str,
    max_tokens: u32,
    stream: bool,
    messages: &'a [WireMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDef<'a>]>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: WireFunctionCall,
}

#[derive(Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct ToolDef<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: FunctionDef<'a>,
}

#[derive(Serialize)]
struct FunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a Tool> for ToolDef<'a> {
    fn from(tool: &'a Tool) -> Self {
        Self {
            tool_type: "function",
            function: FunctionDef {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.input_schema,
            },
        }
    }
}

/// Flatten provider-neutral messages into the chat-completions shape:
/// tool uses become `tool_calls` on assistant messages, tool results
/// become `role: "tool"` messages correlated by `tool_call_id`.
fn build_messages(system: &str, messages: &[Message]) -> Vec<WireMessage> {
    let mut out = Vec::new();
    if !system.trim().is_empty() {
        out.push(WireMessage {
            role: "system".to_string(),
            content: Some(system.to_string()),
            tool_calls: None,
            tool_call_id: None,
        });
    }
    for message in messages {
        match &message.content {
            Content::Text(text) => {
                out.push(WireMessage {
                    role: message.role.clone(),
                    content: Some(text.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
            Content::Blocks(blocks) => {
                let mut text = String::new();
                let mut tool_calls = Vec::new();
                let mut tool_results = Vec::new();
                for block in blocks {
                    match block {
                        ContentBlock::Text { text: t } => text.push_str(t),
                        ContentBlock::ToolUse { id, name, input } => {
                            tool_calls.push(WireToolCall {
                                id: id.clone(),
                                call_type: "function",
                                function: WireFunctionCall {
                                    name: name.clone(),
                                    arguments: serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()),
                                },
                            });
                        }
                        ContentBlock::ToolResult { tool_use_id, content, is_error: _ } => {
                            tool_results.push(WireMessage {
                                role: "tool".to_string(),
                                content: Some(content.clone()),
                                tool_calls: None,
                                tool_call_id: Some(tool_use_id.clone()),
                            });
                        }
                        ContentBlock::Unknown => {}
                    }
                }
                if !text.is_empty() || !tool_calls.is_empty() {
                    out.push(WireMessage {
                        role: message.role.clone(),
                        content: if text.is_empty() { None } else { Some(text) },
                        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                        tool_call_id: None,
                    });
                }
                out.extend(tool_results);
            }
        }
    }
    out
}

// =============================================================================
// STREAM PARSING
// =============================================================================

#[derive(Default)]
struct PendingCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Accumulates chat-completion chunk deltas into whole events.
#[derive(Default)]
struct OpenAiStreamParser {
    /// Tool calls under assembly, keyed by wire index.
    calls: BTreeMap<u64, PendingCall>,
    finish_reason: Option<String>,
}

impl SseParser for OpenAiStreamParser {
    fn parse(&mut self, json: &Value) -> SseParseAction {
        // Mid-stream error envelope.
        if let Some(error) = json.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown stream error");
            return SseParseAction::Error(message.to_string());
        }

        let Some(choice) = json
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
        else {
            return SseParseAction::Continue;
        };

        if let Some(reason) = choice.get("finish_reason").and_then(Value::as_str) {
            self.finish_reason = Some(reason.to_string());
        }

        let mut events = Vec::new();
        if let Some(delta) = choice.get("delta") {
            if let Some(text) = delta.get("content").and_then(Value::as_str) {
                if !text.is_empty() {
                    events.push(StreamEvent::TextDelta(text.to_string()));
                }
            }

            if let Some(tool_calls) = delta.get("tool_calls").and_then(Value::as_array) {
                for call in tool_calls {
                    let index = call.get("index").and_then(Value::as_u64).unwrap_or(0);
                    let pending = self.calls.entry(index).or_default();
                    if let Some(id) = call.get("id").and_then(Value::as_str) {
                        pending.id = Some(id.to_string());
                    }
                    if let Some(function) = call.get("function") {
                        if let Some(name) = function.get("name").and_then(Value::as_str) {
                            pending.name = Some(name.to_string());
                        }
                        if let Some(args) = function.get("arguments").and_then(Value::as_str) {
                            pending.arguments.push_str(args);
                        }
                    }
                }
            }
        }

        emit_or_continue(events)
    }

    fn finish(&mut self) -> Vec<StreamEvent> {
        let calls = std::mem::take(&mut self.calls);
        let mut events = Vec::new();

        for (index, call) in calls {
            let Some(name) = call.name else { continue };
            let id = call.id.unwrap_or_else(|| format!("call_{index}"));
            let input =
                serde_json::from_str::<Value>(&call.arguments).unwrap_or_else(|_| Value::Object(serde_json::Map::default()));
            events.push(StreamEvent::ToolUse { id, name, input });
        }

        let had_tool_use = events
            .iter()
            .any(|e| matches!(e, StreamEvent::ToolUse { .. }));
        let stop_reason = match self.finish_reason.as_deref() {
            _ if had_tool_use => STOP_TOOL_USE,
            Some("tool_calls") => STOP_TOOL_USE,
            Some("length") => STOP_MAX_TOKENS,
            _ => STOP_END_TURN,
        };
        events.push(StreamEvent::Done { stop_reason: stop_reason.to_string() });
        events
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

// =============================================================================
// TESTS
// =============================================================================
