//! LLM types — provider-neutral message types and errors.
//!
//! Shared by the Anthropic and `OpenAI` clients. The streaming contract is
//! a channel of [`StreamEvent`]s so the chat layer can forward tokens the
//! moment they arrive.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by LLM client operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    ConfigParse(String),

    /// The required API key environment variable is not set.
    #[error("missing API key: env var {var} not set")]
    MissingApiKey { var: String },

    /// The HTTP request to the LLM provider failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// The LLM provider returned a non-success HTTP status.
    #[error("API response error: status {status}")]
    ApiResponse { status: u16, body: String },

    /// The LLM provider stream carried a malformed payload.
    #[error("API stream parse failed: {0}")]
    StreamParse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl crate::error::ErrorCode for LlmError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigParse(_) => "E_CONFIG_PARSE",
            Self::MissingApiKey { .. } => "E_MISSING_API_KEY",
            Self::ApiRequest(_) => "E_API_REQUEST",
            Self::ApiResponse { .. } => "E_API_RESPONSE",
            Self::StreamParse(_) => "E_STREAM_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::ApiRequest(_) | Self::ApiResponse { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// CONTENT BLOCKS
// =============================================================================

/// A structured content block in a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    /// A plain text segment.
    #[serde(rename = "text")]
    Text { text: String },

    /// A tool invocation emitted by the model.
    #[serde(rename = "tool_use")]
    ToolUse {
        /// Provider-assigned tool call identifier.
        id: String,
        /// Name of the tool being called.
        name: String,
        /// JSON arguments for the tool.
        input: serde_json::Value,
    },

    /// The output returned from a tool call back to the model.
    #[serde(rename = "tool_result")]
    ToolResult {
        /// Matches the `id` of the originating [`ContentBlock::ToolUse`].
        tool_use_id: String,
        /// Serialized tool output.
        content: String,
        /// `true` when the tool call produced an error.
        #[serde(skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },

    /// Any unrecognized block type — ignored by downstream logic.
    #[serde(other)]
    Unknown,
}

/// Message content — either plain text or structured blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// A simple string payload.
    Text(String),
    /// A sequence of typed content blocks (text, tool use, tool result).
    Blocks(Vec<ContentBlock>),
}

// =============================================================================
// TOOL DEFINITION
// =============================================================================

/// A tool definition passed to the LLM provider API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

// =============================================================================
// MESSAGE TYPES
// =============================================================================

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: Content,
}

impl Message {
    /// Convenience constructor for a plain-text message.
    #[must_use]
    pub fn text(role: &str, content: impl Into<String>) -> Self {
        Self { role: role.to_string(), content: Content::Text(content.into()) }
    }
}

// =============================================================================
// STREAM EVENTS
// =============================================================================

/// Incremental events pushed by a streaming chat call.
///
/// Tool-call arguments arrive from the wire as JSON fragments; providers
/// assemble them and emit one complete [`StreamEvent::ToolUse`] per call.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A text token (or token group) from the model.
    TextDelta(String),

    /// A fully assembled tool invocation request.
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// The model finished this turn. `stop_reason` is provider-neutral:
    /// `end_turn`, `tool_use`, or `max_tokens`.
    Done { stop_reason: String },

    /// The stream failed; no further events follow.
    Error(String),
}

impl StreamEvent {
    /// Terminal events end the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error(_))
    }
}

pub const STOP_END_TURN: &str = "end_turn";
pub const STOP_TOOL_USE: &str = "tool_use";
pub const STOP_MAX_TOKENS: &str = "max_tokens";

// =============================================================================
// LLM CHAT TRAIT
// =============================================================================

/// Provider-neutral async trait for streaming LLM chat. Enables mocking in
/// tests.
#[async_trait::async_trait]
pub trait LlmChat: Send + Sync {
    /// Send a chat request with streaming enabled, pushing [`StreamEvent`]s
    /// on `tx` as they arrive. Resolves once the stream ends (terminal
    /// event sent or receiver dropped).
    ///
    /// # Errors
    ///
    /// Returns an [`LlmError`] when the request cannot be issued or the
    /// stream fails; a matching [`StreamEvent::Error`] is pushed first so
    /// channel consumers never hang.
    async fn chat_stream(
        &self,
        max_tokens: u32,
        system: &str,
        messages: &[Message],
        tools: Option<&[Tool]>,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError>;
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
