//! LLM — multi-provider adapter for the chat backend.
//!
//! DESIGN
//! ======
//! The `LlmClient` enum dispatches to OpenAI or Anthropic based on
//! `LLM_PROVIDER`. Both providers stream; the rest of the service only
//! sees the [`LlmChat`] trait and its [`types::StreamEvent`] channel.

pub mod anthropic;
pub mod config;
pub mod openai;
pub mod sse;
pub mod tools;
pub mod types;

use tokio::sync::mpsc;

use config::{LlmConfig, LlmProviderKind};
pub use types::LlmChat;
use types::{LlmError, Message, StreamEvent, Tool};

// =============================================================================
// CLIENT DISPATCH
// =============================================================================

/// Concrete LLM client that dispatches to either OpenAI or Anthropic.
///
/// Configured from environment variables by [`LlmClient::from_env`].
pub struct LlmClient {
    inner: LlmProvider,
    model: String,
}

enum LlmProvider {
    OpenAi(openai::OpenAiClient),
    Anthropic(anthropic::AnthropicClient),
}

impl LlmClient {
    /// Build an LLM client from environment variables.
    ///
    /// - `LLM_PROVIDER`: "openai" (default) or "anthropic"
    /// - `LLM_API_KEY_ENV`: name of env var holding the API key
    /// - `LLM_MODEL`: model name (e.g. "gpt-4o-mini")
    /// - `LLM_OPENAI_BASE_URL`: custom base URL for OpenAI-compatible APIs
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the HTTP client fails.
    pub fn from_env() -> Result<Self, LlmError> {
        let config = LlmConfig::from_env()?;
        Self::from_config(config)
    }

    /// Build an LLM client from a parsed typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider HTTP client fails to build.
    pub fn from_config(config: LlmConfig) -> Result<Self, LlmError> {
        let model = config.model.clone();
        let inner = match config.provider {
            LlmProviderKind::OpenAi => LlmProvider::OpenAi(openai::OpenAiClient::new(
                config.api_key,
                config.openai_base_url,
                config.timeouts,
            )?),
            LlmProviderKind::Anthropic => {
                LlmProvider::Anthropic(anthropic::AnthropicClient::new(config.api_key, config.timeouts)?)
            }
        };
        Ok(Self { inner, model })
    }

    /// Return the configured model name.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl LlmChat for LlmClient {
    async fn chat_stream(
        &self,
        max_tokens: u32,
        system: &str,
        messages: &[Message],
        tools: Option<&[Tool]>,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), LlmError> {
        match &self.inner {
            LlmProvider::OpenAi(c) => {
                c.chat_stream(&self.model, max_tokens, system, messages, tools, tx)
                    .await
            }
            LlmProvider::Anthropic(c) => {
                c.chat_stream(&self.model, max_tokens, system, messages, tools, tx)
                    .await
            }
        }
    }
}
