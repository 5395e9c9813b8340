//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the shared store handle, the optional LLM client, an HTTP
//! client for outbound tool calls, and the typed config. Clone is required
//! by Axum — all inner fields are Arc-wrapped or Clone.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::llm::LlmChat;
use crate::rate_limit::RateLimiter;
use crate::store::KvStore;

#[derive(Clone)]
pub struct AppState {
    /// Shared key-value store (quota counters, sessions, reminders).
    pub store: Arc<dyn KvStore>,
    /// Optional LLM client. `None` if LLM env vars are not configured;
    /// `/stream` reports unavailable but the rest of the API serves.
    pub llm: Option<Arc<dyn LlmChat>>,
    /// Outbound HTTP client for tools (weather, web search).
    pub http: reqwest::Client,
    /// Per-IP quota enforcement over `store`.
    pub rate_limiter: RateLimiter,
    pub config: AppConfig,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, llm: Option<Arc<dyn LlmChat>>, config: AppConfig) -> Self {
        let rate_limiter = RateLimiter::new(store.clone(), config.rate_limit);
        Self { store, llm, http: reqwest::Client::new(), rate_limiter, config }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use crate::store::memory::MemoryStore;

    /// `AppState` over a fresh in-memory store, no LLM.
    #[must_use]
    pub fn test_app_state() -> AppState {
        AppState::new(Arc::new(MemoryStore::new()), None, AppConfig::defaults())
    }

    /// `AppState` over the given store (e.g. a shared or failing one).
    #[must_use]
    pub fn test_app_state_with_store(store: Arc<dyn KvStore>) -> AppState {
        AppState::new(store, None, AppConfig::defaults())
    }

    /// `AppState` with a mock LLM over a fresh in-memory store.
    #[must_use]
    pub fn test_app_state_with_llm(llm: Arc<dyn LlmChat>) -> AppState {
        AppState::new(Arc::new(MemoryStore::new()), Some(llm), AppConfig::defaults())
    }
}
