//! Shared key-value store behind a narrow trait.
//!
//! DESIGN
//! ======
//! Quota counters and session records live in an external store with
//! atomic increment and TTL expiry. The trait covers exactly the operations
//! the service needs; handlers and services only ever see `dyn KvStore`.
//! Production uses Redis; tests use the in-memory implementation with an
//! adjustable clock.

pub mod redis;

#[cfg(test)]
pub mod memory;

pub use self::redis::RedisStore;

use crate::error::ErrorCode;

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached (connect failure, timeout).
    #[error("store connection failed: {0}")]
    Connection(String),

    /// A command was rejected or returned an unexpected shape.
    #[error("store command failed: {0}")]
    Command(String),
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Connection(_) => "E_STORE_CONNECTION",
            Self::Command(_) => "E_STORE_COMMAND",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// Narrow async key-value interface shared by quota and session storage.
#[async_trait::async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a value; `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a value with an expiry in seconds.
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError>;

    /// Atomically increment a counter, setting the expiry only when the
    /// counter is created. Returns the post-increment count.
    ///
    /// The expiry must NOT move on subsequent increments — quota windows
    /// are fixed at first request.
    async fn incr_expire(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError>;

    /// Remaining time-to-live in seconds; `None` when the key is absent or
    /// carries no expiry.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Delete a key. Returns `true` when something was removed.
    async fn del(&self, key: &str) -> Result<bool, StoreError>;

    /// List keys matching a glob pattern (only trailing-`*` prefixes are
    /// used by this service, e.g. `session:*`).
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Liveness probe for the health endpoint.
    async fn ping(&self) -> bool;
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
