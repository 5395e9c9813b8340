//! Per-IP request quota backed by the shared store.
//!
//! DESIGN
//! ======
//! One counter per caller IP (`ratelimit:{ip}`), incremented atomically
//! with an expiry set only at counter creation — a fixed window, not a
//! sliding one, so the reset instant never moves once the first request
//! of the window lands.
//!
//! TRADE-OFFS
//! ==========
//! If the store is unreachable the limiter fails OPEN: the request is
//! allowed and a warning is logged. A quota outage should degrade to
//! "no quota" rather than take chat down with it.

use std::sync::Arc;

use tracing::warn;

use crate::clock::now_secs;
use crate::config::RateLimitConfig;
use crate::error::ErrorCode;
use crate::store::KvStore;

const KEY_PREFIX: &str = "ratelimit:";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit exceeded (max {limit} requests/{window_secs}s)")]
    Exceeded { limit: u64, window_secs: u64, reset: i64 },
}

impl ErrorCode for RateLimitError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Exceeded { .. } => "E_RATE_LIMITED",
        }
    }

    fn retryable(&self) -> bool {
        true
    }
}

/// Snapshot of a caller's quota, also rendered as `X-RateLimit-*` headers.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RateLimitStatus {
    pub limit: u64,
    pub remaining: u64,
    /// Epoch second at which the window expires.
    pub reset: i64,
}

// =============================================================================
// RATE LIMITER
// =============================================================================

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    fn key(ip: &str) -> String {
        format!("{KEY_PREFIX}{ip}")
    }

    /// Remaining window in epoch seconds; full window when the counter is
    /// new or the store cannot say.
    async fn reset_at(&self, key: &str) -> i64 {
        let ttl = match self.store.ttl(key).await {
            Ok(Some(ttl)) => ttl,
            Ok(None) | Err(_) => self.config.window_secs,
        };
        now_secs() + i64::try_from(ttl).unwrap_or(0)
    }

    /// Count this request against the caller's quota.
    ///
    /// Returns the post-request status on success so handlers can attach
    /// rate-limit headers without a second store round trip.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Exceeded`] when the caller is over quota.
    pub async fn check_and_record(&self, ip: &str) -> Result<RateLimitStatus, RateLimitError> {
        let key = Self::key(ip);
        let limit = self.config.max_requests;

        let count = match self.store.incr_expire(&key, self.config.window_secs).await {
            Ok(count) => count,
            Err(e) => {
                warn!(%ip, error = %e, code = e.error_code(), "quota store unavailable — failing open");
                return Ok(RateLimitStatus {
                    limit,
                    remaining: limit,
                    reset: now_secs() + i64::try_from(self.config.window_secs).unwrap_or(0),
                });
            }
        };

        let reset = self.reset_at(&key).await;
        if count > limit {
            return Err(RateLimitError::Exceeded { limit, window_secs: self.config.window_secs, reset });
        }

        Ok(RateLimitStatus { limit, remaining: limit - count, reset })
    }

    /// Read-only quota snapshot for the caller (no request charged).
    pub async fn status(&self, ip: &str) -> RateLimitStatus {
        let key = Self::key(ip);
        let limit = self.config.max_requests;

        let count = match self.store.get(&key).await {
            Ok(Some(raw)) => raw.parse::<u64>().unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                warn!(%ip, error = %e, "quota store unavailable — reporting full quota");
                0
            }
        };

        RateLimitStatus { limit, remaining: limit.saturating_sub(count), reset: self.reset_at(&key).await }
    }
}

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;
