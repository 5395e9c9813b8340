//! Application configuration parsed from environment variables.
//!
//! DESIGN
//! ======
//! One typed struct built once at startup and carried inside `AppState`.
//! Numeric variables fall back to defaults on parse failure — a malformed
//! `.env` must never take the service down.

pub const DEFAULT_PORT: u16 = 8000;

pub const DEFAULT_REDIS_HOST: &str = "localhost";
pub const DEFAULT_REDIS_PORT: u16 = 6379;
pub const DEFAULT_REDIS_DB: i64 = 0;

pub const DEFAULT_RATE_LIMIT_MAX_REQUESTS: u64 = 10;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 86_400;

pub const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;
pub const DEFAULT_SESSION_MAX_MESSAGES: usize = 20;

pub const DEFAULT_AI_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_AI_MAX_TOOL_ITERATIONS: usize = 10;

/// Parse an env var with a typed fallback.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed per window per IP.
    pub max_requests: u64,
    /// Window length in seconds (fixed window, expiry set at first request).
    pub window_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Seconds of inactivity before a session expires from the store.
    pub ttl_secs: u64,
    /// History cap; oldest messages are evicted first.
    pub max_messages: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AiConfig {
    pub max_tokens: u32,
    pub max_tool_iterations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
}

impl RedisConfig {
    /// Connection URL in the form `redis://host:port/db`.
    #[must_use]
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub port: u16,
    pub redis: RedisConfig,
    pub rate_limit: RateLimitConfig,
    pub session: SessionConfig,
    pub ai: AiConfig,
}

impl AppConfig {
    /// Build the full application config from environment variables.
    ///
    /// Recognized variables:
    /// - `PORT`
    /// - `REDIS_HOST`, `REDIS_PORT`, `REDIS_DB`
    /// - `RATE_LIMIT_MAX_REQUESTS`, `RATE_LIMIT_WINDOW_SECS`
    /// - `SESSION_TTL_SECS`, `SESSION_MAX_MESSAGES`
    /// - `AI_MAX_TOKENS`, `AI_MAX_TOOL_ITERATIONS`
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            port: env_parse("PORT", DEFAULT_PORT),
            redis: RedisConfig {
                host: std::env::var("REDIS_HOST").unwrap_or_else(|_| DEFAULT_REDIS_HOST.to_string()),
                port: env_parse("REDIS_PORT", DEFAULT_REDIS_PORT),
                db: env_parse("REDIS_DB", DEFAULT_REDIS_DB),
            },
            rate_limit: RateLimitConfig {
                max_requests: env_parse("RATE_LIMIT_MAX_REQUESTS", DEFAULT_RATE_LIMIT_MAX_REQUESTS),
                window_secs: env_parse("RATE_LIMIT_WINDOW_SECS", DEFAULT_RATE_LIMIT_WINDOW_SECS),
            },
            session: SessionConfig {
                ttl_secs: env_parse("SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS),
                max_messages: env_parse("SESSION_MAX_MESSAGES", DEFAULT_SESSION_MAX_MESSAGES),
            },
            ai: AiConfig {
                max_tokens: env_parse("AI_MAX_TOKENS", DEFAULT_AI_MAX_TOKENS),
                max_tool_iterations: env_parse("AI_MAX_TOOL_ITERATIONS", DEFAULT_AI_MAX_TOOL_ITERATIONS),
            },
        }
    }

    /// Config with all defaults, independent of the process environment.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            port: DEFAULT_PORT,
            redis: RedisConfig {
                host: DEFAULT_REDIS_HOST.to_string(),
                port: DEFAULT_REDIS_PORT,
                db: DEFAULT_REDIS_DB,
            },
            rate_limit: RateLimitConfig {
                max_requests: DEFAULT_RATE_LIMIT_MAX_REQUESTS,
                window_secs: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            },
            session: SessionConfig {
                ttl_secs: DEFAULT_SESSION_TTL_SECS,
                max_messages: DEFAULT_SESSION_MAX_MESSAGES,
            },
            ai: AiConfig { max_tokens: DEFAULT_AI_MAX_TOKENS, max_tool_iterations: DEFAULT_AI_MAX_TOOL_ITERATIONS },
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
