//! Session management over the shared store.
//!
//! DESIGN
//! ======
//! A session is one JSON record (`session:{id}`) holding owner IP,
//! timestamps, and the bounded message history. Every append rewrites the
//! record with a fresh TTL, so "24 hours of inactivity" falls out of the
//! store's own expiry — no sweeper task.
//!
//! TRADE-OFFS
//! ==========
//! Listing scans `session:*` and filters by owner IP. Fine at portfolio
//! scale; an index set would be the next step if session counts grew.

use std::fmt::Write;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::clock::now_secs;
use crate::config::SessionConfig;
use crate::error::ErrorCode;
use crate::store::{KvStore, StoreError};

const KEY_PREFIX: &str = "session:";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("session record corrupt: {0}")]
    Corrupt(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl ErrorCode for SessionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_SESSION_NOT_FOUND",
            Self::Corrupt(_) => "E_SESSION_CORRUPT",
            Self::Store(_) => "E_SESSION_STORE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.retryable())
    }
}

/// One chat turn inside a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    /// `user`, `assistant`, or `tool`.
    pub role: String,
    pub content: String,
    /// Epoch seconds.
    pub timestamp: i64,
}

/// The persisted session record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub owner_ip: String,
    /// Epoch seconds.
    pub created_at: i64,
    /// Epoch seconds, refreshed on every append.
    pub last_activity: i64,
    pub messages: Vec<SessionMessage>,
}

// =============================================================================
// TOKENS
// =============================================================================

pub(crate) fn bytes_to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

/// Generate a cryptographically random 32-byte hex session id.
#[must_use]
pub fn generate_session_id() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    bytes_to_hex(&bytes)
}

// =============================================================================
// OPERATIONS
// =============================================================================

fn key(session_id: &str) -> String {
    format!("{KEY_PREFIX}{session_id}")
}

async fn save(
    store: &dyn KvStore,
    record: &SessionRecord,
    config: SessionConfig,
) -> Result<(), SessionError> {
    let json = serde_json::to_string(record).map_err(|e| SessionError::Corrupt(e.to_string()))?;
    store.set_ex(&key(&record.session_id), &json, config.ttl_secs).await?;
    Ok(())
}

/// Create a fresh empty session owned by `ip`.
pub async fn create_session(
    store: &dyn KvStore,
    ip: &str,
    config: SessionConfig,
) -> Result<SessionRecord, SessionError> {
    let now = now_secs();
    let record = SessionRecord {
        session_id: generate_session_id(),
        owner_ip: ip.to_string(),
        created_at: now,
        last_activity: now,
        messages: Vec::new(),
    };
    save(store, &record, config).await?;
    Ok(record)
}

/// Fetch a session by id.
pub async fn fetch_session(store: &dyn KvStore, session_id: &str) -> Result<SessionRecord, SessionError> {
    let Some(json) = store.get(&key(session_id)).await? else {
        return Err(SessionError::NotFound(session_id.to_string()));
    };
    serde_json::from_str(&json).map_err(|e| SessionError::Corrupt(e.to_string()))
}

/// Append a message, trimming history to the cap (oldest first) and
/// refreshing `last_activity` and the store TTL.
pub async fn append_message(
    store: &dyn KvStore,
    session_id: &str,
    role: &str,
    content: &str,
    config: SessionConfig,
) -> Result<SessionRecord, SessionError> {
    let mut record = fetch_session(store, session_id).await?;
    let now = now_secs();

    record
        .messages
        .push(SessionMessage { role: role.to_string(), content: content.to_string(), timestamp: now });
    while record.messages.len() > config.max_messages {
        record.messages.remove(0);
    }
    record.last_activity = now;

    save(store, &record, config).await?;
    Ok(record)
}

/// Delete a session. Returns `false` when it did not exist.
pub async fn delete_session(store: &dyn KvStore, session_id: &str) -> Result<bool, SessionError> {
    Ok(store.del(&key(session_id)).await?)
}

/// List sessions owned by `ip`, most recently active first.
pub async fn list_sessions(store: &dyn KvStore, ip: &str) -> Result<Vec<SessionRecord>, SessionError> {
    let keys = store.keys(&format!("{KEY_PREFIX}*")).await?;

    let mut sessions = Vec::new();
    for key in keys {
        let Some(json) = store.get(&key).await? else {
            continue; // expired between scan and read
        };
        let Ok(record) = serde_json::from_str::<SessionRecord>(&json) else {
            tracing::warn!(%key, "skipping corrupt session record");
            continue;
        };
        if record.owner_ip == ip {
            sessions.push(record);
        }
    }

    sessions.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    Ok(sessions)
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
