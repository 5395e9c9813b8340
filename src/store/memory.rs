//! In-memory [`KvStore`] for tests.
//!
//! Mirrors the Redis semantics the service relies on (TTL expiry, fixed
//! counter windows, glob key listing) with an adjustable clock so expiry
//! behavior is testable without sleeping.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{KvStore, StoreError};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    /// Artificial clock advance applied on every read of "now".
    skew: Mutex<Duration>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()), skew: Mutex::new(Duration::ZERO) }
    }

    /// Advance the store's clock — entries whose TTL has passed become
    /// invisible, exactly as if wall time had elapsed.
    pub fn advance(&self, by: Duration) {
        let mut skew = self.skew.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *skew += by;
    }

    fn now(&self) -> Instant {
        let skew = self.skew.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Instant::now() + *skew
    }

    fn live<'a>(entry: Option<&'a Entry>, now: Instant) -> Option<&'a Entry> {
        entry.filter(|e| e.expires_at.is_none_or(|at| at > now))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn glob_match(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

#[async_trait::async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = self.now();
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(Self::live(entries.get(key), now).map(|e| e.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let now = self.now();
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(
            key.to_string(),
            Entry { value: value.to_string(), expires_at: Some(now + Duration::from_secs(ttl_secs)) },
        );
        Ok(())
    }

    async fn incr_expire(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError> {
        let now = self.now();
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let (count, expires_at) = match Self::live(entries.get(key), now) {
            Some(entry) => {
                let count = entry.value.parse::<u64>().unwrap_or(0) + 1;
                // Window is fixed at creation; keep the original expiry.
                (count, entry.expires_at)
            }
            None => (1, Some(now + Duration::from_secs(ttl_secs))),
        };

        entries.insert(key.to_string(), Entry { value: count.to_string(), expires_at });
        Ok(count)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = self.now();
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(Self::live(entries.get(key), now)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now).as_secs()))
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let now = self.now();
        let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let was_live = Self::live(entries.get(key), now).is_some();
        entries.remove(key);
        Ok(was_live)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let now = self.now();
        let entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(k, e)| Self::live(Some(e), now).is_some() && glob_match(pattern, k))
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> bool {
        true
    }
}

/// Always-failing store for degraded-path tests.
pub struct DownStore;

#[async_trait::async_trait]
impl KvStore for DownStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Connection("store down".into()))
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<(), StoreError> {
        Err(StoreError::Connection("store down".into()))
    }

    async fn incr_expire(&self, _key: &str, _ttl_secs: u64) -> Result<u64, StoreError> {
        Err(StoreError::Connection("store down".into()))
    }

    async fn ttl(&self, _key: &str) -> Result<Option<u64>, StoreError> {
        Err(StoreError::Connection("store down".into()))
    }

    async fn del(&self, _key: &str) -> Result<bool, StoreError> {
        Err(StoreError::Connection("store down".into()))
    }

    async fn keys(&self, _pattern: &str) -> Result<Vec<String>, StoreError> {
        Err(StoreError::Connection("store down".into()))
    }

    async fn ping(&self) -> bool {
        false
    }
}
