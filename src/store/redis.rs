//! Redis-backed [`KvStore`].
//!
//! Thin wrapper over a `redis` connection manager — no data modeling here,
//! only command plumbing and error mapping. The manager reconnects on its
//! own, so a store outage degrades individual commands instead of killing
//! the process.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{KvStore, StoreError};
use crate::config::RedisConfig;

#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis and return a store handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or the initial connection
    /// cannot be established.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(config.url()).map_err(|e| StoreError::Connection(e.to_string()))?;
        let manager = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn command_error(e: redis::RedisError) -> StoreError {
    if e.is_connection_refusal() || e.is_timeout() || e.is_connection_dropped() {
        StoreError::Connection(e.to_string())
    } else {
        StoreError::Command(e.to_string())
    }
}

#[async_trait::async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn();
        let value: Option<String> = conn.get(key).await.map_err(command_error)?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), StoreError> {
        let mut conn = self.conn();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(command_error)
    }

    async fn incr_expire(&self, key: &str, ttl_secs: u64) -> Result<u64, StoreError> {
        let mut conn = self.conn();
        let count: u64 = conn.incr(key, 1).await.map_err(command_error)?;

        // EXPIRE NX sets the expiry only when the key has none, so the
        // window stays fixed at the first request. Races between INCR and
        // EXPIRE across instances resolve to a single expiry.
        let _: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(i64::try_from(ttl_secs).unwrap_or(i64::MAX))
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(count)
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.conn();
        // Redis: -2 = missing key, -1 = no expiry.
        let secs: i64 = conn.ttl(key).await.map_err(command_error)?;
        Ok(u64::try_from(secs).ok())
    }

    async fn del(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn();
        let removed: u64 = conn.del(key).await.map_err(command_error)?;
        Ok(removed > 0)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn();
        conn.keys(pattern).await.map_err(command_error)
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}
