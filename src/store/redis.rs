//! Distributed counter store backed by Redis.
//!
//! Multiple gateway processes pointing at the same Redis enforce one global
//! quota per key: `INCR` is atomic server-side and the key's TTL carries the
//! window.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{CounterStore, HitRecord, StoreError};

/// Redis-backed fixed-window counter store.
pub struct RedisCounterStore {
    conn: ConnectionManager,
    window: Duration,
    key_prefix: String,
}

impl RedisCounterStore {
    /// Connect to Redis and return a store with the given window duration.
    pub async fn connect(redis_url: &str, window: Duration) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(redis_url).map_err(|e| StoreError::Redis(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Redis(e.to_string()))?;
        Ok(Self {
            conn,
            window,
            key_prefix: "gatewall:hits:".to_string(),
        })
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment(&self, key: &str) -> Result<HitRecord, StoreError> {
        let k = self.redis_key(key);
        let window_ms = self.window.as_millis() as i64;
        let mut conn = self.conn.clone();

        let count: u64 = conn
            .incr(&k, 1)
            .await
            .map_err(|e| StoreError::Redis(e.to_string()))?;
        if count == 1 {
            let _: bool = conn
                .pexpire(&k, window_ms)
                .await
                .map_err(|e| StoreError::Redis(e.to_string()))?;
        }

        let mut ttl_ms: i64 = conn
            .pttl(&k)
            .await
            .map_err(|e| StoreError::Redis(e.to_string()))?;
        if ttl_ms < 0 {
            // the key lost its expiry (e.g. a crash between INCR and
            // PEXPIRE); re-arm it so the window cannot become immortal
            let _: bool = conn
                .pexpire(&k, window_ms)
                .await
                .map_err(|e| StoreError::Redis(e.to_string()))?;
            ttl_ms = window_ms;
        }

        Ok(HitRecord {
            count,
            window_reset_at: SystemTime::now() + Duration::from_millis(ttl_ms as u64),
        })
    }

    async fn decrement(&self, key: &str) -> Result<(), StoreError> {
        let k = self.redis_key(key);
        let mut conn = self.conn.clone();
        let value: i64 = conn
            .decr(&k, 1)
            .await
            .map_err(|e| StoreError::Redis(e.to_string()))?;
        if value < 0 {
            // best-effort floor at zero
            let _: i64 = conn
                .incr(&k, 1)
                .await
                .map_err(|e| StoreError::Redis(e.to_string()))?;
        }
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        let k = self.redis_key(key);
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(&k)
            .await
            .map_err(|e| StoreError::Redis(e.to_string()))?;
        Ok(())
    }
}
