//! Key-windowed counter store.
//!
//! # Data Flow
//! ```text
//! rate-limit stage
//!     → CounterStore::increment(key)
//!     → memory.rs (DashMap, single process) or redis.rs (shared quota)
//!     → HitRecord { count, window_reset_at }
//! ```
//!
//! # Design Decisions
//! - Fixed window, not sliding: the count resets entirely on first touch
//!   after expiry
//! - increment is atomic per key; two concurrent callers never both observe
//!   a fresh window
//! - Store failures are the stage's problem: it fails open, the store just
//!   reports the error

pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

pub use memory::MemoryCounterStore;
#[cfg(feature = "redis-store")]
pub use redis::RedisCounterStore;

/// Error type for counter store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(String),
    #[error("store timeout")]
    Timeout,
}

/// One tracked key's state within the current window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitRecord {
    /// Hits recorded in the current window.
    pub count: u64,
    /// Absolute end of the current window.
    pub window_reset_at: SystemTime,
}

impl HitRecord {
    /// Whether the record's window has elapsed.
    pub fn expired(&self, now: SystemTime) -> bool {
        now >= self.window_reset_at
    }

    /// Window end as seconds since the Unix epoch, for the reset header.
    pub fn reset_epoch_secs(&self) -> u64 {
        self.window_reset_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Per-key hit accounting within a fixed rolling window.
///
/// Implementations must make `increment` atomic per key: under concurrent
/// calls for the same key there are no lost updates and no double-reset of
/// a freshly expired window.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Record one hit for `key` and return the post-increment state.
    ///
    /// A missing or expired record becomes a fresh window with `count = 1`.
    async fn increment(&self, key: &str) -> Result<HitRecord, StoreError>;

    /// Release one unit of quota for `key`. Best-effort; a missing record or
    /// a zero count is a no-op.
    async fn decrement(&self, key: &str) -> Result<(), StoreError>;

    /// Forget `key` entirely, as if it had never been hit.
    async fn reset(&self, key: &str) -> Result<(), StoreError>;
}
