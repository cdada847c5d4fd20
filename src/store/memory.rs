//! Single-process counter store backed by a concurrent map.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;

use super::{CounterStore, HitRecord, StoreError};

/// In-memory fixed-window counter store.
///
/// Entry mutation happens under the map's shard lock, so increments for one
/// key serialize even under concurrent bursts. A periodic sweep removes
/// expired records to bound memory under unbounded key cardinality.
pub struct MemoryCounterStore {
    records: DashMap<String, HitRecord>,
    window: Duration,
}

impl MemoryCounterStore {
    /// Create a store with the given window duration.
    pub fn new(window: Duration) -> Self {
        Self {
            records: DashMap::new(),
            window,
        }
    }

    /// Number of keys currently tracked (expired records included until the
    /// next sweep).
    pub fn tracked_keys(&self) -> usize {
        self.records.len()
    }

    /// Remove every record whose window has elapsed.
    pub fn sweep(&self) {
        let now = SystemTime::now();
        let before = self.records.len();
        self.records.retain(|_, record| !record.expired(now));
        // concurrent inserts can land mid-retain, so this is approximate
        let removed = before.saturating_sub(self.records.len());
        if removed > 0 {
            tracing::debug!(removed, remaining = self.records.len(), "Swept expired rate windows");
        }
    }

    /// Run the periodic sweep until shutdown is signalled.
    pub async fn run_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let mut ticker = time::interval(interval);
        // the first tick fires immediately; skip it
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Counter store sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment(&self, key: &str) -> Result<HitRecord, StoreError> {
        let now = SystemTime::now();
        // entry() holds the shard lock for the whole check-and-update, so a
        // freshly expired window is reset by exactly one caller
        let mut entry = self.records.entry(key.to_string()).or_insert(HitRecord {
            count: 0,
            window_reset_at: now + self.window,
        });

        if entry.expired(now) {
            entry.count = 0;
            entry.window_reset_at = now + self.window;
        }
        entry.count += 1;

        Ok(entry.clone())
    }

    async fn decrement(&self, key: &str) -> Result<(), StoreError> {
        if let Some(mut entry) = self.records.get_mut(key) {
            if entry.count > 0 {
                entry.count -= 1;
            }
        }
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<(), StoreError> {
        self.records.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_hit_opens_fresh_window() {
        let store = MemoryCounterStore::new(Duration::from_secs(60));
        let record = store.increment("1.2.3.4").await.unwrap();
        assert_eq!(record.count, 1);
        assert!(record.window_reset_at > SystemTime::now());
    }

    #[tokio::test]
    async fn test_increment_counts_within_window() {
        let store = MemoryCounterStore::new(Duration::from_secs(60));
        for expected in 1..=5 {
            let record = store.increment("key").await.unwrap();
            assert_eq!(record.count, expected);
        }
    }

    #[tokio::test]
    async fn test_window_expiry_resets_count_to_one() {
        let store = MemoryCounterStore::new(Duration::from_millis(30));
        for _ in 0..4 {
            store.increment("key").await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let record = store.increment("key").await.unwrap();
        assert_eq!(record.count, 1);
    }

    #[tokio::test]
    async fn test_reset_is_a_first_ever_hit() {
        let store = MemoryCounterStore::new(Duration::from_secs(60));
        for _ in 0..3 {
            store.increment("key").await.unwrap();
        }
        store.reset("key").await.unwrap();
        let record = store.increment("key").await.unwrap();
        assert_eq!(record.count, 1);
    }

    #[tokio::test]
    async fn test_decrement_floors_at_zero() {
        let store = MemoryCounterStore::new(Duration::from_secs(60));
        store.increment("key").await.unwrap();
        store.decrement("key").await.unwrap();
        store.decrement("key").await.unwrap();
        // missing key is also a no-op
        store.decrement("other").await.unwrap();
        let record = store.increment("key").await.unwrap();
        assert_eq!(record.count, 1);
    }

    #[tokio::test]
    async fn test_concurrent_increments_lose_nothing() {
        let store = Arc::new(MemoryCounterStore::new(Duration::from_secs(60)));
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.increment("shared").await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        let record = store.increment("shared").await.unwrap();
        assert_eq!(record.count, 51);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let store = MemoryCounterStore::new(Duration::from_millis(20));
        store.increment("old").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        store.increment("new").await.unwrap();
        // "old" expired, "new" has most of its window left
        store.sweep();
        assert_eq!(store.tracked_keys(), 1);
    }
}
