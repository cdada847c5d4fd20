//! Rate limiting stage.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue, StatusCode};

use super::{AdmissionContext, Denial, Stage, StageOutcome};
use crate::events::SecurityEvent;
use crate::observability::metrics;
use crate::store::{CounterStore, HitRecord};

/// Derives the accounting key for a request. Defaults to the client IP.
pub type KeyExtractor = Arc<dyn Fn(&AdmissionContext) -> String + Send + Sync>;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// Counts hits per key in a fixed window and denies past the quota.
///
/// Store failures fail OPEN: infrastructure trouble must not block traffic.
pub struct RateLimitStage {
    store: Arc<dyn CounterStore>,
    max: u64,
    key_fn: Option<KeyExtractor>,
}

impl RateLimitStage {
    pub fn new(store: Arc<dyn CounterStore>, max: u64) -> Self {
        Self {
            store,
            max,
            key_fn: None,
        }
    }

    /// Replace the default client-IP key with a custom derivation.
    pub fn with_key_extractor(mut self, key_fn: KeyExtractor) -> Self {
        self.key_fn = Some(key_fn);
        self
    }

    fn key_for(&self, ctx: &AdmissionContext) -> String {
        match &self.key_fn {
            Some(f) => f(ctx),
            None => ctx.client_ip.to_string(),
        }
    }

    /// Quota headers reflecting state after the decision.
    fn quota_headers(&self, record: &HitRecord) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let remaining = self.max.saturating_sub(record.count);
        if let Ok(value) = HeaderValue::from_str(&self.max.to_string()) {
            headers.insert(HEADER_LIMIT, value);
        }
        if let Ok(value) = HeaderValue::from_str(&remaining.to_string()) {
            headers.insert(HEADER_REMAINING, value);
        }
        if let Ok(value) = HeaderValue::from_str(&record.reset_epoch_secs().to_string()) {
            headers.insert(HEADER_RESET, value);
        }
        headers
    }
}

#[async_trait]
impl Stage for RateLimitStage {
    async fn evaluate(&self, ctx: &AdmissionContext) -> StageOutcome {
        let key = self.key_for(ctx);

        let record = match self.store.increment(&key).await {
            Ok(record) => record,
            Err(e) => {
                // fail open: the error is ours, not the caller's
                tracing::error!(error = %e, key = %key, "Counter store failed, allowing request");
                metrics::record_store_error();
                return StageOutcome::allow();
            }
        };

        let headers = self.quota_headers(&record);

        if record.count > self.max {
            metrics::record_rate_limited();
            StageOutcome::deny(Denial {
                status: StatusCode::TOO_MANY_REQUESTS,
                error: "Too Many Requests".to_string(),
                code: Some("RATE_LIMITED"),
                message: "Rate limit exceeded, try again later".to_string(),
                event: Some(SecurityEvent::RateLimitExceeded {
                    key,
                    count: record.count,
                    limit: self.max,
                }),
            })
            .with_headers(headers)
        } else {
            StageOutcome::allow().with_headers(headers)
        }
    }

    fn name(&self) -> &'static str {
        "rate_limit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defense::Decision;
    use crate::events::EventSender;
    use crate::store::{MemoryCounterStore, StoreError};
    use axum::http::Method;
    use std::time::Duration;

    fn ctx_for(ip: &str) -> AdmissionContext {
        AdmissionContext {
            client_ip: ip.parse().unwrap(),
            method: Method::GET,
            path: "/".to_string(),
            user_agent: None,
            session_id: None,
            events: EventSender::disconnected(),
        }
    }

    #[tokio::test]
    async fn test_remaining_counts_down_then_denies() {
        let store = Arc::new(MemoryCounterStore::new(Duration::from_secs(60)));
        let stage = RateLimitStage::new(store, 2);
        let ctx = ctx_for("10.0.0.1");

        let first = stage.evaluate(&ctx).await;
        assert!(matches!(first.decision, Decision::Allow));
        assert_eq!(first.headers[HEADER_REMAINING], "1");
        assert_eq!(first.headers[HEADER_LIMIT], "2");

        let second = stage.evaluate(&ctx).await;
        assert!(matches!(second.decision, Decision::Allow));
        assert_eq!(second.headers[HEADER_REMAINING], "0");

        let third = stage.evaluate(&ctx).await;
        match third.decision {
            Decision::Deny(denial) => {
                assert_eq!(denial.status, StatusCode::TOO_MANY_REQUESTS);
                assert_eq!(denial.error, "Too Many Requests");
            }
            Decision::Allow => panic!("expected deny"),
        }
        // remaining floors at zero on the deny
        assert_eq!(third.headers[HEADER_REMAINING], "0");
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = Arc::new(MemoryCounterStore::new(Duration::from_secs(60)));
        let stage = RateLimitStage::new(store, 1);

        assert!(matches!(
            stage.evaluate(&ctx_for("10.0.0.1")).await.decision,
            Decision::Allow
        ));
        assert!(matches!(
            stage.evaluate(&ctx_for("10.0.0.2")).await.decision,
            Decision::Allow
        ));
        assert!(matches!(
            stage.evaluate(&ctx_for("10.0.0.1")).await.decision,
            Decision::Deny(_)
        ));
    }

    #[tokio::test]
    async fn test_custom_key_extractor() {
        let store = Arc::new(MemoryCounterStore::new(Duration::from_secs(60)));
        let stage = RateLimitStage::new(store, 1)
            .with_key_extractor(Arc::new(|ctx| ctx.path.clone()));

        // same path from different IPs shares one bucket
        assert!(matches!(
            stage.evaluate(&ctx_for("10.0.0.1")).await.decision,
            Decision::Allow
        ));
        assert!(matches!(
            stage.evaluate(&ctx_for("10.0.0.2")).await.decision,
            Decision::Deny(_)
        ));
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        struct BrokenStore;

        #[async_trait]
        impl CounterStore for BrokenStore {
            async fn increment(&self, _key: &str) -> Result<HitRecord, StoreError> {
                Err(StoreError::Timeout)
            }
            async fn decrement(&self, _key: &str) -> Result<(), StoreError> {
                Err(StoreError::Timeout)
            }
            async fn reset(&self, _key: &str) -> Result<(), StoreError> {
                Err(StoreError::Timeout)
            }
        }

        let stage = RateLimitStage::new(Arc::new(BrokenStore), 1);
        let outcome = stage.evaluate(&ctx_for("10.0.0.1")).await;
        assert!(matches!(outcome.decision, Decision::Allow));
        assert!(outcome.headers.is_empty());
    }

    #[tokio::test]
    async fn test_fresh_window_grants_full_quota_again() {
        // fixed window semantics: a burst of max at the end of one window and
        // max at the start of the next is permitted
        let store = Arc::new(MemoryCounterStore::new(Duration::from_millis(40)));
        let stage = RateLimitStage::new(store, 2);
        let ctx = ctx_for("10.0.0.1");

        for _ in 0..2 {
            assert!(matches!(stage.evaluate(&ctx).await.decision, Decision::Allow));
        }
        assert!(matches!(stage.evaluate(&ctx).await.decision, Decision::Deny(_)));

        tokio::time::sleep(Duration::from_millis(60)).await;

        for _ in 0..2 {
            assert!(matches!(stage.evaluate(&ctx).await.decision, Decision::Allow));
        }
    }
}
