//! Outbound security-event dispatch.
//!
//! # Data Flow
//! ```text
//! admission stage denies / auditor finishes a record
//!     → EventSender::send (bounded queue, never blocks the request)
//!     → dispatcher task
//!     → webhook sink(s): POST JSON, per-delivery timeout, bounded retry
//! ```
//!
//! # Design Decisions
//! - try_send on a bounded channel: a full queue drops the event with a
//!   logged warning rather than adding latency to the response path
//! - Delivery failures retry with jittered backoff, then drop
//! - Shutdown drains whatever is already queued, with a deadline

use std::time::Duration;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::schema::WebhookConfig;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Queue depth before events are dropped.
const QUEUE_CAPACITY: usize = 256;
/// Delivery attempts per webhook per event.
const MAX_ATTEMPTS: u32 = 3;

/// Client fingerprint as carried inside events.
#[derive(Debug, Clone, Serialize)]
pub struct FingerprintSnapshot {
    pub ip: String,
    pub user_agent_hash: Option<String>,
}

/// A security notification produced by the admission pipeline.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SecurityEvent {
    IpBlocked {
        ip: String,
    },
    TorBlocked {
        ip: String,
    },
    GeoBlocked {
        ip: String,
        country: String,
    },
    RateLimitExceeded {
        key: String,
        count: u64,
        limit: u64,
    },
    SessionHijacking {
        session_id: String,
        old_fingerprint: FingerprintSnapshot,
        new_fingerprint: FingerprintSnapshot,
    },
}

/// Anything shipped to webhook sinks.
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(SecurityEvent),
    AuditRecord(serde_json::Value),
}

impl Outbound {
    fn to_payload(&self) -> serde_json::Value {
        match self {
            Outbound::Event(event) => serde_json::json!({
                "type": "security_event",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "payload": event,
            }),
            Outbound::AuditRecord(record) => serde_json::json!({
                "type": "audit_record",
                "timestamp": chrono::Utc::now().to_rfc3339(),
                "payload": record,
            }),
        }
    }
}

/// Cheap handle for queueing outbound notifications.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Outbound>,
}

impl EventSender {
    /// Queue an event. Never blocks; a full queue drops the event.
    pub fn send(&self, outbound: Outbound) {
        match self.tx.try_send(outbound) {
            Ok(()) => metrics::record_event_queued(),
            Err(mpsc::error::TrySendError::Full(outbound)) => {
                metrics::record_event_dropped("queue_full");
                tracing::warn!(?outbound, "Event queue full, dropping notification");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                metrics::record_event_dropped("dispatcher_stopped");
            }
        }
    }

    /// A sender wired to nothing; events are counted and discarded. Useful
    /// in tests and for disabled pipelines.
    pub fn disconnected() -> Self {
        let (tx, _) = mpsc::channel(1);
        Self { tx }
    }
}

/// Background delivery task for security events and audit records.
pub struct EventDispatcher;

impl EventDispatcher {
    /// Spawn the dispatcher. Returns the queue handle and the task handle.
    pub fn start(
        webhooks: Vec<WebhookConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> (EventSender, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<Outbound>(QUEUE_CAPACITY);
        let client = reqwest::Client::new();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe = rx.recv() => {
                        match maybe {
                            Some(outbound) => deliver(&client, &webhooks, outbound).await,
                            None => break,
                        }
                    }
                    _ = shutdown.recv() => {
                        // drain what is already queued, bounded by a deadline
                        rx.close();
                        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
                        loop {
                            match tokio::time::timeout_at(deadline, rx.recv()).await {
                                Ok(Some(outbound)) => deliver(&client, &webhooks, outbound).await,
                                Ok(None) => break,
                                Err(_) => {
                                    tracing::warn!("Shutdown drain deadline reached with events still queued");
                                    break;
                                }
                            }
                        }
                        tracing::debug!("Event dispatcher received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        });

        (EventSender { tx }, handle)
    }
}

async fn deliver(client: &reqwest::Client, webhooks: &[WebhookConfig], outbound: Outbound) {
    if webhooks.is_empty() {
        tracing::debug!(?outbound, "No webhook sinks configured, event logged only");
        return;
    }

    let payload = outbound.to_payload();
    // sinks are independent of each other: fan out concurrently
    join_all(
        webhooks
            .iter()
            .map(|hook| deliver_to_hook(client, hook, &payload)),
    )
    .await;
}

async fn deliver_to_hook(client: &reqwest::Client, hook: &WebhookConfig, payload: &serde_json::Value) {
    let timeout = Duration::from_millis(hook.timeout_ms);

    for attempt in 1..=MAX_ATTEMPTS {
        let request = client.post(&hook.url).json(payload).timeout(timeout);
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                metrics::record_event_delivered(&hook.url);
                return;
            }
            Ok(response) => {
                tracing::warn!(
                    url = %hook.url,
                    status = %response.status(),
                    attempt,
                    "Webhook delivery rejected"
                );
            }
            Err(e) => {
                tracing::warn!(url = %hook.url, error = %e, attempt, "Webhook delivery failed");
            }
        }
        if attempt < MAX_ATTEMPTS {
            tokio::time::sleep(calculate_backoff(attempt, 200, 2_000)).await;
        }
    }

    metrics::record_event_dropped("delivery_failed");
    tracing::error!(url = %hook.url, "Webhook delivery gave up after retries");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let (tx, _rx) = mpsc::channel(1);
        let sender = EventSender { tx };

        // one fits, the rest are dropped; none of these calls may block
        for _ in 0..5 {
            sender.send(Outbound::Event(SecurityEvent::IpBlocked {
                ip: "1.2.3.4".to_string(),
            }));
        }
    }

    #[test]
    fn test_event_payload_shape() {
        let outbound = Outbound::Event(SecurityEvent::RateLimitExceeded {
            key: "1.2.3.4".to_string(),
            count: 101,
            limit: 100,
        });
        let payload = outbound.to_payload();
        assert_eq!(payload["type"], "security_event");
        assert_eq!(payload["payload"]["event"], "rate_limit_exceeded");
        assert_eq!(payload["payload"]["limit"], 100);
        assert!(payload["timestamp"].is_string());
    }
}
