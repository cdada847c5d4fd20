//! Admission pipeline subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → block_list.rs (static IP denylist)
//!     → tor.rs (anonymity-network exit check)
//!     → geo.rs (country allow/deny)
//!     → rate_limit.rs (key-windowed quota)
//!     → session.rs (fingerprint drift)
//!     → Pass to the downstream handler
//! ```
//!
//! # Design Decisions
//! - Stages are a declarative ordered list behind one trait; the first deny
//!   short-circuits everything after it
//! - Policy violations deny deterministically; infrastructure faults fail
//!   open at the stage boundary and never reach the orchestrator
//! - A deny queues an async notification, it never waits on one

pub mod block_list;
pub mod geo;
pub mod headers;
pub mod rate_limit;
pub mod session;
pub mod tor;

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, Method, StatusCode};

use crate::events::{EventSender, Outbound, SecurityEvent};
use crate::observability::metrics;

pub use block_list::IpBlockListStage;
pub use geo::{CountryLookup, GeoBlockStage, GeoDatabase, StaticCountryLookup};
pub use headers::SecurityHeaders;
pub use rate_limit::{KeyExtractor, RateLimitStage};
pub use session::{Fingerprint, MemorySessionStore, SessionGuardStage, SessionStore};
pub use tor::{TorBlockStage, TorExitList};

/// Per-request view the stages evaluate against. Not persisted.
pub struct AdmissionContext {
    pub client_ip: IpAddr,
    pub method: Method,
    pub path: String,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    /// Handle for queueing security notifications.
    pub events: EventSender,
}

/// A refused request, with everything needed to answer the caller.
#[derive(Debug)]
pub struct Denial {
    pub status: StatusCode,
    /// Short error string for the JSON body (e.g. "Forbidden").
    pub error: String,
    /// Stable machine-readable code, when one exists.
    pub code: Option<&'static str>,
    /// Human-readable explanation.
    pub message: String,
    /// Notification queued on deny.
    pub event: Option<SecurityEvent>,
}

/// Outcome of one stage.
#[derive(Debug)]
pub enum Decision {
    Allow,
    Deny(Denial),
}

/// A stage's decision plus any response headers it wants surfaced.
///
/// Headers apply to allow *and* deny responses: the rate-limit stage reports
/// quota state either way.
pub struct StageOutcome {
    pub decision: Decision,
    pub headers: HeaderMap,
}

impl StageOutcome {
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            headers: HeaderMap::new(),
        }
    }

    pub fn deny(denial: Denial) -> Self {
        Self {
            decision: Decision::Deny(denial),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// One admission check.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn evaluate(&self, ctx: &AdmissionContext) -> StageOutcome;

    /// Stage name for logging and metrics.
    fn name(&self) -> &'static str;
}

/// Result of running the whole pipeline for one request.
pub struct PipelineVerdict {
    pub decision: Decision,
    /// Headers accumulated across every stage that ran.
    pub headers: HeaderMap,
}

impl PipelineVerdict {
    pub fn is_allow(&self) -> bool {
        matches!(self.decision, Decision::Allow)
    }
}

/// Ordered stage list with short-circuit-on-deny semantics.
pub struct DefensePipeline {
    stages: Vec<Arc<dyn Stage>>,
}

impl DefensePipeline {
    pub fn new(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self { stages }
    }

    /// Evaluate every stage in order. The first deny wins; its notification
    /// is queued here so stages stay pure decisions.
    pub async fn evaluate(&self, ctx: &AdmissionContext) -> PipelineVerdict {
        let mut headers = HeaderMap::new();

        for stage in &self.stages {
            let outcome = stage.evaluate(ctx).await;
            headers.extend(outcome.headers);

            if let Decision::Deny(mut denial) = outcome.decision {
                tracing::info!(
                    stage = stage.name(),
                    ip = %ctx.client_ip,
                    method = %ctx.method,
                    path = %ctx.path,
                    reason = %denial.message,
                    "Request denied"
                );
                metrics::record_denial(stage.name());
                if let Some(event) = denial.event.take() {
                    ctx.events.send(Outbound::Event(event));
                }
                return PipelineVerdict {
                    decision: Decision::Deny(denial),
                    headers,
                };
            }
        }

        PipelineVerdict {
            decision: Decision::Allow,
            headers,
        }
    }

    /// Number of configured stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
