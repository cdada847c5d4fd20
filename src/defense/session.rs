//! Session fingerprint validation.
//!
//! A session is Unbound until its first request records a fingerprint, then
//! Bound. Every later request with the same session identifier must match
//! the bound fingerprint along each enabled dimension; drift is treated as
//! hijacking and tears the session down.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use axum::http::StatusCode;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use super::{AdmissionContext, Denial, Stage, StageOutcome};
use crate::events::{FingerprintSnapshot, SecurityEvent};

/// What a session identifier is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub ip: IpAddr,
    pub user_agent_hash: Option<String>,
    pub established_at: SystemTime,
}

impl Fingerprint {
    fn snapshot(&self) -> FingerprintSnapshot {
        FingerprintSnapshot {
            ip: self.ip.to_string(),
            user_agent_hash: self.user_agent_hash.clone(),
        }
    }
}

/// SHA-256 hex digest of a User-Agent string.
pub fn hash_user_agent(user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_agent.as_bytes());
    hex::encode(hasher.finalize())
}

/// Owns the session→fingerprint association.
///
/// The validator reads and compares; the only writes are first-seen binding
/// and destruction on violation.
pub trait SessionStore: Send + Sync {
    fn fingerprint(&self, session_id: &str) -> Option<Fingerprint>;
    fn bind(&self, session_id: &str, fingerprint: Fingerprint);
    fn destroy(&self, session_id: &str);
}

/// In-process session store.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Fingerprint>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn fingerprint(&self, session_id: &str) -> Option<Fingerprint> {
        self.sessions.get(session_id).map(|entry| entry.clone())
    }

    fn bind(&self, session_id: &str, fingerprint: Fingerprint) {
        self.sessions.insert(session_id.to_string(), fingerprint);
    }

    fn destroy(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}

/// Validates session fingerprints and terminates hijacked sessions.
pub struct SessionGuardStage {
    store: Arc<dyn SessionStore>,
    enforce_ip: bool,
    enforce_ua: bool,
    exclude_paths: Vec<String>,
}

impl SessionGuardStage {
    pub fn new(
        store: Arc<dyn SessionStore>,
        enforce_ip: bool,
        enforce_ua: bool,
        exclude_paths: Vec<String>,
    ) -> Self {
        Self {
            store,
            enforce_ip,
            enforce_ua,
            exclude_paths,
        }
    }

    fn excluded(&self, path: &str) -> bool {
        self.exclude_paths.iter().any(|prefix| path.starts_with(prefix))
    }
}

#[async_trait]
impl Stage for SessionGuardStage {
    async fn evaluate(&self, ctx: &AdmissionContext) -> StageOutcome {
        if self.excluded(&ctx.path) {
            return StageOutcome::allow();
        }
        // stateless requests are not guarded
        let Some(session_id) = &ctx.session_id else {
            return StageOutcome::allow();
        };

        let current = Fingerprint {
            ip: ctx.client_ip,
            user_agent_hash: ctx.user_agent.as_deref().map(hash_user_agent),
            established_at: SystemTime::now(),
        };

        let Some(bound) = self.store.fingerprint(session_id) else {
            // Unbound → Bound on first observation
            self.store.bind(session_id, current);
            return StageOutcome::allow();
        };

        let ip_drift = self.enforce_ip && bound.ip != current.ip;
        let ua_drift = self.enforce_ua && bound.user_agent_hash != current.user_agent_hash;

        if ip_drift || ua_drift {
            self.store.destroy(session_id);
            tracing::warn!(
                session_id = %session_id,
                bound_ip = %bound.ip,
                current_ip = %current.ip,
                ip_drift,
                ua_drift,
                "Session fingerprint mismatch, session destroyed"
            );
            return StageOutcome::deny(Denial {
                status: StatusCode::FORBIDDEN,
                error: "Forbidden".to_string(),
                code: Some("SESSION_HIJACK"),
                message: "Session fingerprint mismatch, session terminated".to_string(),
                event: Some(SecurityEvent::SessionHijacking {
                    session_id: session_id.clone(),
                    old_fingerprint: bound.snapshot(),
                    new_fingerprint: current.snapshot(),
                }),
            });
        }

        StageOutcome::allow()
    }

    fn name(&self) -> &'static str {
        "session_guard"
    }
}
