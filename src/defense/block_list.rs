//! Static IP denylist stage.

use std::collections::HashSet;
use std::net::IpAddr;

use async_trait::async_trait;
use axum::http::StatusCode;

use super::{AdmissionContext, Denial, Stage, StageOutcome};
use crate::events::SecurityEvent;

/// Denies requests whose client IP is on a fixed list. O(1) membership.
pub struct IpBlockListStage {
    blocked: HashSet<IpAddr>,
}

impl IpBlockListStage {
    /// Parse the configured address strings; invalid entries are logged and
    /// skipped so one typo cannot take the stage down.
    pub fn from_config(entries: &[String]) -> Self {
        let mut blocked = HashSet::with_capacity(entries.len());
        for entry in entries {
            match entry.parse::<IpAddr>() {
                Ok(ip) => {
                    blocked.insert(ip);
                }
                Err(_) => {
                    tracing::warn!(entry = %entry, "Ignoring invalid blocked_ips entry");
                }
            }
        }
        Self { blocked }
    }

    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}

#[async_trait]
impl Stage for IpBlockListStage {
    async fn evaluate(&self, ctx: &AdmissionContext) -> StageOutcome {
        if self.blocked.contains(&ctx.client_ip) {
            StageOutcome::deny(Denial {
                status: StatusCode::FORBIDDEN,
                error: "Forbidden".to_string(),
                code: Some("IP_BLOCKED"),
                message: "IP address is blocked".to_string(),
                event: Some(SecurityEvent::IpBlocked {
                    ip: ctx.client_ip.to_string(),
                }),
            })
        } else {
            StageOutcome::allow()
        }
    }

    fn name(&self) -> &'static str {
        "ip_block_list"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defense::Decision;
    use crate::events::EventSender;
    use axum::http::Method;

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
    async fn test_blocked_ip_denied() {
        let stage = IpBlockListStage::from_config(&["1.2.3.4".to_string()]);
        let outcome = stage.evaluate(&ctx_for("1.2.3.4")).await;
        match outcome.decision {
            Decision::Deny(denial) => {
                assert_eq!(denial.status, StatusCode::FORBIDDEN);
                assert!(denial.message.contains("IP address is blocked"));
            }
            Decision::Allow => panic!("expected deny"),
        }
    }

    #[tokio::test]
    async fn test_other_ip_allowed() {
        let stage = IpBlockListStage::from_config(&["1.2.3.4".to_string()]);
        let outcome = stage.evaluate(&ctx_for("5.5.5.5")).await;
        assert!(matches!(outcome.decision, Decision::Allow));
    }

    #[tokio::test]
    async fn test_invalid_entries_skipped() {
        let stage = IpBlockListStage::from_config(&[
            "1.2.3.4".to_string(),
            "not-an-ip".to_string(),
        ]);
        assert_eq!(stage.len(), 1);
    }
}
