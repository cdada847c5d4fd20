//! Geographic access control.
//!
//! The country lookup is an injectable capability: a deployment may wire a
//! MaxMind database, a static table, or nothing at all. "Not configured"
//! and "database miss" both read as unknown, and unknown never denies.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;

use super::{AdmissionContext, Denial, Stage, StageOutcome};
use crate::events::SecurityEvent;

/// Resolves a client address to an ISO country code.
///
/// Implementations return `None` for anything they cannot resolve (an
/// unloaded database, a private address, a miss). They never error.
pub trait CountryLookup: Send + Sync {
    fn country(&self, ip: IpAddr) -> Option<String>;
}

/// MaxMind-format country database.
pub struct GeoDatabase {
    reader: maxminddb::Reader<Vec<u8>>,
}

impl GeoDatabase {
    /// Open a database file. Failure is reported, not panicked over; the
    /// caller decides whether to run without geo blocking.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, maxminddb::MaxMindDBError> {
        let reader = maxminddb::Reader::open_readfile(path)?;
        Ok(Self { reader })
    }
}

impl CountryLookup for GeoDatabase {
    fn country(&self, ip: IpAddr) -> Option<String> {
        self.reader
            .lookup::<maxminddb::geoip2::Country>(ip)
            .ok()
            .and_then(|record| record.country)
            .and_then(|country| country.iso_code)
            .map(str::to_string)
    }
}

/// Fixed address→country table. Used in tests and small deployments.
pub struct StaticCountryLookup {
    table: HashMap<IpAddr, String>,
}

impl StaticCountryLookup {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (IpAddr, String)>) -> Self {
        Self {
            table: pairs.into_iter().collect(),
        }
    }
}

impl CountryLookup for StaticCountryLookup {
    fn country(&self, ip: IpAddr) -> Option<String> {
        self.table.get(&ip).cloned()
    }
}

/// Denies requests by resolved country.
///
/// Allow-list and deny-list are independent and may both be active: the
/// country must be present in a non-empty allow-list AND absent from the
/// deny-list.
pub struct GeoBlockStage {
    lookup: Option<Arc<dyn CountryLookup>>,
    allowed: HashSet<String>,
    blocked: HashSet<String>,
}

impl GeoBlockStage {
    pub fn new(
        lookup: Option<Arc<dyn CountryLookup>>,
        allowed: &[String],
        blocked: &[String],
    ) -> Self {
        Self {
            lookup,
            allowed: allowed.iter().map(|c| c.to_uppercase()).collect(),
            blocked: blocked.iter().map(|c| c.to_uppercase()).collect(),
        }
    }

    fn denial(ctx: &AdmissionContext, country: &str) -> Denial {
        Denial {
            status: StatusCode::FORBIDDEN,
            error: "Forbidden".to_string(),
            code: Some("GEO_BLOCKED"),
            message: "Access from your region is not allowed".to_string(),
            event: Some(SecurityEvent::GeoBlocked {
                ip: ctx.client_ip.to_string(),
                country: country.to_string(),
            }),
        }
    }
}

#[async_trait]
impl Stage for GeoBlockStage {
    async fn evaluate(&self, ctx: &AdmissionContext) -> StageOutcome {
        // lookup not configured or not resolvable → never deny
        let Some(lookup) = &self.lookup else {
            return StageOutcome::allow();
        };
        let Some(country) = lookup.country(ctx.client_ip) else {
            return StageOutcome::allow();
        };
        let country = country.to_uppercase();

        if !self.allowed.is_empty() && !self.allowed.contains(&country) {
            return StageOutcome::deny(Self::denial(ctx, &country));
        }
        if self.blocked.contains(&country) {
            return StageOutcome::deny(Self::denial(ctx, &country));
        }

        StageOutcome::allow()
    }

    fn name(&self) -> &'static str {
        "geo_block"
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

    fn lookup() -> Arc<dyn CountryLookup> {
        Arc::new(StaticCountryLookup::from_pairs([
            ("1.1.1.1".parse().unwrap(), "US".to_string()),
            ("2.2.2.2".parse().unwrap(), "DE".to_string()),
            ("3.3.3.3".parse().unwrap(), "KP".to_string()),
        ]))
    }

    #[tokio::test]
    async fn test_deny_list_blocks_member() {
        let stage = GeoBlockStage::new(Some(lookup()), &[], &["KP".to_string()]);
        assert!(matches!(
            stage.evaluate(&ctx_for("3.3.3.3")).await.decision,
            Decision::Deny(_)
        ));
        assert!(matches!(
            stage.evaluate(&ctx_for("1.1.1.1")).await.decision,
            Decision::Allow
        ));
    }

    #[tokio::test]
    async fn test_allow_list_blocks_absentee() {
        let stage = GeoBlockStage::new(Some(lookup()), &["US".to_string()], &[]);
        assert!(matches!(
            stage.evaluate(&ctx_for("1.1.1.1")).await.decision,
            Decision::Allow
        ));
        assert!(matches!(
            stage.evaluate(&ctx_for("2.2.2.2")).await.decision,
            Decision::Deny(_)
        ));
    }

    #[tokio::test]
    async fn test_both_lists_must_pass() {
        // US allowed but also denied: deny-list wins
        let stage = GeoBlockStage::new(
            Some(lookup()),
            &["US".to_string(), "DE".to_string()],
            &["US".to_string()],
        );
        assert!(matches!(
            stage.evaluate(&ctx_for("1.1.1.1")).await.decision,
            Decision::Deny(_)
        ));
        assert!(matches!(
            stage.evaluate(&ctx_for("2.2.2.2")).await.decision,
            Decision::Allow
        ));
    }

    #[tokio::test]
    async fn test_unknown_country_passes() {
        let stage = GeoBlockStage::new(Some(lookup()), &["US".to_string()], &[]);
        // 8.8.8.8 is not in the table
        assert!(matches!(
            stage.evaluate(&ctx_for("8.8.8.8")).await.decision,
            Decision::Allow
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_lookup_passes() {
        let stage = GeoBlockStage::new(None, &["US".to_string()], &["KP".to_string()]);
        assert!(matches!(
            stage.evaluate(&ctx_for("3.3.3.3")).await.decision,
            Decision::Allow
        ));
    }
}
