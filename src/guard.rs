//! Guard assembly.
//!
//! Everything with a lifecycle (counter store, Tor exit cache, session
//! store, event dispatcher) is constructed here and owned by the guard, not
//! by module globals. Two guards in one process share nothing unless the
//! caller injects the same component into both.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

use axum::body::Body;
use axum::http::Response;

use crate::audit::{AuditCallback, AuditEmitter};
use crate::config::GuardConfig;
use crate::defense::{
    CountryLookup, DefensePipeline, Denial, GeoBlockStage, GeoDatabase, IpBlockListStage,
    KeyExtractor, MemorySessionStore, RateLimitStage, SecurityHeaders, SessionGuardStage,
    SessionStore, Stage, TorBlockStage, TorExitList,
};
use crate::events::{EventDispatcher, EventSender};
use crate::lifecycle::Shutdown;
use crate::store::CounterStore;

/// Custom response builder for rate-limit denials, replacing the default
/// 429 JSON body.
pub type DenyHandler = Arc<dyn Fn(&Denial) -> Response<Body> + Send + Sync>;

/// A fully assembled admission pipeline plus its supporting services.
pub struct Guard {
    config: Arc<GuardConfig>,
    pipeline: DefensePipeline,
    security_headers: SecurityHeaders,
    auditor: AuditEmitter,
    events: EventSender,
    rate_limit_handler: Option<DenyHandler>,
    shutdown: Shutdown,
}

impl Guard {
    /// Start assembling a guard from config.
    pub fn builder(config: GuardConfig) -> GuardBuilder {
        GuardBuilder {
            config,
            counter_store: None,
            geo_lookup: None,
            session_store: None,
            key_extractor: None,
            audit_callback: None,
            rate_limit_handler: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &DefensePipeline {
        &self.pipeline
    }

    pub fn security_headers(&self) -> &SecurityHeaders {
        &self.security_headers
    }

    pub fn auditor(&self) -> &AuditEmitter {
        &self.auditor
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    pub fn rate_limit_handler(&self) -> Option<&DenyHandler> {
        self.rate_limit_handler.as_ref()
    }

    /// Stop the guard's background tasks (sweeper, refresher, dispatcher).
    pub fn close(&self) {
        self.shutdown.trigger();
    }
}

/// Swappable handle so a running server can atomically adopt a rebuilt
/// guard on config reload.
#[derive(Clone)]
pub struct GuardHandle {
    inner: Arc<ArcSwap<Guard>>,
}

impl GuardHandle {
    pub fn new(guard: Arc<Guard>) -> Self {
        Self {
            inner: Arc::new(ArcSwap::new(guard)),
        }
    }

    pub fn load(&self) -> Arc<Guard> {
        self.inner.load_full()
    }

    /// Swap in a rebuilt guard and shut the old one's background tasks down.
    pub fn replace(&self, guard: Arc<Guard>) {
        let old = self.inner.swap(guard);
        old.close();
    }
}

/// Builder wiring injectable components into the fixed stage order.
pub struct GuardBuilder {
    config: GuardConfig,
    counter_store: Option<Arc<dyn CounterStore>>,
    geo_lookup: Option<Arc<dyn CountryLookup>>,
    session_store: Option<Arc<dyn SessionStore>>,
    key_extractor: Option<KeyExtractor>,
    audit_callback: Option<AuditCallback>,
    rate_limit_handler: Option<DenyHandler>,
}

impl GuardBuilder {
    /// Inject a counter store (e.g. a shared Redis store) instead of the
    /// per-guard in-memory one.
    pub fn with_counter_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.counter_store = Some(store);
        self
    }

    /// Inject a country lookup instead of the configured database path.
    pub fn with_geo_lookup(mut self, lookup: Arc<dyn CountryLookup>) -> Self {
        self.geo_lookup = Some(lookup);
        self
    }

    /// Inject a session store shared with the application.
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = Some(store);
        self
    }

    /// Override the rate-limit key derivation (default: client IP).
    pub fn with_key_extractor(mut self, key_fn: KeyExtractor) -> Self {
        self.key_extractor = Some(key_fn);
        self
    }

    /// Receive every finished audit record in-process.
    pub fn with_audit_callback(mut self, callback: AuditCallback) -> Self {
        self.audit_callback = Some(callback);
        self
    }

    /// Replace the default 429 response for rate-limit denials.
    pub fn with_rate_limit_handler(mut self, handler: DenyHandler) -> Self {
        self.rate_limit_handler = Some(handler);
        self
    }

    /// Assemble the guard and spawn its background tasks.
    ///
    /// Must run inside a Tokio runtime. Construction never fails: a broken
    /// optional component (geo database, Redis) degrades with a logged
    /// warning instead.
    pub async fn build(self) -> Arc<Guard> {
        let config = self.config;
        let shutdown = Shutdown::new();

        let (events, _dispatcher) =
            EventDispatcher::start(config.webhooks.clone(), shutdown.subscribe());

        let mut stages: Vec<Arc<dyn Stage>> = Vec::new();
        let defense = &config.active_defense;

        if !defense.blocked_ips.is_empty() {
            stages.push(Arc::new(IpBlockListStage::from_config(&defense.blocked_ips)));
        }

        if defense.block_tor {
            let exit_list = TorExitList::new(defense.tor.clone());
            tokio::spawn(exit_list.clone().run(shutdown.subscribe()));
            stages.push(Arc::new(TorBlockStage::new(exit_list)));
        }

        if !defense.allowed_countries.is_empty() || !defense.blocked_countries.is_empty() {
            let lookup = match self.geo_lookup {
                Some(lookup) => Some(lookup),
                None => match &defense.geoip_database_path {
                    Some(path) => match GeoDatabase::open(path) {
                        Ok(db) => Some(Arc::new(db) as Arc<dyn CountryLookup>),
                        Err(e) => {
                            tracing::warn!(path = %path, error = %e, "Geo database unavailable, geo blocking passes through");
                            None
                        }
                    },
                    None => {
                        tracing::warn!("Country lists configured without a geo lookup, geo blocking passes through");
                        None
                    }
                },
            };
            stages.push(Arc::new(GeoBlockStage::new(
                lookup,
                &defense.allowed_countries,
                &defense.blocked_countries,
            )));
        }

        if defense.rate_limit.enabled {
            let window = Duration::from_millis(defense.rate_limit.window_ms.max(1));
            let store = match self.counter_store {
                Some(store) => store,
                None => Self::default_store(&config, window, &shutdown).await,
            };
            let mut stage = RateLimitStage::new(store, defense.rate_limit.max);
            if let Some(key_fn) = self.key_extractor {
                stage = stage.with_key_extractor(key_fn);
            }
            stages.push(Arc::new(stage));
        }

        if defense.session_guard.enabled {
            let store = self
                .session_store
                .unwrap_or_else(|| Arc::new(MemorySessionStore::new()));
            stages.push(Arc::new(SessionGuardStage::new(
                store,
                defense.session_guard.enforce_ip_binding,
                defense.session_guard.enforce_ua_binding,
                defense.session_guard.exclude_paths.clone(),
            )));
        }

        let auditor = AuditEmitter::from_config(&config, events.clone(), self.audit_callback);
        let security_headers = SecurityHeaders::new(config.security_headers.clone());
        let pipeline = DefensePipeline::new(stages);

        tracing::info!(
            enabled = config.enabled,
            stages = pipeline.len(),
            "Guard assembled"
        );

        Arc::new(Guard {
            config: Arc::new(config),
            pipeline,
            security_headers,
            auditor,
            events,
            rate_limit_handler: self.rate_limit_handler,
            shutdown,
        })
    }

    #[cfg(feature = "redis-store")]
    async fn default_store(
        config: &GuardConfig,
        window: Duration,
        shutdown: &Shutdown,
    ) -> Arc<dyn CounterStore> {
        if let Some(url) = &config.active_defense.rate_limit.redis_url {
            match crate::store::RedisCounterStore::connect(url, window).await {
                Ok(store) => {
                    tracing::info!("Rate limiting via shared Redis store");
                    return Arc::new(store);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Redis store unavailable, falling back to in-memory");
                }
            }
        }
        Self::memory_store(config, window, shutdown)
    }

    #[cfg(not(feature = "redis-store"))]
    async fn default_store(
        config: &GuardConfig,
        window: Duration,
        shutdown: &Shutdown,
    ) -> Arc<dyn CounterStore> {
        if config.active_defense.rate_limit.redis_url.is_some() {
            tracing::warn!("redis_url configured but the redis-store feature is off, using in-memory store");
        }
        Self::memory_store(config, window, shutdown)
    }

    fn memory_store(
        config: &GuardConfig,
        window: Duration,
        shutdown: &Shutdown,
    ) -> Arc<dyn CounterStore> {
        let store = Arc::new(crate::store::MemoryCounterStore::new(window));
        let sweep = Duration::from_secs(config.active_defense.rate_limit.sweep_interval_secs.max(1));
        tokio::spawn(store.clone().run_sweeper(sweep, shutdown.subscribe()));
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_with_defaults_has_rate_limit_only() {
        let guard = Guard::builder(GuardConfig::default()).build().await;
        // default config: rate limit on, everything else off
        assert_eq!(guard.pipeline().len(), 1);
        assert!(guard.enabled());
        guard.close();
    }

    #[tokio::test]
    async fn test_build_assembles_configured_stages() {
        let mut config = GuardConfig::default();
        config.active_defense.blocked_ips = vec!["1.2.3.4".to_string()];
        config.active_defense.blocked_countries = vec!["KP".to_string()];
        config.active_defense.session_guard.enabled = true;

        let guard = Guard::builder(config).build().await;
        // block list + geo + rate limit + session guard (tor off)
        assert_eq!(guard.pipeline().len(), 4);
        guard.close();
    }

    #[tokio::test]
    async fn test_handle_replace_closes_old_guard() {
        let first = Guard::builder(GuardConfig::default()).build().await;
        let handle = GuardHandle::new(first.clone());

        let second = Guard::builder(GuardConfig::passthrough()).build().await;
        handle.replace(second);

        assert!(!handle.load().enabled());
        handle.load().close();
    }
}
