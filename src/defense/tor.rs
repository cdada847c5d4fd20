//! Anonymity-network exit-node blocking.
//!
//! The exit set is fetched from a public bulk list on a slow cadence and
//! cached process-wide. Request-path checks only ever read the cached set;
//! a cold or stale cache reads as empty and kicks off a refresh instead of
//! blocking anyone.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::http::StatusCode;
use tokio::sync::broadcast;
use tokio::time;

use super::{AdmissionContext, Denial, Stage, StageOutcome};
use crate::config::schema::TorConfig;
use crate::events::SecurityEvent;
use crate::observability::metrics;

/// Cached set of known Tor exit addresses with background refresh.
pub struct TorExitList {
    exits: ArcSwap<HashSet<IpAddr>>,
    last_refresh: Mutex<Option<Instant>>,
    refreshing: AtomicBool,
    client: reqwest::Client,
    config: TorConfig,
}

impl TorExitList {
    pub fn new(config: TorConfig) -> Arc<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .expect("reqwest client builds with static options");
        Arc::new(Self {
            exits: ArcSwap::from_pointee(HashSet::new()),
            last_refresh: Mutex::new(None),
            refreshing: AtomicBool::new(false),
            client,
            config,
        })
    }

    /// Synchronous check against the currently cached set. Never blocks.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.exits.load().contains(&ip)
    }

    /// Number of cached exit addresses.
    pub fn len(&self) -> usize {
        self.exits.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.exits.load().is_empty()
    }

    /// Whether the cache has never been filled or has outlived the refresh
    /// interval.
    pub fn is_stale(&self) -> bool {
        let guard = self.last_refresh.lock().expect("tor list mutex poisoned");
        match *guard {
            None => true,
            Some(at) => at.elapsed() > Duration::from_secs(self.config.refresh_interval_secs),
        }
    }

    /// Fetch the list and swap the cached set.
    pub async fn refresh(&self) -> Result<usize, reqwest::Error> {
        let body = self
            .client
            .get(&self.config.exit_list_url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        let exits = parse_exit_list(&body);
        let count = exits.len();
        self.exits.store(Arc::new(exits));
        *self.last_refresh.lock().expect("tor list mutex poisoned") = Some(Instant::now());
        metrics::record_tor_exit_nodes(count);
        tracing::info!(exit_nodes = count, "Tor exit list refreshed");
        Ok(count)
    }

    /// Fire-and-forget refresh. At most one in flight at a time.
    pub fn trigger_refresh(self: &Arc<Self>) {
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        let list = self.clone();
        tokio::spawn(async move {
            if let Err(e) = list.refresh().await {
                tracing::warn!(error = %e, "Tor exit list refresh failed");
            }
            list.refreshing.store(false, Ordering::SeqCst);
        });
    }

    /// Run the fixed-interval refresh until shutdown is signalled.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        // fill the cold cache right away rather than waiting a full interval
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "Initial Tor exit list fetch failed");
        }

        let mut ticker = time::interval(Duration::from_secs(self.config.refresh_interval_secs));
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        tracing::warn!(error = %e, "Tor exit list refresh failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Tor exit list refresher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

/// One address per line; anything unparseable is skipped.
fn parse_exit_list(body: &str) -> HashSet<IpAddr> {
    body.lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// Denies requests arriving from a known Tor exit node.
pub struct TorBlockStage {
    list: Arc<TorExitList>,
}

impl TorBlockStage {
    pub fn new(list: Arc<TorExitList>) -> Self {
        Self { list }
    }
}

#[async_trait]
impl Stage for TorBlockStage {
    async fn evaluate(&self, ctx: &AdmissionContext) -> StageOutcome {
        // opportunistic: a stale cache refreshes in the background while this
        // request is answered from whatever is cached now
        if self.list.is_stale() {
            self.list.trigger_refresh();
        }

        if self.list.contains(ctx.client_ip) {
            StageOutcome::deny(Denial {
                status: StatusCode::FORBIDDEN,
                error: "Forbidden".to_string(),
                code: Some("TOR_BLOCKED"),
                message: "Requests from Tor exit nodes are not allowed".to_string(),
                event: Some(SecurityEvent::TorBlocked {
                    ip: ctx.client_ip.to_string(),
                }),
            })
        } else {
            StageOutcome::allow()
        }
    }

    fn name(&self) -> &'static str {
        "tor_block"
    }
}
