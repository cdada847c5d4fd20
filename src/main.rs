//! Gatewall gateway binary.
//!
//! Mounts the request-pipeline guard in front of a placeholder handler and
//! serves it. Deployments embedding the guard as a library use
//! [`gatewall::protect`] with their own router instead.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatewall::config::loader::load_config_or_default;
use gatewall::config::watcher::ConfigWatcher;
use gatewall::{Guard, GuardHandle, GuardServer};

#[derive(Parser, Debug)]
#[command(name = "gatewall", about = "Request-pipeline guard gateway")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "gatewall.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gatewall=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("gatewall v0.1.0 starting");

    let config = load_config_or_default(&args.config);

    tracing::info!(
        enabled = config.enabled,
        bind_address = %config.listener.bind_address,
        rate_limit = config.active_defense.rate_limit.enabled,
        block_tor = config.active_defense.block_tor,
        session_guard = config.active_defense.session_guard.enabled,
        "Configuration loaded"
    );

    // Initialize metrics exporter
    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            gatewall::observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let bind_address = config.listener.bind_address.clone();
    let guard = Guard::builder(config).build().await;
    let handle = GuardHandle::new(guard);

    // Hot reload: rebuild the guard on config change and swap it in.
    // In-memory rate windows reset on reload; Redis-backed quotas carry over.
    if args.config.exists() {
        let (watcher, mut updates) = ConfigWatcher::new(&args.config);
        match watcher.run() {
            Ok(watcher_guard) => {
                let handle = handle.clone();
                tokio::spawn(async move {
                    let _watcher_guard = watcher_guard;
                    while let Some(new_config) = updates.recv().await {
                        let rebuilt = Guard::builder(new_config).build().await;
                        handle.replace(rebuilt);
                        tracing::info!("Guard rebuilt from updated config");
                    }
                });
            }
            Err(e) => tracing::warn!(error = %e, "Config watcher failed to start"),
        }
    }

    let listener = TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = GuardServer::with_echo_handler(handle);
    server.run(listener).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
