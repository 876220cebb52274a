//! Vanguard admission gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                  VANGUARD                     │
//!   Client Request       │  ┌──────────┐   ┌───────────┐   ┌──────────┐ │
//!   ─────────────────────┼─▶│   http   │──▶│ admission │──▶│ routing  │─┼──▶ Upstream
//!                        │  │  server  │   │   gates   │   │  table   │ │
//!                        │  └──────────┘   └─────┬─────┘   └──────────┘ │
//!                        │                       │ outcomes              │
//!                        │                       ▼                       │
//!                        │   failure tracker → circuit breaker           │
//!                        │   memory sampler  → load shedder              │
//!                        │                       │ transitions           │
//!                        │                       ▼                       │
//!                        │          incidents (worker + webhook)         │
//!                        └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use vanguard::config::loader::{config_from_env, load_config};
use vanguard::config::watcher::ConfigWatcher;
use vanguard::lifecycle::{wait_for_signal, Shutdown};
use vanguard::observability::{logging, metrics};
use vanguard::VanguardServer;

#[derive(Parser)]
#[command(name = "vanguard", version, about = "Adaptive admission-control gateway")]
struct Args {
    /// TOML configuration file. Defaults plus environment overrides when omitted.
    #[arg(short, long, env = "VANGUARD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => config_from_env()?,
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "vanguard starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        mode = config.admission.mode.as_str(),
        circuit_breaker_enabled = config.admission.circuit_breaker_enabled,
        load_shedding_enabled = config.admission.load_shedding_enabled,
        routes = config.routes.len(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // The watcher handle must outlive the server.
    let (_watcher, config_updates) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (Some(handle), Some(updates)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload unavailable");
                    (None, None)
                }
            }
        }
        None => (None, None),
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.trigger();
    });

    let server = VanguardServer::new(config)?;
    server.run(listener, config_updates, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
