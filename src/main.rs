//! Login gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌───────────────────────────────────────────────────┐
//!                      │                   LOGIN GATEWAY                   │
//!                      │                                                   │
//!   Client ────────────┼─▶ net::listener ─▶ gateway::session               │
//!                      │                      │                            │
//!                      │                      ▼                            │
//!                      │        security::rate_limit (per IP)              │
//!                      │                      │                            │
//!                      │                      ▼                            │
//!                      │   admission::controller ──push──▶ queue store ◀───┼── other
//!                      │                      │               ▲            │   instances
//!                      │                      ▼               │ pop        │
//!                      │   admission::dispatcher ─────────────┘            │
//!                      │                      │                            │
//!                      │                      ▼                            │
//!   Client ◀───────────┼──────────── forward::relay ◀────────▶ Backend ────┼──▶ auth server
//!                      │                                                   │
//!                      │  config (toml, hot reload) · observability ·      │
//!                      │  lifecycle (startup, signals, drain)              │
//!                      └───────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use login_gateway::config::{self, watcher::ConfigWatcher, GatewayConfig};
use login_gateway::lifecycle::{self, Shutdown};
use login_gateway::net::Listener;
use login_gateway::observability::logging;
use login_gateway::{GatewayError, GatewayServer};

#[derive(Parser, Debug)]
#[command(name = "login-gateway", version, about = "Queueing TCP gateway for a login server")]
struct Args {
    /// Path to the TOML config file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => match config::load_config(path) {
            Ok(config) => config,
            Err(e) => {
                // Logging is not up yet.
                eprintln!("login-gateway: failed to load {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "login-gateway starting");

    match run(config, args.config).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Fatal startup error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: GatewayConfig, config_path: Option<PathBuf>) -> Result<(), GatewayError> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        backend = %config.backend.address,
        store = ?config.queue.store,
        capacity = config.queue.capacity,
        "Configuration loaded"
    );

    let store = lifecycle::connect_store(&config.queue).await?;
    lifecycle::start_metrics(&config.observability);
    let listener = Listener::bind(&config.listener).await?;

    // Keep the watcher alive for the life of the server.
    let (updates, _watcher) = match config_path {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(&path);
            match watcher.run() {
                Ok(handle) => (updates, Some(handle)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    (updates, None)
                }
            }
        }
        None => {
            let (_tx, updates) = tokio::sync::mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let shutdown = Arc::new(Shutdown::new());
    {
        let shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            let signal = lifecycle::wait_for_signal().await;
            tracing::info!(%signal, "Stop signal received");
            shutdown.trigger();
        });
    }

    let server = GatewayServer::new(config, store);
    server.run(listener, updates, &shutdown).await;
    Ok(())
}
