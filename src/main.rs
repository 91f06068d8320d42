//! Transparent TCP load balancer.
//!
//! Accepts client connections on one address, picks a backend from the
//! configured service class's pool in round-robin order, and relays bytes
//! both ways until either side closes.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!                 │                  TCP BALANCER                    │
//!   Client        │  ┌──────────┐   ┌────────────┐   ┌───────────┐   │
//!   ──────────────┼─▶│   net    │──▶│ dispatcher │──▶│ selector  │   │
//!                 │  │ listener │   │            │   │ (per pool │   │
//!                 │  └──────────┘   └─────┬──────┘   │  cursor)  │   │
//!                 │                       │ spawn    └───────────┘   │
//!                 │                       ▼                          │
//!   ◀─────────────┼────────────────  session  ───────────────────────┼──▶ Backend
//!                 │            client⇄backend relays                 │
//!                 └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use tcp_balancer::config::{load_config_with, Overrides};
use tcp_balancer::lifecycle::{prepare, signals, Shutdown};
use tcp_balancer::observability::init_logging;

#[derive(Parser)]
#[command(name = "tcp-balancer")]
#[command(about = "Round-robin TCP load balancer", long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long, env = "BALANCER_CONFIG")]
    config: Option<PathBuf>,

    /// Service class whose pool this listener draws from.
    #[arg(short = 's', long, env = "BALANCER_SERVICE_CLASS")]
    service_class: Option<String>,

    /// Listen address, e.g. 0.0.0.0:8004.
    #[arg(short, long, env = "BALANCER_BIND")]
    bind: Option<String>,

    /// Log level for this crate (ignored when RUST_LOG is set).
    #[arg(long, env = "BALANCER_LOG")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let overrides = Overrides {
        service_class: cli.service_class,
        bind_address: cli.bind,
        log_level: cli.log_level,
    };

    let config = load_config_with(cli.config.as_deref(), &overrides)?;
    init_logging(&config.observability)?;

    tracing::info!("tcp-balancer v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        service_class = %config.service_class,
        max_connections = config.listener.max_connections,
        connect_timeout_secs = config.timeouts.connect_secs,
        "Configuration loaded"
    );

    let prepared = prepare(&config).await.map_err(|e| {
        tracing::error!(error = %e, "Startup failed");
        e
    })?;

    let shutdown = Shutdown::new();
    let accept_shutdown = shutdown.subscribe();
    signals::spawn_signal_handler(shutdown.clone());

    prepared
        .dispatcher
        .run(prepared.listener, accept_shutdown)
        .await;

    tracing::info!("Shutdown complete");
    Ok(())
}
