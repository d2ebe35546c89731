//! OGC interceptor.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                     OWS INTERCEPTOR                      │
//!                 │                                                          │
//!   Client ──────▶│  http ──▶ resolver ──▶ rules ──▶ dispatch ──▶ upstream ──┼──▶ GeoServer
//!                 │  server   (KVP/XML)    (find     (MODIFY      (hyper     │
//!                 │                        rule)     handlers)    client)    │
//!   Client ◀──────┼── http ◀── dispatch ◀── rules ◀───────────────── upstream ◀┼─── GeoServer
//!                 │                                                          │
//!                 │  admin API (/interceptorrules) ──▶ rules ──▶ store       │
//!                 │  config (TOML, hot reload) · observability · lifecycle   │
//!                 └──────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use ows_interceptor::config::{load_config, ConfigWatcher, InterceptorConfig};
use ows_interceptor::lifecycle::{bootstrap, signals, Shutdown};
use ows_interceptor::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "ows-interceptor")]
#[command(about = "Rule-driven interceptor in front of an OGC web service backend", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => InterceptorConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ows-interceptor starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        default_ows_url = ?config.upstream.default_ows_url,
        namespace_bound_url = config.upstream.namespace_bound_url,
        request_timeout_secs = config.timeouts.request_secs,
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

    // The watcher must stay alive for hot reload to keep working.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, config.clone());
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let boot = bootstrap(config)?;

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    boot.server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
