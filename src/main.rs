//! proxyline server.
//!
//! Serves the origin-report router on every configured listener. Listeners
//! with PROXY protocol enabled require a v1 header on each connection.
//!
//! # Architecture Overview
//!
//! ```text
//!     Load balancer / client
//!     ──────────────────────┐
//!                           ▼
//!  ┌─────────┐    ┌──────────────┐    ┌──────────────┐    ┌─────────────┐
//!  │   net   │───▶│    proxy     │───▶│     net      │───▶│    http     │
//!  │listener │    │   sniffer    │    │ConnectionOri-│    │ HttpServer  │
//!  │(policy) │    │(PROXY v1 hdr)│    │gin (once)    │    │ + Router    │
//!  └─────────┘    └──────────────┘    └──────────────┘    └─────────────┘
//!        │                │
//!        │          rejected: close,
//!        │          no response
//!        ▼
//!  ┌──────────────────────────────────────────────────────────────┐
//!  │ config · lifecycle (startup/shutdown/signals) · observability │
//!  └──────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use proxyline::config::validation::validate_config;
use proxyline::config::{load_config, ConfigError, ListenerConfig, ServerConfig};
use proxyline::http::HttpServer;
use proxyline::lifecycle::{wait_for_signal, Server, Shutdown};
use proxyline::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "proxyline")]
#[command(about = "HTTP server with PROXY protocol v1 detection", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, e.g. `0.0.0.0:8080` or `:8443|P` to require a PROXY
    /// header. Repeatable; replaces the listeners from the config file.
    #[arg(short, long)]
    listen: Vec<String>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if !cli.listen.is_empty() {
        config.listeners = cli
            .listen
            .iter()
            .map(|address| ListenerConfig {
                bind_address: address.clone(),
                ..ListenerConfig::default()
            })
            .collect();
    }
    if let Some(level) = cli.log_level {
        config.observability.log_level = level;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability)?;

    tracing::info!(
        listeners = config.listeners.len(),
        header_timeout_ms = config.proxy_protocol.header_timeout_ms,
        "proxyline v0.1.0 starting"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let server = Server::bind(&config).await?;
    tracing::info!(addresses = ?server.local_addrs(), "Listening for connections");

    let shutdown = Shutdown::new();
    let handler = Arc::new(HttpServer::origin_report());
    let serving = tokio::spawn(server.serve(handler, shutdown.subscribe()));

    wait_for_signal(&shutdown).await;
    serving.await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
