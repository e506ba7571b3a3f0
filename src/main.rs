//! TCP relay (v1)
//!
//! Listens on a local port and relays every connection to a fixed upstream
//! address, letting filters observe each chunk on the way through.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌───────────────────────────────────────────────────────┐
//!                         │                       TCP RELAY                        │
//!                         │                                                        │
//!     Client ─────────────┼─▶ net::listener ──▶ relay::server ──spawn──┐           │
//!                         │                                            ▼           │
//!                         │          ┌──────────────── relay::pipeline ───────┐    │
//!                         │          │ read ─▶ filter_input  ─▶ write upstream│────┼──▶ Upstream
//!     Client ◀────────────┼──────────│ write ◀─ filter_output ◀─ read         │◀───┼─── Upstream
//!                         │          └─────────────────────────────────────────┘   │
//!                         │                                                        │
//!                         │   config · filter · lifecycle · observability          │
//!                         └───────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use tcp_relay::config::{read_config, validate_config, ConfigError, RelayConfig};
use tcp_relay::filter::FilterChain;
use tcp_relay::lifecycle::Shutdown;
use tcp_relay::net::Listener;
use tcp_relay::observability::{logging, metrics};
use tcp_relay::relay::RelayServer;

/// How long live connections get to finish after Ctrl-C.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "tcp-relay")]
#[command(about = "Relay TCP connections to an upstream address, passing every chunk through filters", long_about = None)]
struct Cli {
    /// Port to listen on
    port: Option<u16>,

    /// Upstream address (host:port)
    upstream: Option<String>,

    /// TOML config file; command-line values take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface to bind
    #[arg(long)]
    host: Option<String>,

    /// Filter to install (repeatable, applied in order)
    #[arg(short, long = "filter")]
    filters: Vec<String>,

    /// Maximum bytes per read
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Upstream dial timeout in milliseconds (0 disables)
    #[arg(long)]
    connect_timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_address: Option<SocketAddr>,
}

impl Cli {
    fn into_config(self) -> Result<RelayConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => read_config(path)?,
            None => RelayConfig::default(),
        };

        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(upstream) = self.upstream {
            config.upstream.address = upstream;
        }
        if let Some(host) = self.host {
            config.listener.host = host;
        }
        if !self.filters.is_empty() {
            config.relay.filters = self.filters;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.relay.chunk_size = chunk_size;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            config.upstream.connect_timeout_ms = timeout;
        }
        if let Some(level) = self.log_level {
            config.observability.log_level = level;
        }
        if let Some(addr) = self.metrics_address {
            config.observability.metrics_enabled = true;
            config.observability.metrics_address = addr.to_string();
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Cli::parse().into_config()?;

    logging::init(&config.observability.log_level);

    tracing::info!("tcp-relay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        port = config.listener.port,
        upstream = %config.upstream.address,
        chunk_size = config.relay.chunk_size,
        filters = ?config.relay.filters,
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

    let filters = FilterChain::from_names(&config.relay.filters)?;
    let listener = Listener::bind(&config.listener).await?;

    let shutdown = Shutdown::new();
    shutdown.trigger_on_ctrl_c();

    let server = RelayServer::new(&config, filters);
    let result = server.run(listener, &shutdown).await;

    // Shutdown cancels every pipeline; give them a moment to close their sockets.
    if shutdown.is_triggered() {
        let tracker = server.tracker();
        if tokio::time::timeout(DRAIN_TIMEOUT, tracker.wait_idle()).await.is_err() {
            tracing::warn!(
                active_connections = tracker.active_count(),
                "Connections still open after drain timeout"
            );
        }
    }

    result?;
    tracing::info!("Shutdown complete");
    Ok(())
}
