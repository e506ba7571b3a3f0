//! Listener/dispatcher: one independent pipeline per accepted connection.
//!
//! # Responsibilities
//! - Accept client connections until an accept error or shutdown
//! - Spawn a pipeline per connection, never waiting on it
//! - Log and count upstream dial failures
//! - Track live pipelines for graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpStream;
use tracing::Instrument;

use crate::config::{ListenerConfig, RelayConfig};
use crate::filter::FilterChain;
use crate::lifecycle::Shutdown;
use crate::net::{Accept, ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::relay::pipeline::{Pipeline, PipelineOptions};

/// Fatal relay errors; per-connection failures never surface here.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// The relay: an upstream address and filter chain shared by every connection.
pub struct RelayServer {
    listener: ListenerConfig,
    options: Arc<PipelineOptions>,
    filters: FilterChain,
    tracker: ConnectionTracker,
}

impl RelayServer {
    /// Create a relay from a validated configuration.
    pub fn new(config: &RelayConfig, filters: FilterChain) -> Self {
        Self::with_options(PipelineOptions::from_config(config), filters)
            .with_listener(config.listener.clone())
    }

    /// A relay with the default listener address; use `run` to supply a
    /// listener of your own.
    pub fn with_options(options: PipelineOptions, filters: FilterChain) -> Self {
        Self {
            listener: ListenerConfig::default(),
            options: Arc::new(options),
            filters,
            tracker: ConnectionTracker::new(),
        }
    }

    /// Address `serve` binds.
    pub fn with_listener(mut self, listener: ListenerConfig) -> Self {
        self.listener = listener;
        self
    }

    /// Handle on the count of live pipelines.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Bind the configured port, then accept until shutdown or an accept error.
    pub async fn serve(&self, shutdown: &Shutdown) -> Result<(), RelayError> {
        let listener = Listener::bind(&self.listener).await?;
        self.run(listener, shutdown).await
    }

    /// Accept connections on `listener`, spawning a pipeline for each.
    ///
    /// An accept error stops the loop and is returned; pipelines already
    /// running are left alone. Triggering `shutdown` stops the loop with
    /// `Ok(())` and cancels every pipeline.
    pub async fn run<L: Accept>(&self, listener: L, shutdown: &Shutdown) -> Result<(), RelayError> {
        let token = shutdown.token();

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(
                address = %addr,
                upstream = %self.options.upstream,
                filters = self.filters.len(),
                "Relay accepting connections"
            );
        }

        loop {
            let accepted = tokio::select! {
                _ = token.cancelled() => {
                    tracing::info!(
                        active_connections = self.tracker.active_count(),
                        "Shutdown requested, no longer accepting"
                    );
                    return Ok(());
                }
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => self.dispatch(stream, peer, shutdown),
                Err(e) => {
                    tracing::error!(error = %e, "Accept failed, listener stopping");
                    return Err(e.into());
                }
            }
        }
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr, shutdown: &Shutdown) {
        metrics::record_connection_accepted();

        let guard = self.tracker.track();
        let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);
        let pipeline = Pipeline::new(Arc::clone(&self.options), self.filters.clone())
            .with_token(&shutdown.token());

        tokio::spawn(
            async move {
                let _guard = guard;
                match pipeline.run(stream).await {
                    Ok(stats) => tracing::debug!(
                        inbound_bytes = stats.inbound.bytes,
                        inbound_chunks = stats.inbound.chunks,
                        outbound_bytes = stats.outbound.bytes,
                        outbound_chunks = stats.outbound.chunks,
                        "Connection finished"
                    ),
                    Err(e) => {
                        metrics::record_dial_failure();
                        tracing::warn!(error = %e, "Upstream dial failed, client closed");
                    }
                }
            }
            .instrument(span),
        );
    }
}
