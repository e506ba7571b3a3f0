//! TCP listener for client connections.
//!
//! # Responsibilities
//! - Bind to the configured host and port
//! - Accept incoming TCP connections
//! - Report bind and accept failures as distinct errors

use std::future::Future;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(#[source] std::io::Error),
}

/// Source of client connections for the accept loop.
pub trait Accept: Send + Sync {
    fn accept(&self) -> impl Future<Output = Result<(TcpStream, SocketAddr), ListenerError>> + Send;

    fn local_addr(&self) -> Result<SocketAddr, std::io::Error>;
}

/// The socket client connections arrive on.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Bind to the configured address.
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let address = config.bind_address();
        let bind_error = |source| ListenerError::Bind {
            address: address.clone(),
            source,
        };

        let listener = TcpListener::bind(&address).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self { inner: listener })
    }

    /// Wrap an already bound Tokio listener.
    pub fn from_tokio(inner: TcpListener) -> Self {
        Self { inner }
    }

    /// Accept the next client connection.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(peer_addr = %addr, "Connection accepted");

        Ok((stream, addr))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }
}

impl Accept for Listener {
    fn accept(&self) -> impl Future<Output = Result<(TcpStream, SocketAddr), ListenerError>> + Send {
        Listener::accept(self)
    }

    fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        Listener::local_addr(self)
    }
}
