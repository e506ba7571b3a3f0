//! Per-connection relay pipeline.
//!
//! # Stages
//! ```text
//!            ┌──────────────┐ inbound ┌──────────────────┐ resend  ┌─────────────────┐
//! client ──▶ │ front reader │ ──────▶ │ inbound dispatch │ ──────▶ │ upstream writer │ ──▶ upstream
//!            └──────────────┘         └──────────────────┘         └─────────────────┘
//!            ┌──────────────┐ backward┌──────────────────┐ outbound┌─────────────────┐
//! upstream ─▶│ back reader  │ ──────▶ │ outbound dispatch│ ──────▶ │  client writer  │ ──▶ client
//!            └──────────────┘         └──────────────────┘         └─────────────────┘
//! ```
//!
//! Each arrow is a capacity-1 channel with one sender and one receiver, so a
//! slow writer stalls its dispatcher, which stalls its reader.
//!
//! # Teardown
//! The first reader to see EOF or an error cancels the connection token and
//! drops its sender. Cancellation stops the other reader and unblocks any
//! write or handoff that is stuck; dropped senders close each channel in turn,
//! so every consumer sees its input end. Once all six stages have returned,
//! both sockets have been dropped.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::schema::{RelayConfig, DEFAULT_CHUNK_SIZE};
use crate::filter::{Direction, FilterChain};
use crate::observability::metrics;

/// How long a writer waits for its stream to shut down once its input ends.
const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Capacity of every handoff channel.
const HANDOFF_CAPACITY: usize = 1;

/// Settings shared, read-only, by every pipeline a server spawns.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Upstream address in `host:port` form.
    pub upstream: String,
    /// Maximum bytes per read.
    pub chunk_size: usize,
    /// Dial deadline; `None` waits for the OS.
    pub connect_timeout: Option<Duration>,
}

impl PipelineOptions {
    pub fn new(upstream: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout: None,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        let timeout_ms = config.upstream.connect_timeout_ms;
        Self {
            upstream: config.upstream.address.clone(),
            chunk_size: config.relay.chunk_size.max(1),
            connect_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

/// Why a pipeline never started relaying.
#[derive(Debug, Error)]
pub enum DialError {
    #[error("failed to connect to upstream {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("timed out connecting to upstream {address} after {timeout:?}")]
    Timeout { address: String, timeout: Duration },
    #[error("cancelled while connecting to upstream {address}")]
    Cancelled { address: String },
}

/// Traffic relayed in one direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionStats {
    pub chunks: u64,
    pub bytes: u64,
}

/// Summary returned once a pipeline has fully torn down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Client → upstream.
    pub inbound: DirectionStats,
    /// Upstream → client.
    pub outbound: DirectionStats,
}

/// Relays one client connection to the upstream address.
pub struct Pipeline {
    options: Arc<PipelineOptions>,
    filters: FilterChain,
    token: CancellationToken,
}

impl Pipeline {
    pub fn new(options: Arc<PipelineOptions>, filters: FilterChain) -> Self {
        Self {
            options,
            filters,
            token: CancellationToken::new(),
        }
    }

    /// Tie this pipeline's lifetime to an outer token (e.g. server shutdown).
    ///
    /// The pipeline runs under a child of `parent`: cancelling `parent`
    /// tears the pipeline down, while the pipeline ending never cancels
    /// `parent`.
    pub fn with_token(mut self, parent: &CancellationToken) -> Self {
        self.token = parent.child_token();
        self
    }

    /// Dial upstream, then relay until either side ends.
    ///
    /// On dial failure the client stream is dropped (closed) and no stage
    /// is started. Otherwise this returns only after all six stages have
    /// ended and both streams are closed.
    pub async fn run(self, client: TcpStream) -> Result<PipelineStats, DialError> {
        let upstream = match self.dial().await {
            Ok(stream) => stream,
            Err(e) => {
                drop(client);
                return Err(e);
            }
        };

        let _ = client.set_nodelay(true);
        let _ = upstream.set_nodelay(true);

        tracing::debug!(upstream = %self.options.upstream, "Upstream connected");

        Ok(self.relay(client, upstream).await)
    }

    async fn dial(&self) -> Result<TcpStream, DialError> {
        let address = self.options.upstream.clone();
        let connect = TcpStream::connect(address.as_str());

        let attempt = async {
            match self.options.connect_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, connect).await {
                    Ok(result) => result.map_err(|source| DialError::Connect {
                        address: address.clone(),
                        source,
                    }),
                    Err(_) => Err(DialError::Timeout {
                        address: address.clone(),
                        timeout,
                    }),
                },
                None => connect.await.map_err(|source| DialError::Connect {
                    address: address.clone(),
                    source,
                }),
            }
        };

        // An already cancelled pipeline never dials.
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(DialError::Cancelled { address: address.clone() }),
            result = attempt => result,
        }
    }

    /// Run the six stages over an already connected pair of streams.
    ///
    /// Generic over the stream types so the relay can sit on anything
    /// byte-oriented; `run` uses it with two TCP streams.
    pub async fn relay<C, U>(self, client: C, upstream: U) -> PipelineStats
    where
        C: AsyncRead + AsyncWrite + Send + 'static,
        U: AsyncRead + AsyncWrite + Send + 'static,
    {
        let Pipeline {
            options,
            filters,
            token,
        } = self;
        let chunk_size = options.chunk_size;
        let span = tracing::Span::current();

        let (client_read, client_write) = tokio::io::split(client);
        let (upstream_read, upstream_write) = tokio::io::split(upstream);

        let (inbound_tx, inbound_rx) = mpsc::channel(HANDOFF_CAPACITY);
        let (resend_tx, resend_rx) = mpsc::channel(HANDOFF_CAPACITY);
        let (backward_tx, backward_rx) = mpsc::channel(HANDOFF_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(HANDOFF_CAPACITY);

        let front_reader = spawn_stage(
            &span,
            read_stage(client_read, inbound_tx, chunk_size, Direction::Inbound, token.clone()),
        );
        let back_reader = spawn_stage(
            &span,
            read_stage(upstream_read, backward_tx, chunk_size, Direction::Outbound, token.clone()),
        );
        let inbound_dispatcher = spawn_stage(
            &span,
            dispatch_stage(inbound_rx, resend_tx, filters.clone(), Direction::Inbound, token.clone()),
        );
        let outbound_dispatcher = spawn_stage(
            &span,
            dispatch_stage(backward_rx, outbound_tx, filters, Direction::Outbound, token.clone()),
        );
        let upstream_writer = spawn_stage(
            &span,
            write_stage(upstream_write, resend_rx, Direction::Inbound, token.clone()),
        );
        let client_writer = spawn_stage(
            &span,
            write_stage(client_write, outbound_rx, Direction::Outbound, token),
        );

        let (inbound, outbound, ..) = tokio::join!(
            join_stage("front reader", front_reader),
            join_stage("back reader", back_reader),
            join_stage("inbound dispatcher", inbound_dispatcher),
            join_stage("outbound dispatcher", outbound_dispatcher),
            join_stage("upstream writer", upstream_writer),
            join_stage("client writer", client_writer),
        );

        let stats = PipelineStats {
            inbound: inbound.unwrap_or_default(),
            outbound: outbound.unwrap_or_default(),
        };

        tracing::debug!(
            inbound_bytes = stats.inbound.bytes,
            outbound_bytes = stats.outbound.bytes,
            "Pipeline torn down"
        );

        stats
    }
}

fn spawn_stage<F>(span: &tracing::Span, stage: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(stage.instrument(span.clone()))
}

async fn join_stage<T>(name: &'static str, handle: JoinHandle<T>) -> Option<T> {
    match handle.await {
        Ok(output) => Some(output),
        Err(e) => {
            tracing::error!(stage = name, error = %e, "Pipeline stage panicked");
            None
        }
    }
}

/// Read chunks from one stream and hand them to the dispatcher.
///
/// Ends on EOF, read error, cancellation, or a closed handoff. Whatever the
/// cause, the connection token is cancelled on the way out.
async fn read_stage<R>(
    mut reader: R,
    tx: mpsc::Sender<Bytes>,
    chunk_size: usize,
    direction: Direction,
    token: CancellationToken,
) -> DirectionStats
where
    R: AsyncRead + Unpin,
{
    let mut stats = DirectionStats::default();
    let mut buf = vec![0u8; chunk_size];

    loop {
        let read = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            read = reader.read(&mut buf) => read,
        };

        let n = match read {
            Ok(0) => {
                tracing::debug!(%direction, "Stream closed by peer");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(%direction, error = %e, "Read failed");
                break;
            }
        };

        // Fresh allocation per chunk; `buf` is reused for the next read.
        let chunk = Bytes::copy_from_slice(&buf[..n]);
        stats.chunks += 1;
        stats.bytes += n as u64;
        metrics::record_chunk(direction, n);

        let handed_off = tokio::select! {
            biased;
            sent = tx.send(chunk) => sent.is_ok(),
            _ = token.cancelled() => false,
        };
        if !handed_off {
            break;
        }
    }

    token.cancel();
    stats
}

/// Pass every chunk through the filters, then on to the writer.
///
/// Filters see a chunk before its handoff is attempted. If the connection is
/// cancelled while the writer is not taking chunks, the held chunk and
/// anything still queued behind it are dropped: observed, never written.
async fn dispatch_stage(
    mut rx: mpsc::Receiver<Bytes>,
    tx: mpsc::Sender<Bytes>,
    filters: FilterChain,
    direction: Direction,
    token: CancellationToken,
) {
    while let Some(chunk) = rx.recv().await {
        filters.observe(direction, &chunk);

        let handed_off = tokio::select! {
            biased;
            sent = tx.send(chunk) => sent.is_ok(),
            _ = token.cancelled() => false,
        };
        if !handed_off {
            break;
        }
    }
}

/// Write every chunk to the stream, tolerating per-chunk failures.
async fn write_stage<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<Bytes>,
    direction: Direction,
    token: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = rx.recv().await {
        let written = tokio::select! {
            biased;
            written = write_chunk(&mut writer, &chunk) => written,
            _ = token.cancelled() => break,
        };

        if let Err(e) = written {
            tracing::debug!(%direction, error = %e, len = chunk.len(), "Write failed; dropping chunk");
            metrics::record_write_error(direction);
        }
    }

    // The peer may never acknowledge the close; give up after a grace period.
    if tokio::time::timeout(WRITER_SHUTDOWN_GRACE, writer.shutdown())
        .await
        .is_err()
    {
        tracing::debug!(%direction, "Write half shutdown timed out");
    }
}

async fn write_chunk<W>(writer: &mut W, chunk: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(chunk).await?;
    writer.flush().await
}
