//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tcp_relay::filter::{Direction, Filter, FilterChain};
use tcp_relay::lifecycle::Shutdown;
use tcp_relay::net::{ConnectionTracker, Listener};
use tcp_relay::relay::{PipelineOptions, RelayError, RelayServer};

/// Generous upper bound for anything that should happen "promptly".
pub const PROMPTLY: Duration = Duration::from_secs(3);

/// Start an upstream that echoes every byte back on every connection.
pub async fn start_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let mut buf = vec![0u8; 8192];
                        loop {
                            match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => {
                                    if socket.write_all(&buf[..n]).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Start an upstream that hands each accepted socket to the test.
pub async fn start_capture_upstream() -> (SocketAddr, mpsc::UnboundedReceiver<TcpStream>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            if tx.send(socket).is_err() {
                break;
            }
        }
    });

    (addr, rx)
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// One filter invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub filter: &'static str,
    pub direction: Direction,
    pub chunk: Vec<u8>,
}

/// Shared, ordered log of observations from any number of filters.
pub type ObservationLog = Arc<Mutex<Vec<Observation>>>;

/// Filter that appends every chunk it sees to a shared log.
pub struct RecordingFilter {
    name: &'static str,
    log: ObservationLog,
}

impl RecordingFilter {
    pub fn new(name: &'static str, log: ObservationLog) -> Arc<dyn Filter> {
        Arc::new(Self { name, log })
    }

    fn record(&self, direction: Direction, chunk: &[u8]) {
        self.log.lock().unwrap().push(Observation {
            filter: self.name,
            direction,
            chunk: chunk.to_vec(),
        });
    }
}

impl Filter for RecordingFilter {
    fn filter_input(&self, chunk: &[u8]) {
        self.record(Direction::Inbound, chunk);
    }

    fn filter_output(&self, chunk: &[u8]) {
        self.record(Direction::Outbound, chunk);
    }
}

pub fn new_log() -> ObservationLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Every observation made in `direction`, in order.
pub fn observed(log: &ObservationLog, direction: Direction) -> Vec<Observation> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|o| o.direction == direction)
        .cloned()
        .collect()
}

/// A relay running on an ephemeral loopback port.
pub struct RunningRelay {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub tracker: ConnectionTracker,
    pub task: JoinHandle<Result<(), RelayError>>,
}

impl RunningRelay {
    pub async fn connect(&self) -> TcpStream {
        TcpStream::connect(self.addr).await.unwrap()
    }

    /// Wait for every pipeline to finish, panicking if it takes too long.
    pub async fn assert_idle(&self) {
        tokio::time::timeout(PROMPTLY, self.tracker.wait_idle())
            .await
            .unwrap_or_else(|_| {
                panic!(
                    "{} pipeline(s) still running",
                    self.tracker.active_count()
                )
            });
    }
}

pub async fn start_relay(options: PipelineOptions, filters: FilterChain) -> RunningRelay {
    let tokio_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = tokio_listener.local_addr().unwrap();
    let listener = Listener::from_tokio(tokio_listener);

    let server = RelayServer::with_options(options, filters);
    let tracker = server.tracker();
    let shutdown = Shutdown::new();

    let task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { server.run(listener, &shutdown).await })
    };

    RunningRelay {
        addr,
        shutdown,
        tracker,
        task,
    }
}

/// Read until EOF or error; returns the bytes received before the stream ended.
pub async fn read_until_closed(stream: &mut TcpStream) -> Vec<u8> {
    let mut received = Vec::new();
    let mut buf = [0u8; 1024];
    tokio::time::timeout(PROMPTLY, async {
        loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => received.extend_from_slice(&buf[..n]),
            }
        }
    })
    .await
    .expect("stream was not closed");
    received
}
