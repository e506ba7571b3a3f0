//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_connections_total` (counter): accepted client connections
//! - `relay_active_connections` (gauge): live connection pipelines
//! - `relay_dial_failures_total` (counter): upstream dials that failed or timed out
//! - `relay_chunks_total` (counter): chunks relayed, by direction
//! - `relay_bytes_total` (counter): bytes relayed, by direction
//! - `relay_write_errors_total` (counter): per-chunk write/flush failures, by direction
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is only installed when enabled in config

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::filter::Direction;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_accepted() {
    metrics::counter!("relay_connections_total").increment(1);
}

pub fn record_active_connections(count: u64) {
    metrics::gauge!("relay_active_connections").set(count as f64);
}

pub fn record_dial_failure() {
    metrics::counter!("relay_dial_failures_total").increment(1);
}

pub fn record_chunk(direction: Direction, len: usize) {
    metrics::counter!("relay_chunks_total", "direction" => direction.as_str()).increment(1);
    metrics::counter!("relay_bytes_total", "direction" => direction.as_str()).increment(len as u64);
}

pub fn record_write_error(direction: Direction) {
    metrics::counter!("relay_write_errors_total", "direction" => direction.as_str()).increment(1);
}
