//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (port, chunk size)
//! - Check the upstream address has a `host:port` shape
//! - Reject filter names no stock filter answers to
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::RelayConfig;
use crate::filter;

/// Largest accepted `relay.chunk_size` (1 MiB).
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.port must be between 1 and 65535")]
    InvalidPort,
    #[error("upstream.address is required")]
    MissingUpstream,
    #[error("upstream.address '{0}' is not in host:port form")]
    MalformedUpstream(String),
    #[error("relay.chunk_size must be between 1 and {max}, got {got}", max = MAX_CHUNK_SIZE)]
    ChunkSize { got: usize },
    #[error("unknown filter '{0}'")]
    UnknownFilter(String),
}

/// Check a configuration, collecting every violation.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.port == 0 {
        errors.push(ValidationError::InvalidPort);
    }

    let address = config.upstream.address.trim();
    if address.is_empty() {
        errors.push(ValidationError::MissingUpstream);
    } else if !has_host_and_port(address) {
        errors.push(ValidationError::MalformedUpstream(address.to_string()));
    }

    let chunk_size = config.relay.chunk_size;
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        errors.push(ValidationError::ChunkSize { got: chunk_size });
    }

    for name in &config.relay.filters {
        if !filter::is_known(name) {
            errors.push(ValidationError::UnknownFilter(name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn has_host_and_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().map_or(false, |p| p > 0),
        None => false,
    }
}
