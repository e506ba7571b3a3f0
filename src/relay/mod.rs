//! Relay subsystem.
//!
//! # Data Flow
//! ```text
//! server.rs (accept loop)
//!     → per connection: pipeline.rs
//!         dial upstream (fail → close client, done)
//!         front reader → inbound dispatch (filter_input) → upstream writer
//!         back reader → outbound dispatch (filter_output) → client writer
//!         first reader to end cancels the rest
//! ```
//!
//! # Design Decisions
//! - Byte-agnostic: chunk boundaries are whatever a read returned
//! - No retries: a failed dial abandons that connection only
//! - Write errors drop the chunk and keep the connection

pub mod pipeline;
pub mod server;

pub use pipeline::{DialError, DirectionStats, Pipeline, PipelineOptions, PipelineStats};
pub use server::{RelayError, RelayServer};
