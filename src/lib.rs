//! Transparent TCP relay with pluggable read-only filters.

pub mod config;
pub mod filter;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod relay;

pub use config::RelayConfig;
pub use filter::{Direction, Filter, FilterChain};
pub use lifecycle::Shutdown;
pub use relay::{Pipeline, PipelineOptions, RelayError, RelayServer};
