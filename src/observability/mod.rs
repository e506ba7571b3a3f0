//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! listener, pipelines, filters produce:
//!     → logging.rs (structured log events, spans per connection)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → stderr
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Connection ID flows through every pipeline stage via its span
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
