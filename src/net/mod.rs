//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bind, accept loop)
//!     → connection.rs (connection id, live-pipeline tracking)
//!     → Hand off to relay pipeline
//! ```
//!
//! # Design Decisions
//! - Bind and accept failures are distinct errors; both are fatal to the listener
//! - Each pipeline holds a guard so shutdown can observe when all have ended

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{Accept, Listener, ListenerError};
