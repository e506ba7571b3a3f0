//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Parse CLI → Load config → Validate → Init logging/metrics → Bind → Accept
//!
//! Shutdown (shutdown.rs):
//!     Ctrl-C → Stop accepting → Cancel every pipeline → Wait for pipelines → Exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - One token tree: each pipeline's token is a child of the shutdown token

pub mod shutdown;

pub use shutdown::Shutdown;
