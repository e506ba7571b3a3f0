//! Filter capability: read-only observers of relayed chunks.
//!
//! # Data Flow
//! ```text
//! client ──chunk──▶ FilterChain::observe(Inbound)  ──▶ filter_input  (each filter, in order) ──▶ upstream
//! client ◀──chunk── FilterChain::observe(Outbound) ──▶ filter_output (each filter, in order) ◀── upstream
//! ```
//!
//! # Design Decisions
//! - Filters see `&[u8]`; they cannot alter what is forwarded
//! - No error channel: a filter reports failures through its own means
//! - One chain is shared by every connection, so stateful filters
//!   synchronize internally
//! - Calls are synchronous; a slow filter stalls its direction of one pipeline

pub mod buffer_write;
pub mod length_print;

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

pub use buffer_write::BufferWriteFilter;
pub use length_print::LengthPrintFilter;

/// Which way a chunk is travelling through the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Read from the client, headed upstream.
    Inbound,
    /// Read from upstream, headed to the client.
    Outbound,
}

impl Direction {
    /// Short label used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An observer invoked for every chunk relayed in either direction.
///
/// Implementations are shared across all connections and may be called
/// concurrently from different pipelines, though never concurrently for
/// the same direction of the same connection.
pub trait Filter: Send + Sync {
    /// Called with each chunk read from the client, before it is sent upstream.
    fn filter_input(&self, chunk: &[u8]);

    /// Called with each chunk read from upstream, before it is sent to the client.
    fn filter_output(&self, chunk: &[u8]);
}

/// Ordered, immutable list of filters shared by all pipelines.
#[derive(Clone)]
pub struct FilterChain {
    filters: Arc<[Arc<dyn Filter>]>,
}

impl FilterChain {
    pub fn new(filters: Vec<Arc<dyn Filter>>) -> Self {
        Self {
            filters: filters.into(),
        }
    }

    /// Build a chain of stock filters from their names.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, FilterError> {
        let filters = names
            .iter()
            .map(|name| from_name(name.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(filters))
    }

    /// Invoke every filter, in list order, for one chunk.
    pub fn observe(&self, direction: Direction, chunk: &[u8]) {
        for filter in self.filters.iter() {
            match direction {
                Direction::Inbound => filter.filter_input(chunk),
                Direction::Outbound => filter.filter_output(chunk),
            }
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("len", &self.filters.len())
            .finish()
    }
}

/// Error type for filter construction.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("unknown filter '{0}' (available: {available})", available = KNOWN_FILTERS.join(", "))]
    Unknown(String),
}

/// Names accepted by [`from_name`].
pub const KNOWN_FILTERS: &[&str] = &[length_print::NAME];

/// Whether a stock filter answers to `name`.
pub fn is_known(name: &str) -> bool {
    KNOWN_FILTERS.contains(&name)
}

/// Construct a stock filter by name.
pub fn from_name(name: &str) -> Result<Arc<dyn Filter>, FilterError> {
    match name {
        length_print::NAME => Ok(Arc::new(LengthPrintFilter::stdout())),
        other => Err(FilterError::Unknown(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Tagging {
        tag: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Filter for Tagging {
        fn filter_input(&self, chunk: &[u8]) {
            self.log.lock().unwrap().push(format!("{}:in:{}", self.tag, chunk.len()));
        }

        fn filter_output(&self, chunk: &[u8]) {
            self.log.lock().unwrap().push(format!("{}:out:{}", self.tag, chunk.len()));
        }
    }

    #[test]
    fn observe_runs_filters_in_order_per_direction() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let a: Arc<dyn Filter> = Arc::new(Tagging { tag: "a", log: log.clone() });
        let b: Arc<dyn Filter> = Arc::new(Tagging { tag: "b", log: log.clone() });
        let chain = FilterChain::new(vec![a, b]);

        chain.observe(Direction::Inbound, b"ping");
        chain.observe(Direction::Outbound, b"pong!");

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a:in:4", "b:in:4", "a:out:5", "b:out:5"]
        );
    }

    #[test]
    fn empty_chain_is_a_no_op() {
        let chain = FilterChain::default();
        assert!(chain.is_empty());
        chain.observe(Direction::Inbound, b"ignored");
    }

    #[test]
    fn builds_stock_filters_by_name() {
        let chain = FilterChain::from_names(&["length-print"]).unwrap();
        assert_eq!(chain.len(), 1);
        assert!(is_known("length-print"));
    }

    #[test]
    fn unknown_name_lists_alternatives() {
        let err = FilterChain::from_names(&["hexdump"]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown filter 'hexdump' (available: length-print)"
        );
    }

    #[test]
    fn direction_labels() {
        assert_eq!(Direction::Inbound.to_string(), "inbound");
        assert_eq!(Direction::Outbound.as_str(), "outbound");
    }
}
