//! Prints the length of every relayed chunk.

use std::io::{self, Write};
use std::sync::Mutex;

use super::Filter;

/// Name used to select this filter from the command line or config.
pub const NAME: &str = "length-print";

/// Writes one line per chunk: `<<< N` for inbound, `>>> N` for outbound.
pub struct LengthPrintFilter {
    out: Mutex<Box<dyn Write + Send>>,
}

impl LengthPrintFilter {
    /// Print to standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    pub fn new<W: Write + Send + 'static>(out: W) -> Self {
        Self {
            out: Mutex::new(Box::new(out)),
        }
    }

    fn print(&self, marker: &str, len: usize) {
        // A poisoned writer only means another caller panicked mid-line.
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = writeln!(out, "{} {}", marker, len).and_then(|_| out.flush()) {
            tracing::debug!(error = %e, "length-print filter failed to write");
        }
    }
}

impl Filter for LengthPrintFilter {
    fn filter_input(&self, chunk: &[u8]) {
        self.print("<<<", chunk.len());
    }

    fn filter_output(&self, chunk: &[u8]) {
        self.print(">>>", chunk.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn prints_direction_marker_and_length() {
        let sink = SharedSink::default();
        let filter = LengthPrintFilter::new(sink.clone());

        filter.filter_input(b"ping");
        filter.filter_output(&[0u8; 4096]);
        filter.filter_input(b"");

        let printed = String::from_utf8(sink.0.lock().unwrap().clone()).unwrap();
        assert_eq!(printed, "<<< 4\n>>> 4096\n<<< 0\n");
    }
}
