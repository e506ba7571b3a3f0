//! Copies relayed bytes into a pair of writers.

use std::io::Write;
use std::sync::{Mutex, MutexGuard};

use super::Filter;

/// Appends inbound bytes to one writer and outbound bytes to another.
///
/// With `Vec<u8>` sinks this records a transcript of both directions.
/// Since the same filter serves every connection, bytes from concurrent
/// connections land in the same sinks in whatever order they arrive.
pub struct BufferWriteFilter<W> {
    input: Mutex<W>,
    output: Mutex<W>,
}

impl<W: Write + Send> BufferWriteFilter<W> {
    pub fn new(input: W, output: W) -> Self {
        Self {
            input: Mutex::new(input),
            output: Mutex::new(output),
        }
    }

    /// Lock the sink receiving client → upstream bytes.
    pub fn input(&self) -> MutexGuard<'_, W> {
        lock(&self.input)
    }

    /// Lock the sink receiving upstream → client bytes.
    pub fn output(&self) -> MutexGuard<'_, W> {
        lock(&self.output)
    }

    pub fn into_inner(self) -> (W, W) {
        let input = self.input.into_inner().unwrap_or_else(|e| e.into_inner());
        let output = self.output.into_inner().unwrap_or_else(|e| e.into_inner());
        (input, output)
    }

    fn append(sink: &Mutex<W>, chunk: &[u8]) {
        if let Err(e) = lock(sink).write_all(chunk) {
            tracing::debug!(error = %e, "buffer-write filter failed to append");
        }
    }
}

impl BufferWriteFilter<Vec<u8>> {
    /// Record both directions in memory.
    pub fn in_memory() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

fn lock<W>(sink: &Mutex<W>) -> MutexGuard<'_, W> {
    sink.lock().unwrap_or_else(|e| e.into_inner())
}

impl<W: Write + Send> Filter for BufferWriteFilter<W> {
    fn filter_input(&self, chunk: &[u8]) {
        Self::append(&self.input, chunk);
    }

    fn filter_output(&self, chunk: &[u8]) {
        Self::append(&self.output, chunk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separates_directions() {
        let filter = BufferWriteFilter::in_memory();

        filter.filter_input(b"GET ");
        filter.filter_output(b"200");
        filter.filter_input(b"/\r\n");

        assert_eq!(filter.input().as_slice(), b"GET /\r\n");
        assert_eq!(filter.output().as_slice(), b"200");

        let (input, output) = filter.into_inner();
        assert_eq!(input, b"GET /\r\n");
        assert_eq!(output, b"200");
    }
}
