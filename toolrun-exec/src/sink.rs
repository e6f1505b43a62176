//! Write destinations for captured process output.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Destination for stdout/stderr chunks forwarded while a tool runs.
///
/// Chunks from one stream arrive in the order the process produced them.
/// Sinks are shared between the reader tasks and the caller, hence `&self`.
pub trait OutputSink: Send + Sync {
    fn write_chunk(&self, bytes: &[u8]) -> io::Result<()>;
}

/// Forwards to the current process's stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write_chunk(&self, bytes: &[u8]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(bytes)?;
        out.flush()
    }
}

/// Forwards to the current process's stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl OutputSink for StderrSink {
    fn write_chunk(&self, bytes: &[u8]) -> io::Result<()> {
        let mut err = io::stderr().lock();
        err.write_all(bytes)?;
        err.flush()
    }
}

/// In-memory sink. Clones share the same buffer, so a caller can keep one
/// clone and hand the other to [`ExecutionOptions`](crate::ExecutionOptions).
#[derive(Debug, Default, Clone)]
pub struct BufferSink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.buffer.lock().clone()
    }

    /// Buffer contents decoded lossily as UTF-8.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

impl OutputSink for BufferSink {
    fn write_chunk(&self, bytes: &[u8]) -> io::Result<()> {
        self.buffer.lock().extend_from_slice(bytes);
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl OutputSink for NullSink {
    fn write_chunk(&self, _bytes: &[u8]) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_sink_accumulates_in_order() -> io::Result<()> {
        let sink = BufferSink::new();
        let handle = sink.clone();
        sink.write_chunk(b"hello ")?;
        sink.write_chunk(b"world")?;

        assert_eq!(handle.contents(), "hello world");
        assert_eq!(handle.bytes(), b"hello world".to_vec());
        assert!(!handle.is_empty());
        Ok(())
    }
}
