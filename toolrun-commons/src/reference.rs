//! Reference implementations of the shared traits, mainly for tests and
//! embedders that want to inspect what the engine reported.

use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;

use crate::diagnostics::DiagnosticSink;

/// Collects diagnostic lines in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemoryDiagnostics {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line recorded so far, in arrival order.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// True when any recorded line contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|line| line.contains(needle))
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl DiagnosticSink for MemoryDiagnostics {
    fn debug(&self, message: &str) -> Result<()> {
        self.lines.lock().push(message.to_string());
        Ok(())
    }
}
