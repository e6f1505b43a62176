use anyhow::Result;

/// A lightweight sink used to record diagnostic lines emitted while a tool is
/// prepared and executed. Implementations decide where the lines end up: a
/// log file, the tracing pipeline, or an in-memory buffer for tests.
pub trait DiagnosticSink: Send + Sync {
    /// Record a single diagnostic line.
    fn debug(&self, message: &str) -> Result<()>;

    /// Flush any buffered lines to their destination.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// A diagnostic sink that drops every line. Used when the caller does not
/// inject a sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiagnostics;

impl DiagnosticSink for NoopDiagnostics {
    fn debug(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}

/// Forwards diagnostic lines to `tracing` at debug level under the
/// `toolrun::diagnostics` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn debug(&self, message: &str) -> Result<()> {
        tracing::debug!(target: "toolrun::diagnostics", "{message}");
        Ok(())
    }
}
