//! Shared traits and helper types reused across the toolrun crates. The
//! engine only depends on these contracts, so callers can wire diagnostic
//! output into their own logging or test harnesses without pulling in the
//! CLI.

pub mod diagnostics;
pub mod reference;

pub use diagnostics::{DiagnosticSink, NoopDiagnostics, TracingDiagnostics};
pub use reference::MemoryDiagnostics;
