//! Process execution engine for external tools.
//!
//! An [`ExecutionSession`] collects a tool path and its arguments, renders
//! them under the quoting grammar matching how the tool is launched (a
//! process image receiving an argument vector, or a script re-parsed by the
//! command interpreter), then runs the tool either blocking
//! ([`ExecutionSession::execute_sync`]) or on tokio
//! ([`ExecutionSession::execute_async`]). The async path settles through a
//! [`CompletionStateMachine`] that reconciles process exit with stdio
//! closure.

pub mod completion;
pub mod error;
pub mod options;
pub mod quoting;
pub mod render;
pub mod session;
pub mod sink;
pub mod stream;
pub mod summary;
pub mod tokenizer;

pub use completion::{
    CompletionConfig, CompletionOutcome, CompletionPhase, CompletionPolicy, CompletionSignal,
    CompletionState, CompletionStateMachine, DEFAULT_GRACE_PERIOD, EXIT_DELAY_ENV,
};
pub use error::ExecError;
pub use options::{ExecutionOptions, ExecutionResult, ResolvedOptions};
pub use quoting::{quote_direct, quote_interpreter};
pub use render::{LaunchModel, LaunchPlan, is_script_path};
pub use session::{ArgValue, ExecutionSession};
pub use sink::{BufferSink, NullSink, OutputSink, StderrSink, StdoutSink};
pub use summary::check_for_errors;
pub use tokenizer::tokenize;
