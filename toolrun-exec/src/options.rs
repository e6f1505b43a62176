use std::collections::HashMap;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::completion::{CompletionPolicy, CompletionState, DEFAULT_GRACE_PERIOD, classify};
use crate::error::ExecError;
use crate::sink::{OutputSink, StderrSink, StdoutSink};

/// Options for a single execution. Unset fields are filled in when the
/// execution starts, see [`ExecutionOptions::resolve`].
#[derive(Clone, Default)]
pub struct ExecutionOptions {
    /// Working directory (if None, the current directory at start).
    pub working_directory: Option<PathBuf>,
    /// Environment variables (if None, a snapshot of the ambient environment).
    pub environment: Option<HashMap<OsString, OsString>>,
    /// Suppress the echoed command line and output forwarding.
    pub silent: bool,
    /// Fail the execution when anything is written to stderr.
    pub fail_on_stderr: bool,
    /// Leave non-zero exit codes to the caller.
    pub ignore_return_code: bool,
    /// Hand arguments to the launcher without quoting them.
    pub verbatim_arguments: bool,
    /// Destination for stdout (defaults to this process's stdout).
    pub output_sink: Option<Arc<dyn OutputSink>>,
    /// Destination for stderr (defaults to this process's stderr).
    pub error_sink: Option<Arc<dyn OutputSink>>,
    /// How long to wait for stdio to close after the process exited.
    pub grace_period: Option<Duration>,
}

impl fmt::Debug for ExecutionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionOptions")
            .field("working_directory", &self.working_directory)
            .field("environment", &self.environment.as_ref().map(HashMap::len))
            .field("silent", &self.silent)
            .field("fail_on_stderr", &self.fail_on_stderr)
            .field("ignore_return_code", &self.ignore_return_code)
            .field("verbatim_arguments", &self.verbatim_arguments)
            .field("grace_period", &self.grace_period)
            .finish_non_exhaustive()
    }
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = Some(dir.into());
        self
    }

    pub fn environment<I, K, V>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.environment = Some(
            env.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        );
        self
    }

    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn fail_on_stderr(mut self, fail: bool) -> Self {
        self.fail_on_stderr = fail;
        self
    }

    pub fn ignore_return_code(mut self, ignore: bool) -> Self {
        self.ignore_return_code = ignore;
        self
    }

    pub fn verbatim_arguments(mut self, verbatim: bool) -> Self {
        self.verbatim_arguments = verbatim;
        self
    }

    pub fn output_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.output_sink = Some(sink);
        self
    }

    pub fn error_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.error_sink = Some(sink);
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = Some(grace);
        self
    }

    /// Capture the concrete values used for one execution.
    ///
    /// The ambient environment and working directory are read here, once, so
    /// later changes to the caller's process state do not leak into a running
    /// execution. Variables are kept as OS strings; names or values that are
    /// not valid UTF-8 pass through to the child unchanged.
    pub fn resolve(&self) -> ResolvedOptions {
        let working_directory = self
            .working_directory
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let environment = self
            .environment
            .clone()
            .unwrap_or_else(|| std::env::vars_os().collect());

        ResolvedOptions {
            working_directory,
            environment: Arc::new(environment),
            silent: self.silent,
            fail_on_stderr: self.fail_on_stderr,
            ignore_return_code: self.ignore_return_code,
            verbatim_arguments: self.verbatim_arguments,
            output_sink: self
                .output_sink
                .clone()
                .unwrap_or_else(|| Arc::new(StdoutSink)),
            error_sink: self
                .error_sink
                .clone()
                .unwrap_or_else(|| Arc::new(StderrSink)),
            grace_period: self.grace_period.unwrap_or(DEFAULT_GRACE_PERIOD),
        }
    }
}

/// Immutable snapshot of [`ExecutionOptions`] taken when an execution starts.
#[derive(Clone)]
pub struct ResolvedOptions {
    pub working_directory: PathBuf,
    pub environment: Arc<HashMap<OsString, OsString>>,
    pub silent: bool,
    pub fail_on_stderr: bool,
    pub ignore_return_code: bool,
    pub verbatim_arguments: bool,
    pub output_sink: Arc<dyn OutputSink>,
    pub error_sink: Arc<dyn OutputSink>,
    pub grace_period: Duration,
}

impl fmt::Debug for ResolvedOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedOptions")
            .field("working_directory", &self.working_directory)
            .field("environment", &self.environment.len())
            .field("silent", &self.silent)
            .field("fail_on_stderr", &self.fail_on_stderr)
            .field("ignore_return_code", &self.ignore_return_code)
            .field("verbatim_arguments", &self.verbatim_arguments)
            .field("grace_period", &self.grace_period)
            .finish_non_exhaustive()
    }
}

/// Outcome of a blocking execution.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde-errors", derive(serde::Serialize))]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Exit code reported by the OS, `-1` when there was none.
    pub exit_code: i32,
    /// Set only when the OS could not start the process.
    pub error: Option<ExecError>,
}

impl ExecutionResult {
    /// True when the process started and exited with code 0.
    pub fn success(&self) -> bool {
        self.error.is_none() && self.exit_code == 0
    }

    /// Judge this result the way the async path would: spawn failure, then a
    /// non-zero exit unless ignored, then stderr output when that counts as
    /// failure.
    pub fn failure(&self, tool: &str, policy: CompletionPolicy) -> Option<ExecError> {
        if let Some(err) = &self.error {
            return Some(err.clone());
        }
        let state = CompletionState {
            has_exited: true,
            stdio_closed: true,
            stderr_was_written: !self.stderr.is_empty(),
            exit_code: self.exit_code,
            spawn_error: None,
            done: true,
        };
        classify(tool, &state, policy)
    }
}
