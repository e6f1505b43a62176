//! Completion tracking for asynchronous executions.
//!
//! A child process reports two independent facts: it exited, and its stdio
//! streams reached EOF. They arrive in either order. When a child hands its
//! stdio handles to a grandchild the streams may stay open long after the
//! exit, so once the exit is known a bounded grace timer is armed and the
//! execution is finalized when it fires, whether or not stdio closed.
//!
//! Signals are delivered over an mpsc channel and [`CompletionStateMachine::run`]
//! consumes the machine, so exactly one [`CompletionOutcome`] is produced per
//! execution.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use toolrun_commons::{DiagnosticSink, NoopDiagnostics};
use tracing::{debug, warn};

use crate::error::ExecError;

/// Default wait for stdio to close after the process exited.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(10_000);

/// Test-only override for the grace period, in milliseconds.
pub const EXIT_DELAY_ENV: &str = "TOOLRUN_TEST_EXIT_DELAY_MS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionConfig {
    pub grace_period: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

impl CompletionConfig {
    pub fn with_grace_period(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    /// Read [`EXIT_DELAY_ENV`]. Absent or malformed values yield `None`.
    pub fn grace_override_from_env() -> Option<Duration> {
        parse_grace_override(std::env::var(EXIT_DELAY_ENV).ok().as_deref())
    }

    /// Default configuration with [`EXIT_DELAY_ENV`] applied when set.
    pub fn from_env() -> Self {
        Self::grace_override_from_env()
            .map(Self::with_grace_period)
            .unwrap_or_default()
    }
}

fn parse_grace_override(value: Option<&str>) -> Option<Duration> {
    value
        .map(str::trim)
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_millis)
}

/// Which execution outcomes count as failures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompletionPolicy {
    pub ignore_return_code: bool,
    pub fail_on_stderr: bool,
}

/// Events observed while a process runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionSignal {
    /// The process exited, or could not be started at all.
    ProcessExited {
        code: i32,
        spawn_error: Option<String>,
    },
    /// Both stdout and stderr reached EOF.
    StdioClosed,
    /// The process wrote at least one byte to stderr.
    StderrWritten,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPhase {
    Running,
    Finalized,
}

/// Flags accumulated for one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionState {
    pub has_exited: bool,
    pub stdio_closed: bool,
    pub stderr_was_written: bool,
    pub exit_code: i32,
    pub spawn_error: Option<String>,
    pub done: bool,
}

/// Terminal result of an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionOutcome {
    pub exit_code: i32,
    pub error: Option<ExecError>,
    /// Finalized by the grace timer while stdio was still open.
    pub forced: bool,
}

impl CompletionOutcome {
    pub fn into_result(self) -> Result<i32, ExecError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.exit_code),
        }
    }
}

/// Decide the error for a finished execution.
///
/// Precedence: spawn failure, then a non-zero exit code (unless ignored),
/// then stderr output (when `fail_on_stderr` is set).
pub fn classify(tool: &str, state: &CompletionState, policy: CompletionPolicy) -> Option<ExecError> {
    if let Some(message) = &state.spawn_error {
        return Some(ExecError::Spawn {
            tool: tool.to_string(),
            message: message.clone(),
        });
    }
    if state.exit_code != 0 && !policy.ignore_return_code {
        return Some(ExecError::NonZeroExit {
            tool: tool.to_string(),
            code: state.exit_code,
        });
    }
    if state.stderr_was_written && policy.fail_on_stderr {
        return Some(ExecError::StdErr {
            tool: tool.to_string(),
        });
    }
    None
}

pub struct CompletionStateMachine {
    tool: String,
    policy: CompletionPolicy,
    config: CompletionConfig,
    state: CompletionState,
    grace_deadline: Option<Instant>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl CompletionStateMachine {
    pub fn new(tool: impl Into<String>, policy: CompletionPolicy, config: CompletionConfig) -> Self {
        Self {
            tool: tool.into(),
            policy,
            config,
            state: CompletionState::default(),
            grace_deadline: None,
            diagnostics: Arc::new(NoopDiagnostics),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn state(&self) -> &CompletionState {
        &self.state
    }

    pub fn phase(&self) -> CompletionPhase {
        if self.state.done {
            CompletionPhase::Finalized
        } else {
            CompletionPhase::Running
        }
    }

    /// Deadline of the armed grace timer, if any.
    pub fn grace_deadline(&self) -> Option<Instant> {
        self.grace_deadline
    }

    /// Apply one signal. Returns the outcome when this signal finalizes the
    /// execution; signals arriving after that are ignored.
    pub fn handle(&mut self, signal: CompletionSignal, now: Instant) -> Option<CompletionOutcome> {
        if self.state.done {
            debug!(tool = %self.tool, ?signal, "signal after completion ignored");
            return None;
        }

        match signal {
            CompletionSignal::StderrWritten => {
                self.state.stderr_was_written = true;
                None
            }
            CompletionSignal::StdioClosed => {
                self.state.stdio_closed = true;
                if self.state.has_exited {
                    Some(self.finalize(false))
                } else {
                    None
                }
            }
            CompletionSignal::ProcessExited { code, spawn_error } => {
                if self.state.has_exited {
                    return None;
                }
                self.state.has_exited = true;
                self.state.exit_code = code;
                self.state.spawn_error = spawn_error;
                if self.state.stdio_closed {
                    return Some(self.finalize(false));
                }
                self.grace_deadline = Some(now + self.config.grace_period);
                debug!(
                    tool = %self.tool,
                    code,
                    grace = ?self.config.grace_period,
                    "process exited before stdio closed; grace timer armed"
                );
                None
            }
        }
    }

    /// Grace timer fired. Finalizes unconditionally once the deadline passed.
    pub fn expire(&mut self, now: Instant) -> Option<CompletionOutcome> {
        if self.state.done {
            return None;
        }
        match self.grace_deadline {
            Some(deadline) if now >= deadline => {}
            _ => return None,
        }

        if self.state.has_exited && !self.state.stdio_closed {
            let message = format!(
                "stdio streams of '{}' did not close within {} ms after exit",
                self.tool,
                self.config.grace_period.as_millis()
            );
            warn!(tool = %self.tool, "{message}");
            self.report(&message);
        }
        Some(self.finalize(true))
    }

    /// Drive the machine until it finalizes.
    ///
    /// If every sender goes away first, the execution is finalized with the
    /// signals seen so far.
    pub async fn run(mut self, mut signals: mpsc::UnboundedReceiver<CompletionSignal>) -> CompletionOutcome {
        loop {
            let deadline = self.grace_deadline;
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(signal) => {
                        if let Some(outcome) = self.handle(signal, Instant::now()) {
                            return outcome;
                        }
                    }
                    None => return self.disconnected(),
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(outcome) = self.expire(Instant::now()) {
                        return outcome;
                    }
                }
            }
        }
    }

    fn disconnected(&mut self) -> CompletionOutcome {
        if !self.state.has_exited {
            self.state.has_exited = true;
            self.state.exit_code = -1;
            self.state.spawn_error =
                Some("process status was lost before the exit was observed".to_string());
        }
        self.finalize(false)
    }

    fn finalize(&mut self, forced: bool) -> CompletionOutcome {
        self.grace_deadline = None;
        self.state.done = true;
        let error = classify(&self.tool, &self.state, self.policy);
        debug!(
            tool = %self.tool,
            code = self.state.exit_code,
            forced,
            failed = error.is_some(),
            "execution finalized"
        );
        CompletionOutcome {
            exit_code: self.state.exit_code,
            error,
            forced,
        }
    }

    fn report(&self, message: &str) {
        if let Err(err) = self.diagnostics.debug(message) {
            debug!(error = %err, "diagnostic sink rejected message");
        }
    }
}
