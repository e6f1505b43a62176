//! The chainable tool invocation builder and its two execution paths.

use std::fmt;
use std::process::Stdio;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use toolrun_commons::{DiagnosticSink, NoopDiagnostics};
use tracing::debug;

use crate::completion::{
    CompletionConfig, CompletionPolicy, CompletionSignal, CompletionStateMachine,
};
use crate::error::ExecError;
use crate::options::{ExecutionOptions, ExecutionResult, ResolvedOptions};
use crate::render::{COMMAND_PREFIX, LaunchModel, LaunchPlan, echo_line, launch_plan};
use crate::stream::{StreamKind, forward_stream};
use crate::tokenizer::tokenize;

#[cfg(windows)]
const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
const LINE_ENDING: &str = "\n";

/// Value accepted by [`ExecutionSession::append_argument`]: nothing, one
/// argument, or an ordered list of arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Empty,
    Single(String),
    Many(Vec<String>),
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<&String> for ArgValue {
    fn from(value: &String) -> Self {
        Self::Single(value.clone())
    }
}

impl From<Vec<String>> for ArgValue {
    fn from(values: Vec<String>) -> Self {
        Self::Many(values)
    }
}

impl From<Vec<&str>> for ArgValue {
    fn from(values: Vec<&str>) -> Self {
        Self::Many(values.into_iter().map(str::to_string).collect())
    }
}

impl From<&[String]> for ArgValue {
    fn from(values: &[String]) -> Self {
        Self::Many(values.to_vec())
    }
}

impl From<&[&str]> for ArgValue {
    fn from(values: &[&str]) -> Self {
        Self::Many(values.iter().map(|s| (*s).to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ArgValue {
    fn from(values: [&str; N]) -> Self {
        Self::Many(values.iter().map(|s| (*s).to_string()).collect())
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Empty, Into::into)
    }
}

/// A tool path plus an ordered argument list.
///
/// The `append_*` methods mutate the session in place and return `&mut Self`
/// for chaining; they do not produce copies.
///
/// ```
/// use toolrun_exec::ExecutionSession;
///
/// let mut session = ExecutionSession::new("kubectl")?;
/// session
///     .append_argument("apply")
///     .append_line(r#"-f "my manifest.yaml""#)
///     .append_if(false, "--dry-run");
/// assert_eq!(session.arguments(), ["apply", "-f", "my manifest.yaml"]);
/// # Ok::<(), toolrun_exec::ExecError>(())
/// ```
pub struct ExecutionSession {
    tool_path: String,
    launch_model: LaunchModel,
    args: Vec<String>,
    piped_to: Option<Box<ExecutionSession>>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl fmt::Debug for ExecutionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionSession")
            .field("tool_path", &self.tool_path)
            .field("launch_model", &self.launch_model)
            .field("args", &self.args)
            .field("piped_to", &self.piped_to)
            .finish_non_exhaustive()
    }
}

impl ExecutionSession {
    pub fn new(tool_path: impl Into<String>) -> Result<Self, ExecError> {
        let tool_path = tool_path.into();
        if tool_path.is_empty() {
            return Err(ExecError::EmptyToolPath);
        }
        let launch_model = LaunchModel::detect(&tool_path);
        debug!(tool = %tool_path, ?launch_model, "tool session created");
        Ok(Self {
            tool_path,
            launch_model,
            args: Vec::new(),
            piped_to: None,
            diagnostics: Arc::new(NoopDiagnostics),
        })
    }

    /// Route diagnostic lines to `diagnostics` instead of discarding them.
    pub fn with_diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = diagnostics;
        self.report(&format!("tool path: {}", self.tool_path));
        self
    }

    pub fn tool_path(&self) -> &str {
        &self.tool_path
    }

    pub fn launch_model(&self) -> LaunchModel {
        self.launch_model
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn piped_to(&self) -> Option<&ExecutionSession> {
        self.piped_to.as_deref()
    }

    /// Append one argument (trimmed) or a list of arguments (as given).
    /// Empty input is ignored.
    pub fn append_argument(&mut self, value: impl Into<ArgValue>) -> &mut Self {
        match value.into() {
            ArgValue::Empty => {}
            ArgValue::Single(value) => {
                if !value.is_empty() {
                    self.report(&format!("{} arg: {}", self.tool_path, value));
                    self.args.push(value.trim().to_string());
                }
            }
            ArgValue::Many(values) => {
                if !values.is_empty() {
                    self.report(&format!("{} arg: {:?}", self.tool_path, values));
                    self.args.extend(values);
                }
            }
        }
        self
    }

    /// Tokenize `line` and append the resulting arguments.
    pub fn append_line(&mut self, line: &str) -> &mut Self {
        if line.is_empty() {
            return self;
        }
        self.report(&format!("{} arg: {}", self.tool_path, line));
        self.args.extend(tokenize(line));
        self
    }

    pub fn append_if(&mut self, condition: bool, value: impl Into<ArgValue>) -> &mut Self {
        if condition {
            self.append_argument(value);
        }
        self
    }

    /// Show `other` after a `|` in the echoed command line. No OS pipe is
    /// created between the two processes.
    pub fn pipe_output_to(&mut self, other: ExecutionSession) -> &mut Self {
        self.piped_to = Some(Box::new(other));
        self
    }

    /// The echoed command line, including the `[command]` prefix and any
    /// piped successor.
    pub fn command_line(&self, options: &ResolvedOptions) -> String {
        self.render_command(options, true)
    }

    fn render_command(&self, options: &ResolvedOptions, prefixed: bool) -> String {
        let mut line = String::new();
        if prefixed {
            line.push_str(COMMAND_PREFIX);
        }
        line.push_str(&echo_line(
            self.launch_model,
            &self.tool_path,
            &self.args,
            options.verbatim_arguments,
            &options.environment,
        ));
        if let Some(next) = &self.piped_to {
            line.push_str(" | ");
            line.push_str(&next.render_command(options, false));
        }
        line
    }

    pub fn launch_plan(&self, options: &ResolvedOptions) -> LaunchPlan {
        launch_plan(
            self.launch_model,
            &self.tool_path,
            &self.args,
            options.verbatim_arguments,
            &options.environment,
        )
    }

    /// Run the tool and block until it exits.
    ///
    /// [`ExecutionResult::error`] is set only when the process could not be
    /// started. Exit code and stderr are reported as data; use
    /// [`ExecutionResult::failure`] to apply the async failure rules.
    pub fn execute_sync(&self, options: &ExecutionOptions) -> ExecutionResult {
        let resolved = options.resolve();
        self.announce(&resolved);

        let plan = self.launch_plan(&resolved);
        let mut command = build_command(&plan, &resolved);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = match command.output() {
            Ok(output) => output,
            Err(err) => {
                debug!(tool = %self.tool_path, error = %err, "spawn failed");
                return ExecutionResult {
                    stdout: String::new(),
                    stderr: String::new(),
                    exit_code: -1,
                    error: Some(ExecError::Spawn {
                        tool: self.tool_path.clone(),
                        message: err.to_string(),
                    }),
                };
            }
        };

        if !resolved.silent {
            forward_all(&resolved, StreamKind::Stdout, &output.stdout);
            forward_all(&resolved, StreamKind::Stderr, &output.stderr);
        }

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(tool = %self.tool_path, code = exit_code, "sync execution finished");

        ExecutionResult {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code,
            error: None,
        }
    }

    /// Run the tool, forwarding output as it arrives, and resolve with the
    /// exit code once the completion state machine settles.
    pub async fn execute_async(&self, options: &ExecutionOptions) -> Result<i32, ExecError> {
        let resolved = options.resolve();
        self.announce(&resolved);

        let plan = self.launch_plan(&resolved);
        let mut command = tokio::process::Command::from(build_command(&plan, &resolved));
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let machine = CompletionStateMachine::new(
            self.tool_path.clone(),
            policy_for(&resolved),
            CompletionConfig::with_grace_period(resolved.grace_period),
        )
        .with_diagnostics(Arc::clone(&self.diagnostics));
        let (signals, receiver) = mpsc::unbounded_channel();

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                debug!(tool = %self.tool_path, error = %err, "spawn failed");
                for signal in [
                    CompletionSignal::ProcessExited {
                        code: -1,
                        spawn_error: Some(err.to_string()),
                    },
                    CompletionSignal::StdioClosed,
                ] {
                    if signals.send(signal).is_err() {
                        break;
                    }
                }
                drop(signals);
                return machine.run(receiver).await.into_result();
            }
        };

        let readers: Vec<JoinHandle<()>> = [
            child.stdout.take().map(|out| {
                tokio::spawn(forward_stream(
                    out,
                    StreamKind::Stdout,
                    Arc::clone(&resolved.output_sink),
                    resolved.silent,
                    signals.clone(),
                ))
            }),
            child.stderr.take().map(|err| {
                tokio::spawn(forward_stream(
                    err,
                    StreamKind::Stderr,
                    Arc::clone(&resolved.error_sink),
                    resolved.silent,
                    signals.clone(),
                ))
            }),
        ]
        .into_iter()
        .flatten()
        .collect();
        let reader_aborts: Vec<_> = readers.iter().map(JoinHandle::abort_handle).collect();

        let closed_signals = signals.clone();
        let stdio_watcher = tokio::spawn(async move {
            for reader in readers {
                if let Err(err) = reader.await {
                    debug!(error = %err, "stream reader ended abnormally");
                }
            }
            if closed_signals.send(CompletionSignal::StdioClosed).is_err() {
                debug!("completion already settled; stdio close dropped");
            }
        });

        let exit_signals = signals;
        let tool = self.tool_path.clone();
        tokio::spawn(async move {
            let signal = match child.wait().await {
                Ok(status) => CompletionSignal::ProcessExited {
                    code: status.code().unwrap_or(-1),
                    spawn_error: None,
                },
                Err(err) => CompletionSignal::ProcessExited {
                    code: -1,
                    spawn_error: Some(err.to_string()),
                },
            };
            if exit_signals.send(signal).is_err() {
                debug!(tool = %tool, "completion already settled; exit dropped");
            }
        });

        let outcome = machine.run(receiver).await;

        // Readers may still hold pipes a grandchild inherited; stop listening.
        stdio_watcher.abort();
        for abort in reader_aborts {
            abort.abort();
        }

        outcome.into_result()
    }

    fn announce(&self, resolved: &ResolvedOptions) {
        self.report(&format!("exec tool: {}", self.tool_path));
        self.report("arguments:");
        for arg in &self.args {
            self.report(&format!("   {arg}"));
        }

        if resolved.silent {
            return;
        }
        let line = format!("{}{LINE_ENDING}", self.command_line(resolved));
        if let Err(err) = resolved.output_sink.write_chunk(line.as_bytes()) {
            debug!(tool = %self.tool_path, error = %err, "failed to echo command line");
        }
    }

    fn report(&self, message: &str) {
        debug!(target: "toolrun::session", "{message}");
        if let Err(err) = self.diagnostics.debug(message) {
            debug!(error = %err, "diagnostic sink rejected message");
        }
    }
}

fn policy_for(resolved: &ResolvedOptions) -> CompletionPolicy {
    CompletionPolicy {
        ignore_return_code: resolved.ignore_return_code,
        fail_on_stderr: resolved.fail_on_stderr,
    }
}

fn forward_all(resolved: &ResolvedOptions, kind: StreamKind, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    let sink = match kind {
        StreamKind::Stdout => &resolved.output_sink,
        StreamKind::Stderr => &resolved.error_sink,
    };
    if let Err(err) = sink.write_chunk(bytes) {
        debug!(?kind, error = %err, "failed to forward output");
    }
}

fn build_command(plan: &LaunchPlan, resolved: &ResolvedOptions) -> std::process::Command {
    let mut command = std::process::Command::new(&plan.program);
    push_args(&mut command, plan);
    command
        .current_dir(&resolved.working_directory)
        .env_clear()
        .envs(resolved.environment.iter());
    command
}

#[cfg(windows)]
fn push_args(command: &mut std::process::Command, plan: &LaunchPlan) {
    use std::os::windows::process::CommandExt;

    if plan.raw_args {
        for arg in &plan.args {
            command.raw_arg(arg);
        }
    } else {
        command.args(&plan.args);
    }
}

#[cfg(not(windows))]
fn push_args(command: &mut std::process::Command, plan: &LaunchPlan) {
    command.args(&plan.args);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::BufferSink;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use toolrun_commons::MemoryDiagnostics;

    fn resolved() -> ResolvedOptions {
        ExecutionOptions::new()
            .environment(HashMap::<String, String>::new())
            .resolve()
    }

    #[test]
    fn empty_tool_path_is_rejected() {
        assert_eq!(ExecutionSession::new("").err(), Some(ExecError::EmptyToolPath));
    }

    #[test]
    fn append_argument_ignores_empty_values() -> Result<(), ExecError> {
        let mut session = ExecutionSession::new("tool")?;
        session
            .append_argument("")
            .append_argument(None::<&str>)
            .append_argument(Vec::<String>::new());
        assert!(session.arguments().is_empty());
        Ok(())
    }

    #[test]
    fn append_argument_trims_single_values_and_concatenates_lists() -> Result<(), ExecError> {
        let mut session = ExecutionSession::new("tool")?;
        session
            .append_argument("  first ")
            .append_argument(["a", " b ", "a"])
            .append_argument(Some("last".to_string()));
        assert_eq!(session.arguments(), ["first", "a", " b ", "a", "last"]);
        Ok(())
    }

    #[test]
    fn append_line_tokenizes() -> Result<(), ExecError> {
        let mut session = ExecutionSession::new("tool")?;
        session.append_line("").append_line(r#""arg one" two -z"#);
        assert_eq!(session.arguments(), ["arg one", "two", "-z"]);
        Ok(())
    }

    #[test]
    fn append_if_respects_condition() -> Result<(), ExecError> {
        let mut session = ExecutionSession::new("tool")?;
        session.append_if(false, "--no").append_if(true, vec!["--yes", "1"]);
        assert_eq!(session.arguments(), ["--yes", "1"]);
        Ok(())
    }

    #[test]
    fn command_line_composes_piped_sessions() -> Result<(), ExecError> {
        let mut grep = ExecutionSession::new("grep")?;
        grep.append_argument("needle in");
        let mut wc = ExecutionSession::new("wc")?;
        wc.append_argument("-l");
        grep.pipe_output_to(wc);

        let mut cat = ExecutionSession::new("cat")?;
        cat.append_argument("my file.txt").pipe_output_to(grep);

        assert_eq!(
            cat.command_line(&resolved()),
            r#"[command]cat "my file.txt" | grep "needle in" | wc -l"#
        );
        assert!(cat.piped_to().is_some());
        Ok(())
    }

    #[test]
    fn interpreter_sessions_render_through_the_interpreter() -> Result<(), ExecError> {
        let mut session = ExecutionSession::new("deploy.cmd")?;
        session.append_argument("a&b");
        assert_eq!(session.launch_model(), LaunchModel::InterpreterInvocation);
        assert_eq!(
            session.command_line(&resolved()),
            r#"[command]cmd.exe /D /S /C "deploy.cmd "a&b"""#
        );
        Ok(())
    }

    #[test]
    fn diagnostics_record_argument_activity() -> Result<(), ExecError> {
        let diagnostics = MemoryDiagnostics::new();
        let mut session =
            ExecutionSession::new("tool")?.with_diagnostics(Arc::new(diagnostics.clone()));
        session.append_argument("x").append_line("y z");

        assert!(diagnostics.contains("tool path: tool"));
        assert!(diagnostics.contains("tool arg: x"));
        assert!(diagnostics.contains("tool arg: y z"));
        Ok(())
    }

    #[test]
    fn sync_spawn_failure_is_reported_as_data() -> Result<(), ExecError> {
        let out = BufferSink::new();
        let session = ExecutionSession::new("toolrun-definitely-missing-binary")?;
        let result = session.execute_sync(
            &ExecutionOptions::new()
                .output_sink(Arc::new(out.clone()))
                .error_sink(Arc::new(BufferSink::new())),
        );

        assert_eq!(result.exit_code, -1);
        assert!(result.error.as_ref().is_some_and(ExecError::is_spawn_failure));
        assert!(out.contents().starts_with("[command]toolrun-definitely-missing-binary"));
        Ok(())
    }

    #[tokio::test]
    async fn async_spawn_failure_rejects() -> Result<(), ExecError> {
        let session = ExecutionSession::new("toolrun-definitely-missing-binary")?;
        let err = session
            .execute_async(&ExecutionOptions::new().silent(true))
            .await
            .err();
        assert!(err.as_ref().is_some_and(ExecError::is_spawn_failure));
        Ok(())
    }
}
