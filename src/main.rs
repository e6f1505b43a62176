//! toolrun - run an external tool the way build pipelines expect.
//!
//! Thin binary over `toolrun-exec`: parses flags, layers them over
//! `toolrun.toml`, runs the tool and exits with its exit code.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use toolrun_commons::TracingDiagnostics;
use toolrun_exec::{CompletionPolicy, ExecError, ExecutionSession};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

use cli::Cli;
use config::ToolrunConfig;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env (non-fatal if missing)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => exit_code(code),
        Err(err) => {
            eprintln!("toolrun: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let config = ToolrunConfig::load(cli.config.as_deref())?;
    initialize_tracing(&config);

    let mut session = ExecutionSession::new(cli.tool.as_str())
        .context("no tool given")?
        .with_diagnostics(Arc::new(TracingDiagnostics));
    session.append_argument(cli.args.as_slice());
    if let Some(line) = &cli.line {
        session.append_line(line);
    }

    let options = config.execution_options(&cli)?;

    if cli.dry_run {
        println!("{}", session.command_line(&options.resolve()));
        return Ok(0);
    }

    if cli.sync {
        let result = session.execute_sync(&options);
        let policy = CompletionPolicy {
            ignore_return_code: options.ignore_return_code,
            fail_on_stderr: options.fail_on_stderr,
        };
        return match result.failure(session.tool_path(), policy) {
            Some(err) => settle(err),
            None => Ok(result.exit_code),
        };
    }

    match session.execute_async(&options).await {
        Ok(code) => Ok(code),
        Err(err) => settle(err),
    }
}

/// Map an execution failure to the process exit code. Failures to start the
/// tool are reported as errors; everything else already ran and is reported
/// on stderr.
fn settle(err: ExecError) -> Result<i32> {
    if err.is_spawn_failure() {
        return Err(err.into());
    }
    eprintln!("toolrun: {err}");
    Ok(err.exit_code().unwrap_or(1))
}

fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code) {
        Ok(code) => ExitCode::from(code),
        Err(_) => ExitCode::FAILURE,
    }
}

/// RUST_LOG takes precedence; otherwise tracing is only enabled when the
/// config asks for it.
fn initialize_tracing(config: &ToolrunConfig) {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) if config.debug.enable_tracing => {
            let level = config.debug.trace_level.as_str();
            EnvFilter::new(format!(
                "toolrun={level},toolrun_exec={level},toolrun_commons={level}"
            ))
        }
        Err(_) => return,
    };

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .is_err()
    {
        eprintln!("toolrun: tracing subscriber already installed");
    }
}
