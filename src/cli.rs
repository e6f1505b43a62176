use std::path::PathBuf;

use clap::Parser;

/// Run an external tool with consistent argument quoting, command echo and
/// completion handling.
#[derive(Debug, Parser)]
#[command(name = "toolrun", version, about, long_about = None)]
pub struct Cli {
    /// Path or name of the tool to execute
    pub tool: String,

    /// Arguments passed to the tool, one per value
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, num_args = 0..)]
    pub args: Vec<String>,

    /// Additional argument line, split with shell-like quoting rules
    #[arg(long, value_name = "LINE")]
    pub line: Option<String>,

    /// Block until the tool exits and capture its output
    #[arg(long)]
    pub sync: bool,

    /// Do not echo the command line or forward tool output
    #[arg(short, long)]
    pub silent: bool,

    /// Treat any stderr output as a failure
    #[arg(long)]
    pub fail_on_stderr: bool,

    /// Report the exit code instead of failing on a non-zero exit
    #[arg(long)]
    pub ignore_return_code: bool,

    /// Pass arguments through without quoting
    #[arg(long)]
    pub verbatim: bool,

    /// Working directory for the tool
    #[arg(short = 'C', long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Milliseconds to wait for stdio to close after the tool exits
    #[arg(long, value_name = "MS")]
    pub grace_period_ms: Option<u64>,

    /// Path to a toolrun.toml configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the command line that would run and exit
    #[arg(long)]
    pub dry_run: bool,
}
