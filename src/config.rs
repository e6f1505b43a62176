use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use toolrun_exec::{CompletionConfig, EXIT_DELAY_ENV, ExecutionOptions};

use crate::cli::Cli;

pub const CONFIG_FILE_NAME: &str = "toolrun.toml";

const TRACE_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Contents of `toolrun.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolrunConfig {
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub debug: DebugConfig,
}

/// Defaults applied to every execution unless a CLI flag overrides them.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecConfig {
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub fail_on_stderr: bool,
    #[serde(default)]
    pub ignore_return_code: bool,
    #[serde(default)]
    pub verbatim_arguments: bool,
    /// Milliseconds to wait for stdio to close after the process exits.
    #[serde(default = "ExecConfig::default_grace_period_ms")]
    pub grace_period_ms: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            silent: false,
            fail_on_stderr: false,
            ignore_return_code: false,
            verbatim_arguments: false,
            grace_period_ms: Self::default_grace_period_ms(),
        }
    }
}

impl ExecConfig {
    const fn default_grace_period_ms() -> u64 {
        10_000
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DebugConfig {
    #[serde(default)]
    pub enable_tracing: bool,
    #[serde(default = "DebugConfig::default_trace_level")]
    pub trace_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enable_tracing: false,
            trace_level: Self::default_trace_level(),
        }
    }
}

impl DebugConfig {
    fn default_trace_level() -> String {
        "info".to_string()
    }
}

impl ToolrunConfig {
    /// Load the configuration from `explicit`, or from `./toolrun.toml` when
    /// it exists. Falls back to defaults when neither is available.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = PathBuf::from(CONFIG_FILE_NAME);
                if !candidate.is_file() {
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents).context("failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.exec.grace_period_ms > 0,
            "exec.grace_period_ms must be at least 1"
        );
        ensure!(
            TRACE_LEVELS.contains(&self.debug.trace_level.as_str()),
            "debug.trace_level must be one of {}, got '{}'",
            TRACE_LEVELS.join(", "),
            self.debug.trace_level
        );
        Ok(())
    }

    /// Grace period after layering the environment override and the CLI flag
    /// over the configured value. Every source must be at least 1 ms.
    pub fn grace_period(
        &self,
        cli_override_ms: Option<u64>,
        env_override: Option<Duration>,
    ) -> Result<Duration> {
        if let Some(ms) = cli_override_ms {
            ensure!(ms > 0, "--grace-period-ms must be at least 1");
            return Ok(Duration::from_millis(ms));
        }
        if let Some(grace) = env_override {
            ensure!(!grace.is_zero(), "{EXIT_DELAY_ENV} must be at least 1");
            return Ok(grace);
        }
        Ok(Duration::from_millis(self.exec.grace_period_ms))
    }

    /// Build execution options from the file defaults and CLI flags. Boolean
    /// flags only ever switch a behaviour on.
    pub fn execution_options(&self, cli: &Cli) -> Result<ExecutionOptions> {
        let grace = self.grace_period(
            cli.grace_period_ms,
            CompletionConfig::grace_override_from_env(),
        )?;
        let mut options = ExecutionOptions::new()
            .silent(cli.silent || self.exec.silent)
            .fail_on_stderr(cli.fail_on_stderr || self.exec.fail_on_stderr)
            .ignore_return_code(cli.ignore_return_code || self.exec.ignore_return_code)
            .verbatim_arguments(cli.verbatim || self.exec.verbatim_arguments)
            .grace_period(grace);
        if let Some(dir) = &cli.cwd {
            options = options.working_directory(dir.clone());
        }
        Ok(options)
    }
}
