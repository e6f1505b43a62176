use tracing::warn;

use crate::error::ExecError;
use crate::options::ExecutionResult;

/// Fold the stderr of several blocking executions into a single verdict.
///
/// Stderr from results that exited non-zero is collected; stderr from
/// successful results is only logged. Collected stderr becomes an
/// [`ExecError::Aggregated`] unless `warn_if_error` is set, in which case it
/// is logged as a warning too.
pub fn check_for_errors(results: &[ExecutionResult], warn_if_error: bool) -> Result<(), ExecError> {
    let mut collected = String::new();
    for result in results {
        if result.stderr.is_empty() {
            continue;
        }
        if result.exit_code != 0 {
            collected.push_str(&result.stderr);
            collected.push('\n');
        } else {
            warn!("{}", result.stderr);
        }
    }

    let collected = collected.trim();
    if collected.is_empty() {
        return Ok(());
    }
    if warn_if_error {
        warn!("{collected}");
        return Ok(());
    }
    Err(ExecError::Aggregated(collected.to_string()))
}
