use thiserror::Error;

/// Errors produced while building or running a tool invocation.
///
/// Only [`ExecError::EmptyToolPath`] is raised at construction time. The
/// remaining variants describe how an execution ended and are surfaced as
/// data: in [`ExecutionResult::error`](crate::ExecutionResult::error) for the
/// blocking path and as the `Err` side of the async path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde-errors", derive(serde::Serialize))]
pub enum ExecError {
    #[error("parameter 'tool_path' cannot be empty")]
    EmptyToolPath,

    #[error("failed to start process\n tool: {tool}\n error: {message}")]
    Spawn { tool: String, message: String },

    #[error("process exited with a non-zero code\n tool: {tool}\n exit code: {code}")]
    NonZeroExit { tool: String, code: i32 },

    #[error("process wrote to stderr\n tool: {tool}")]
    StdErr { tool: String },

    #[error("{0}")]
    Aggregated(String),
}

impl ExecError {
    /// True when the tool could not be invoked at all, as opposed to having
    /// run and failed.
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }

    /// Exit code carried by the error, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_tool() {
        let err = ExecError::NonZeroExit {
            tool: "kubectl".into(),
            code: 3,
        };
        let text = err.to_string();
        assert!(text.contains("kubectl"));
        assert!(text.contains("exit code: 3"));
        assert_eq!(err.exit_code(), Some(3));
        assert!(!err.is_spawn_failure());
    }

    #[test]
    fn spawn_failures_are_distinguishable() {
        let err = ExecError::Spawn {
            tool: "missing".into(),
            message: "No such file or directory".into(),
        };
        assert!(err.is_spawn_failure());
        assert_eq!(err.exit_code(), None);
    }
}
