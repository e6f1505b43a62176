//! Turns a tool path and argument list into the echoed command line and the
//! concrete request handed to the OS.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};

use crate::quoting::{quote_direct, quote_interpreter};

/// Prefix of the echoed command line.
pub const COMMAND_PREFIX: &str = "[command]";

/// Extensions of scripts that must run through the command interpreter.
pub const SCRIPT_EXTENSIONS: &[&str] = &[".cmd", ".bat"];

/// Interpreter used when `COMSPEC` is not set.
pub const DEFAULT_INTERPRETER: &str = "cmd.exe";

/// How the tool is launched, fixed when the session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LaunchModel {
    /// The tool is a process image and receives an argument vector.
    DirectInvocation,
    /// The tool is a script re-parsed by the command interpreter.
    InterpreterInvocation,
}

impl LaunchModel {
    pub fn detect(tool_path: &str) -> Self {
        if is_script_path(tool_path) {
            Self::InterpreterInvocation
        } else {
            Self::DirectInvocation
        }
    }

    /// Quote a single argument with this model's grammar.
    pub fn quote(self, arg: &str) -> String {
        match self {
            Self::DirectInvocation => quote_direct(arg),
            Self::InterpreterInvocation => quote_interpreter(arg),
        }
    }
}

/// True when `tool_path` ends in one of [`SCRIPT_EXTENSIONS`], ignoring case.
pub fn is_script_path(tool_path: &str) -> bool {
    let lower = tool_path.to_ascii_lowercase();
    SCRIPT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Concrete spawn request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: String,
    pub args: Vec<String>,
    /// Pass `args` to the OS untouched instead of letting the launcher quote
    /// them. Only Windows distinguishes the two.
    pub raw_args: bool,
}

/// Build the launch plan for `tool_path` and `args`.
pub fn launch_plan(
    model: LaunchModel,
    tool_path: &str,
    args: &[String],
    verbatim: bool,
    environment: &HashMap<OsString, OsString>,
) -> LaunchPlan {
    match model {
        LaunchModel::InterpreterInvocation => LaunchPlan {
            program: interpreter_program(environment),
            args: vec![interpreter_line(model, tool_path, args, verbatim)],
            raw_args: true,
        },
        LaunchModel::DirectInvocation => LaunchPlan {
            program: tool_path.to_string(),
            args: args.to_vec(),
            raw_args: verbatim,
        },
    }
}

/// Render the human-readable command line, without the prefix and without
/// any piped successor.
pub fn echo_line(
    model: LaunchModel,
    tool_path: &str,
    args: &[String],
    verbatim: bool,
    environment: &HashMap<OsString, OsString>,
) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(args.len() + 1);
    match (model, verbatim) {
        (LaunchModel::InterpreterInvocation, _) => {
            parts.push(interpreter_program(environment));
            parts.push(interpreter_line(model, tool_path, args, verbatim));
        }
        (LaunchModel::DirectInvocation, true) => {
            parts.push(format!("\"{tool_path}\""));
            parts.extend(args.iter().cloned());
        }
        (LaunchModel::DirectInvocation, false) => {
            parts.push(model.quote(tool_path));
            parts.extend(args.iter().map(|arg| model.quote(arg)));
        }
    }
    parts.join(" ")
}

fn interpreter_program(environment: &HashMap<OsString, OsString>) -> String {
    environment
        .get(OsStr::new("COMSPEC"))
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_INTERPRETER.to_string())
}

// `/D` skips AutoRun, `/S` strips exactly the outer quote pair, `/C` runs and exits.
fn interpreter_line(model: LaunchModel, tool_path: &str, args: &[String], verbatim: bool) -> String {
    let mut line = format!("/D /S /C \"{}", model.quote(tool_path));
    for arg in args {
        line.push(' ');
        if verbatim {
            line.push_str(arg);
        } else {
            line.push_str(&model.quote(arg));
        }
    }
    line.push('"');
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn detects_scripts_case_insensitively() {
        assert_eq!(LaunchModel::detect(r"C:\tools\deploy.CMD"), LaunchModel::InterpreterInvocation);
        assert_eq!(LaunchModel::detect("run.bat"), LaunchModel::InterpreterInvocation);
        assert_eq!(LaunchModel::detect("/usr/bin/kubectl"), LaunchModel::DirectInvocation);
        assert_eq!(LaunchModel::detect("tool.exe"), LaunchModel::DirectInvocation);
        assert_eq!(LaunchModel::detect("batch"), LaunchModel::DirectInvocation);
    }

    #[test]
    fn direct_plan_keeps_argument_vector() {
        let env = HashMap::new();
        let plan = launch_plan(
            LaunchModel::DirectInvocation,
            "kubectl",
            &args(&["apply", "-f", "my file.yaml"]),
            false,
            &env,
        );
        assert_eq!(plan.program, "kubectl");
        assert_eq!(plan.args, args(&["apply", "-f", "my file.yaml"]));
        assert!(!plan.raw_args);
    }

    #[test]
    fn interpreter_plan_wraps_everything_in_one_line() {
        let mut env = HashMap::new();
        env.insert(OsString::from("COMSPEC"), OsString::from(r"C:\Windows\system32\cmd.exe"));
        let plan = launch_plan(
            LaunchModel::InterpreterInvocation,
            r"C:\my tools\run.cmd",
            &args(&["a&b", "plain", ""]),
            false,
            &env,
        );
        assert_eq!(plan.program, r"C:\Windows\system32\cmd.exe");
        assert_eq!(
            plan.args,
            vec![r#"/D /S /C ""C:\my tools\run.cmd" "a&b" plain """"#.to_string()]
        );
        assert!(plan.raw_args);
    }

    #[test]
    fn interpreter_falls_back_to_default_program() {
        let plan = launch_plan(
            LaunchModel::InterpreterInvocation,
            "run.bat",
            &args(&["x y"]),
            true,
            &HashMap::new(),
        );
        assert_eq!(plan.program, DEFAULT_INTERPRETER);
        assert_eq!(plan.args, vec![r#"/D /S /C "run.bat x y""#.to_string()]);
    }

    #[test]
    fn echo_line_quotes_per_model() {
        let env = HashMap::new();
        assert_eq!(
            echo_line(
                LaunchModel::DirectInvocation,
                "/opt/my tool/bin",
                &args(&["hello world", r#"say"hi"#, "-z"]),
                false,
                &env,
            ),
            r#""/opt/my tool/bin" "hello world" "say\"hi" -z"#
        );
        assert_eq!(
            echo_line(
                LaunchModel::DirectInvocation,
                "tool",
                &args(&["raw \"as is\""]),
                true,
                &env,
            ),
            r#""tool" raw "as is""#
        );
        assert_eq!(
            echo_line(
                LaunchModel::InterpreterInvocation,
                "run.cmd",
                &args(&["k=v"]),
                false,
                &env,
            ),
            r#"cmd.exe /D /S /C "run.cmd "k=v"""#
        );
    }
}
