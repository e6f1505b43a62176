use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn toolrun(dir: &TempDir) -> Result<Command> {
    let mut cmd = Command::cargo_bin("toolrun")?;
    cmd.current_dir(dir.path());
    cmd.env_remove("TOOLRUN_TEST_EXIT_DELAY_MS");
    cmd.env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn dry_run_prints_quoted_command_line() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let mut cmd = toolrun(&temp_dir)?;
    cmd.args(["--dry-run", "--line=-m \"fix the build\"", "git", "commit"]);

    cmd.assert()
        .success()
        .stdout("[command]git commit -m \"fix the build\"\n");

    Ok(())
}

#[test]
fn missing_tool_fails_to_start() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let mut cmd = toolrun(&temp_dir)?;
    cmd.args(["--sync", "toolrun-definitely-missing-binary"]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("failed to start process"));

    Ok(())
}

#[test]
fn invalid_config_file_is_reported() -> Result<()> {
    let temp_dir = TempDir::new()?;
    fs::write(
        temp_dir.path().join("toolrun.toml"),
        "[exec]\ngrace_period_ms = 0\n",
    )?;

    let mut cmd = toolrun(&temp_dir)?;
    cmd.args(["--dry-run", "make"]);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("grace_period_ms"));

    Ok(())
}

#[test]
fn zero_grace_period_flag_is_rejected() -> Result<()> {
    let temp_dir = TempDir::new()?;

    let mut cmd = toolrun(&temp_dir)?;
    cmd.args(["--grace-period-ms", "0", "--dry-run", "make"]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--grace-period-ms must be at least 1"));

    Ok(())
}

#[cfg(unix)]
mod unix {
    use super::*;

    #[test]
    fn exit_code_of_the_tool_is_propagated() -> Result<()> {
        let temp_dir = TempDir::new()?;

        let mut cmd = toolrun(&temp_dir)?;
        cmd.args(["--", "/bin/sh", "-c", "echo working; exit 3"]);

        cmd.assert()
            .code(3)
            .stdout(predicate::str::starts_with(
                "[command]/bin/sh -c \"echo working; exit 3\"",
            ))
            .stdout(predicate::str::contains("working\n"))
            .stderr(predicate::str::contains("exit code: 3"));

        Ok(())
    }

    #[test]
    fn ignored_return_code_is_still_the_exit_status() -> Result<()> {
        let temp_dir = TempDir::new()?;

        let mut cmd = toolrun(&temp_dir)?;
        cmd.args(["--sync", "--ignore-return-code", "--", "/bin/sh", "-c", "exit 2"]);

        cmd.assert()
            .code(2)
            .stderr(predicate::str::contains("non-zero").not());

        Ok(())
    }

    #[test]
    fn fail_on_stderr_turns_warnings_into_failures() -> Result<()> {
        let temp_dir = TempDir::new()?;

        let mut cmd = toolrun(&temp_dir)?;
        cmd.args([
            "--fail-on-stderr",
            "--",
            "/bin/sh",
            "-c",
            "echo careful >&2",
        ]);

        cmd.assert()
            .code(1)
            .stderr(predicate::str::contains("careful"))
            .stderr(predicate::str::contains("process wrote to stderr"));

        Ok(())
    }

    #[test]
    fn sync_nonzero_exit_and_stderr_are_judged_by_the_cli() -> Result<()> {
        let temp_dir = TempDir::new()?;

        let mut cmd = toolrun(&temp_dir)?;
        cmd.args(["--sync", "--", "/bin/sh", "-c", "exit 5"]);
        cmd.assert()
            .code(5)
            .stderr(predicate::str::contains("exit code: 5"));

        let mut cmd = toolrun(&temp_dir)?;
        cmd.args(["--sync", "--fail-on-stderr", "--", "/bin/sh", "-c", "echo late >&2"]);
        cmd.assert()
            .code(1)
            .stderr(predicate::str::contains("process wrote to stderr"));

        Ok(())
    }

    #[test]
    fn silent_from_config_file_suppresses_echo_and_output() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join("toolrun.toml"), "[exec]\nsilent = true\n")?;

        let mut cmd = toolrun(&temp_dir)?;
        cmd.args(["--", "/bin/sh", "-c", "echo hidden"]);

        cmd.assert().success().stdout("");

        Ok(())
    }

    #[test]
    fn cwd_flag_sets_the_working_directory() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let work = temp_dir.path().join("work");
        fs::create_dir(&work)?;
        fs::write(work.join("marker.txt"), "present")?;

        let mut cmd = toolrun(&temp_dir)?;
        cmd.arg("--sync")
            .arg("--cwd")
            .arg(&work)
            .args(["--", "/bin/sh", "-c", "cat marker.txt"]);

        cmd.assert()
            .success()
            .stdout(predicate::str::ends_with("present"));

        Ok(())
    }
}
