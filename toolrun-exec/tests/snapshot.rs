//! Resolution reads process-wide state, so these tests live in their own
//! binary rather than next to the unit tests.

use std::env;
use std::ffi::{OsStr, OsString};

use assert_fs::TempDir;
use pretty_assertions::assert_eq;
use toolrun_exec::ExecutionOptions;

#[test]
fn ambient_snapshot_ignores_later_process_changes() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let original_cwd = env::current_dir()?;
    env::set_var("TOOLRUN_SNAPSHOT_MARKER", "before");

    let resolved = ExecutionOptions::new().resolve();

    env::set_var("TOOLRUN_SNAPSHOT_MARKER", "after");
    env::set_var("TOOLRUN_SNAPSHOT_LATE", "1");
    env::set_current_dir(dir.path())?;

    let marker = resolved
        .environment
        .get(OsStr::new("TOOLRUN_SNAPSHOT_MARKER"))
        .cloned();
    let late_visible = resolved
        .environment
        .contains_key(OsStr::new("TOOLRUN_SNAPSHOT_LATE"));
    let cwd = resolved.working_directory.clone();

    env::set_current_dir(&original_cwd)?;
    env::remove_var("TOOLRUN_SNAPSHOT_MARKER");
    env::remove_var("TOOLRUN_SNAPSHOT_LATE");

    assert_eq!(marker, Some(OsString::from("before")));
    assert!(!late_visible);
    assert_eq!(cwd, original_cwd);
    Ok(())
}

#[cfg(unix)]
mod non_utf8 {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::os::unix::ffi::OsStrExt;
    use std::sync::Arc;

    use toolrun_exec::{ExecutionSession, NullSink};

    const RAW_NAME: &str = "TOOLRUN_RAW_BYTES";

    fn raw_value() -> &'static OsStr {
        OsStr::from_bytes(b"\xff\xfe")
    }

    #[test]
    fn ambient_non_utf8_variable_is_snapshotted_and_passed_through() -> anyhow::Result<()> {
        env::set_var(RAW_NAME, raw_value());

        // Pinned so the cwd change in the sibling test cannot race the spawn.
        let options = ExecutionOptions::new()
            .working_directory(env::temp_dir())
            .silent(true)
            .output_sink(Arc::new(NullSink))
            .error_sink(Arc::new(NullSink));
        let resolved = options.resolve();

        let mut session = ExecutionSession::new("/bin/sh")?;
        session.append_argument(vec!["-c", "test -n \"$TOOLRUN_RAW_BYTES\""]);
        let result = session.execute_sync(&options);

        env::remove_var(RAW_NAME);

        assert_eq!(
            resolved.environment.get(OsStr::new(RAW_NAME)).map(OsString::as_os_str),
            Some(raw_value())
        );
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.error, None);
        Ok(())
    }
}
