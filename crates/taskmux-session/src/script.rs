//! Generated wrapper scripts for agent sessions.
//!
//! Each session runs a small bash script whose EXIT trap reports back to the
//! orchestrator binary with the task ID and exit code on every exit path
//! (clean exit, crash, kill). This converts an un-witnessed subprocess death
//! into a state-machine event without an external poller.

use std::fs;
use std::path::Path;

use taskmux_core::session::SessionError;

pub const SCRIPT_DIR: &str = ".taskmux/scripts";

/// Single-quote a value for POSIX shells.
pub fn shell_quote(value: &str) -> String {
    let escaped = value.replace('\'', "'\"'\"'");
    format!("'{escaped}'")
}

/// Render the wrapper script body. `review` marks the exit report as coming
/// from a review session rather than the work session.
pub fn render_wrapper_script(
    orchestrator_bin: &str,
    namespace: &str,
    task_id: u64,
    agent_command: &str,
    review: bool,
) -> String {
    let bin = shell_quote(orchestrator_bin);
    let ns = shell_quote(namespace);
    let role = if review { " --review" } else { "" };
    format!(
        "#!/usr/bin/env bash\n\
         report() {{\n\
         \x20 code=$?\n\
         \x20 {bin} _session-ended --namespace {ns}{role} {task_id} \"$code\" || true\n\
         \x20 exit \"$code\"\n\
         }}\n\
         trap report EXIT\n\
         {agent_command}\n"
    )
}

/// Write the wrapper script for a session under `<repo_root>/.taskmux/scripts`
/// and return the shell command that runs it.
pub fn write_wrapper_script(
    repo_root: &Path,
    session_name: &str,
    orchestrator_bin: &str,
    namespace: &str,
    task_id: u64,
    agent_command: &str,
    review: bool,
) -> Result<String, SessionError> {
    let dir = repo_root.join(SCRIPT_DIR);
    fs::create_dir_all(&dir).map_err(|source| SessionError::ScriptWrite {
        path: dir.clone(),
        source,
    })?;

    let path = dir.join(format!("{session_name}.sh"));
    let body = render_wrapper_script(orchestrator_bin, namespace, task_id, agent_command, review);
    fs::write(&path, body).map_err(|source| SessionError::ScriptWrite {
        path: path.clone(),
        source,
    })?;
    set_executable(&path)?;

    Ok(format!("bash {}", shell_quote(&path.to_string_lossy())))
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), SessionError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|source| {
        SessionError::ScriptWrite {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), SessionError> {
    Ok(())
}
