//! Injected collaborator seams: wall clock and shell command execution.

use chrono::{DateTime, Utc};
use std::path::Path;

/// Current-time source, injected so elapsed-time displays and poll deadlines
/// are deterministic under test.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("command failed to start ({command}): {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command output was not valid UTF-8 ({command})")]
    NonUtf8Output { command: String },
}

/// Captured result of a finished command. Failures to *run* are `RunError`;
/// a non-zero exit is data, because callers interpret exit codes differently
/// (pre-checks abort, poll commands are fire-and-forget).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: Option<i32>,
    /// Interleaved stdout + stderr.
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a shell command line. Implemented over `sh -c` in production and
/// faked in tests.
pub trait CommandRunner {
    /// Run with captured, combined output.
    fn run(&self, command: &str, cwd: &Path) -> Result<CommandOutput, RunError>;

    /// Run with inherited stdio, for commands the user should see live.
    fn run_interactive(&self, command: &str, cwd: &Path) -> Result<CommandOutput, RunError>;
}
