//! Terminal-multiplexer session contract.

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("multiplexer is not available: {message}")]
    NotAvailable { message: String },
    #[error("session command failed ({command}): {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("session '{name}' is not running")]
    NotRunning { name: String },
    #[error("failed to write session wrapper script at {path}: {source}")]
    ScriptWrite {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Named terminal-multiplexer sessions, keyed by derived session name.
///
/// `stop` on a session that is not running is a no-op success; callers that
/// need to distinguish check `is_running` first.
pub trait Sessions {
    /// Start a detached session named `name` in `cwd` running `command`.
    fn start(&self, name: &str, cwd: &Path, command: &str) -> Result<(), SessionError>;
    fn stop(&self, name: &str) -> Result<(), SessionError>;
    fn is_running(&self, name: &str) -> Result<bool, SessionError>;
    /// Replace the current process with an attach to the session.
    fn attach(&self, name: &str) -> Result<(), SessionError>;
    /// Capture the visible pane content.
    fn peek(&self, name: &str) -> Result<String, SessionError>;
    /// Type `text` into the session, followed by Enter.
    fn send_keys(&self, name: &str, text: &str) -> Result<(), SessionError>;
    fn list(&self) -> Result<Vec<String>, SessionError>;
}
