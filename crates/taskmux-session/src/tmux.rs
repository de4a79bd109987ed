//! tmux-backed implementation of the `Sessions` contract.

use std::path::Path;
use std::process::{Command, Stdio};

use taskmux_core::session::{SessionError, Sessions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxSessions {
    pub binary: String,
}

impl Default for TmuxSessions {
    fn default() -> Self {
        Self {
            binary: "tmux".to_string(),
        }
    }
}

impl TmuxSessions {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String, SessionError> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|err| SessionError::NotAvailable {
                message: format!("{}: {err}", self.binary),
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(SessionError::CommandFailed {
                command: format!("{} {}", self.binary, args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl Sessions for TmuxSessions {
    fn start(&self, name: &str, cwd: &Path, command: &str) -> Result<(), SessionError> {
        let cwd = cwd.to_string_lossy();
        self.run(&["new-session", "-d", "-s", name, "-c", &cwd, command])?;
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<(), SessionError> {
        // Killing an absent session is a no-op success so stop stays
        // re-invocable after a partial failure.
        if !self.is_running(name)? {
            return Ok(());
        }
        self.run(&["kill-session", "-t", name])?;
        Ok(())
    }

    fn is_running(&self, name: &str) -> Result<bool, SessionError> {
        match self.run(&["has-session", "-t", name]) {
            Ok(_) => Ok(true),
            Err(SessionError::CommandFailed { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn attach(&self, name: &str) -> Result<(), SessionError> {
        if !self.is_running(name)? {
            return Err(SessionError::NotRunning {
                name: name.to_string(),
            });
        }
        let status = Command::new(&self.binary)
            .args(["attach-session", "-t", name])
            .status()
            .map_err(|err| SessionError::NotAvailable {
                message: format!("{}: {err}", self.binary),
            })?;
        if !status.success() {
            return Err(SessionError::CommandFailed {
                command: format!("{} attach-session -t {name}", self.binary),
                stderr: format!("exit status {:?}", status.code()),
            });
        }
        Ok(())
    }

    fn peek(&self, name: &str) -> Result<String, SessionError> {
        if !self.is_running(name)? {
            return Err(SessionError::NotRunning {
                name: name.to_string(),
            });
        }
        self.run(&["capture-pane", "-p", "-t", name])
    }

    fn send_keys(&self, name: &str, text: &str) -> Result<(), SessionError> {
        if !self.is_running(name)? {
            return Err(SessionError::NotRunning {
                name: name.to_string(),
            });
        }
        self.run(&["send-keys", "-t", name, text, "C-m"])?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, SessionError> {
        let raw = match self.run(&["list-sessions", "-F", "#{session_name}"]) {
            Ok(raw) => raw,
            // tmux exits non-zero when no server is running; that is an
            // empty list, not a failure.
            Err(SessionError::CommandFailed { .. }) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        Ok(raw
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmux_core::session::Sessions;

    #[test]
    fn missing_binary_maps_to_not_available() {
        let tmux = TmuxSessions::new("/definitely/missing/tmux");
        assert!(!tmux.is_available());

        let err = tmux.is_running("any").expect_err("missing binary");
        assert!(matches!(err, SessionError::NotAvailable { .. }));
    }

    #[test]
    fn session_lifecycle_when_tmux_is_installed() {
        let tmux = TmuxSessions::default();
        if !tmux.is_available() {
            return;
        }

        let name = format!(
            "taskmux-test-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        );
        let cwd = std::env::temp_dir();

        assert!(!tmux.is_running(&name).expect("not running yet"));
        tmux.start(&name, &cwd, "sleep 30").expect("start session");
        assert!(tmux.is_running(&name).expect("running"));
        assert!(tmux.list().expect("list").contains(&name));

        tmux.stop(&name).expect("stop");
        assert!(!tmux.is_running(&name).expect("stopped"));
        // Second stop is a no-op success.
        tmux.stop(&name).expect("stop again");
    }

    #[test]
    fn peek_and_send_require_a_running_session() {
        let tmux = TmuxSessions::default();
        if !tmux.is_available() {
            return;
        }

        let err = tmux.peek("taskmux-test-absent").expect_err("absent");
        assert!(matches!(err, SessionError::NotRunning { .. }));

        let err = tmux
            .send_keys("taskmux-test-absent", "echo hi")
            .expect_err("absent");
        assert!(matches!(err, SessionError::NotRunning { .. }));
    }
}
