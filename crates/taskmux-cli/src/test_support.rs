//! Shared fakes and git fixtures for coordinator, poll and auto-fix tests.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};
use taskmux_core::run::{Clock, CommandOutput, CommandRunner, RunError};
use taskmux_core::session::{SessionError, Sessions};
use taskmux_git::{discover_repo, GitCli, RepoHandle};

pub fn run_git(cwd: &Path, args: &[&str]) {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
}

pub fn commit_all(cwd: &Path, message: &str) {
    run_git(cwd, &["add", "-A"]);
    run_git(
        cwd,
        &[
            "-c",
            "user.name=Test",
            "-c",
            "user.email=test@example.com",
            "commit",
            "-m",
            message,
        ],
    );
}

/// Fresh repo on `main` with one commit, rooted in a temp dir that cleans
/// itself up when dropped.
pub fn init_repo() -> (tempfile::TempDir, RepoHandle) {
    let tmp = tempfile::tempdir().expect("create temp dir");
    run_git(tmp.path(), &["init", "-b", "main"]);
    run_git(tmp.path(), &["config", "user.name", "Test"]);
    run_git(tmp.path(), &["config", "user.email", "test@example.com"]);
    std::fs::write(tmp.path().join("README.md"), "init\n").expect("write file");
    commit_all(tmp.path(), "init");
    let repo = discover_repo(tmp.path(), &GitCli::default()).expect("discover");
    (tmp, repo)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedSession {
    pub name: String,
    pub cwd: PathBuf,
    pub command: String,
}

/// In-memory stand-in for tmux. Tracks running sessions by name and records
/// every start for assertions.
#[derive(Debug, Default)]
pub struct FakeSessions {
    running: Mutex<Vec<String>>,
    started: Mutex<Vec<StartedSession>>,
    sent: Mutex<Vec<(String, String)>>,
    fail_next_start: Mutex<bool>,
}

impl FakeSessions {
    pub fn started(&self) -> Vec<StartedSession> {
        self.started.lock().expect("lock").clone()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("lock").clone()
    }

    pub fn fail_next_start(&self) {
        *self.fail_next_start.lock().expect("lock") = true;
    }

    /// Simulate a session dying outside our control.
    pub fn kill(&self, name: &str) {
        self.running.lock().expect("lock").retain(|s| s != name);
    }
}

impl Sessions for FakeSessions {
    fn start(&self, name: &str, cwd: &Path, command: &str) -> Result<(), SessionError> {
        if std::mem::take(&mut *self.fail_next_start.lock().expect("lock")) {
            return Err(SessionError::CommandFailed {
                command: "new-session".to_string(),
                stderr: "simulated tmux failure".to_string(),
            });
        }
        self.started.lock().expect("lock").push(StartedSession {
            name: name.to_string(),
            cwd: cwd.to_path_buf(),
            command: command.to_string(),
        });
        let mut running = self.running.lock().expect("lock");
        if !running.iter().any(|s| s == name) {
            running.push(name.to_string());
        }
        Ok(())
    }

    fn stop(&self, name: &str) -> Result<(), SessionError> {
        self.kill(name);
        Ok(())
    }

    fn is_running(&self, name: &str) -> Result<bool, SessionError> {
        Ok(self.running.lock().expect("lock").iter().any(|s| s == name))
    }

    fn attach(&self, name: &str) -> Result<(), SessionError> {
        if !self.is_running(name)? {
            return Err(SessionError::NotRunning {
                name: name.to_string(),
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
        Ok(format!("pane content of {name}\n"))
    }

    fn send_keys(&self, name: &str, text: &str) -> Result<(), SessionError> {
        if !self.is_running(name)? {
            return Err(SessionError::NotRunning {
                name: name.to_string(),
            });
        }
        self.sent
            .lock()
            .expect("lock")
            .push((name.to_string(), text.to_string()));
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, SessionError> {
        Ok(self.running.lock().expect("lock").clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub cwd: PathBuf,
}

/// Records command lines instead of executing them. Commands containing a
/// registered fail pattern exit 1; everything else exits 0 with empty output.
#[derive(Debug, Default)]
pub struct FakeRunner {
    invocations: Mutex<Vec<Invocation>>,
    fail_patterns: Mutex<Vec<String>>,
    outputs: Mutex<Vec<(String, String)>>,
}

impl FakeRunner {
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().expect("lock").clone()
    }

    pub fn fail_matching(&self, pattern: &str) {
        self.fail_patterns
            .lock()
            .expect("lock")
            .push(pattern.to_string());
    }

    /// Commands containing `pattern` produce `output` (exit 0).
    pub fn respond_matching(&self, pattern: &str, output: &str) {
        self.outputs
            .lock()
            .expect("lock")
            .push((pattern.to_string(), output.to_string()));
    }

    fn execute(&self, command: &str, cwd: &Path) -> CommandOutput {
        self.invocations.lock().expect("lock").push(Invocation {
            command: command.to_string(),
            cwd: cwd.to_path_buf(),
        });
        let failing = self
            .fail_patterns
            .lock()
            .expect("lock")
            .iter()
            .any(|pattern| command.contains(pattern));
        if failing {
            return CommandOutput {
                exit_code: Some(1),
                output: "simulated failure\n".to_string(),
            };
        }
        let output = self
            .outputs
            .lock()
            .expect("lock")
            .iter()
            .find(|(pattern, _)| command.contains(pattern))
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        CommandOutput {
            exit_code: Some(0),
            output,
        }
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, command: &str, cwd: &Path) -> Result<CommandOutput, RunError> {
        Ok(self.execute(command, cwd))
    }

    fn run_interactive(&self, command: &str, cwd: &Path) -> Result<CommandOutput, RunError> {
        Ok(self.execute(command, cwd))
    }
}

/// Deterministic clock starting at a fixed instant, advanced manually.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for FixedClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()),
        }
    }
}

impl FixedClock {
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().expect("lock");
        *now += Duration::seconds(secs);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("lock")
    }
}
