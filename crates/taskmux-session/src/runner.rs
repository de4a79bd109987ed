//! Shell execution of configured commands (setup, pre-checks, poll hooks).

use std::path::Path;
use std::process::{Command, Stdio};

use taskmux_core::run::{CommandOutput, CommandRunner, RunError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRunner {
    pub shell: String,
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command: &str, cwd: &Path) -> Result<CommandOutput, RunError> {
        let rendered = format!("{} -c {command}", self.shell);
        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| RunError::Io {
                command: rendered.clone(),
                source,
            })?;

        let mut combined = String::from_utf8(output.stdout)
            .map_err(|_| RunError::NonUtf8Output {
                command: rendered.clone(),
            })?;
        let stderr = String::from_utf8(output.stderr).map_err(|_| RunError::NonUtf8Output {
            command: rendered,
        })?;
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        Ok(CommandOutput {
            exit_code: output.status.code(),
            output: combined,
        })
    }

    fn run_interactive(&self, command: &str, cwd: &Path) -> Result<CommandOutput, RunError> {
        let rendered = format!("{} -c {command}", self.shell);
        let status = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .current_dir(cwd)
            .status()
            .map_err(|source| RunError::Io {
                command: rendered,
                source,
            })?;

        Ok(CommandOutput {
            exit_code: status.code(),
            output: String::new(),
        })
    }
}
