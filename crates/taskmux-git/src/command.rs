use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::GitError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Thin wrapper around the `git` binary. All higher-level operations go
/// through [`GitCli::run`] so error classification stays in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCli {
    pub binary: PathBuf,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("git"),
        }
    }
}

impl GitCli {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn run<I, S>(&self, cwd: &Path, args: I) -> Result<GitOutput, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let owned: Vec<OsString> = args
            .into_iter()
            .map(|arg| arg.as_ref().to_os_string())
            .collect();
        let rendered = render(&self.binary, &owned);

        let output = Command::new(&self.binary)
            .current_dir(cwd)
            .args(&owned)
            .output()
            .map_err(|source| GitError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        let stdout = String::from_utf8(output.stdout).map_err(|source| GitError::NonUtf8 {
            command: rendered.clone(),
            stream: "stdout",
            source,
        })?;
        let stderr = String::from_utf8(output.stderr).map_err(|source| GitError::NonUtf8 {
            command: rendered.clone(),
            stream: "stderr",
            source,
        })?;

        if !output.status.success() {
            return Err(GitError::Failed {
                command: rendered,
                status: output.status.code(),
                stdout,
                stderr,
            });
        }

        Ok(GitOutput { stdout, stderr })
    }

    /// Run a query where a non-zero exit means "no", not an error
    /// (e.g. `rev-parse --verify`).
    pub fn run_check<I, S>(&self, cwd: &Path, args: I) -> Result<bool, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        match self.run(cwd, args) {
            Ok(_) => Ok(true),
            Err(GitError::Failed { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

fn render(binary: &Path, args: &[OsString]) -> String {
    let mut rendered = binary.to_string_lossy().into_owned();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(&arg.to_string_lossy());
    }
    rendered
}
