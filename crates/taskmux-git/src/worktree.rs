//! Worktree management keyed by the derived per-task path.

use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use taskmux_core::naming;

use crate::command::GitCli;
use crate::error::GitError;
use crate::repo::RepoHandle;

/// One entry from `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub branch: Option<String>,
    pub head: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeManager {
    git: GitCli,
}

impl Default for WorktreeManager {
    fn default() -> Self {
        Self {
            git: GitCli::default(),
        }
    }
}

impl WorktreeManager {
    pub fn new(git: GitCli) -> Self {
        Self { git }
    }

    /// Derived worktree path for a task.
    pub fn path_for(&self, repo: &RepoHandle, namespace: &str, id: u64) -> PathBuf {
        naming::worktree_path(&repo.root, namespace, id)
    }

    pub fn exists(&self, repo: &RepoHandle, namespace: &str, id: u64) -> bool {
        self.path_for(repo, namespace, id).is_dir()
    }

    /// Add a worktree for an already-existing branch.
    pub fn add(
        &self,
        repo: &RepoHandle,
        namespace: &str,
        id: u64,
        branch: &str,
    ) -> Result<PathBuf, GitError> {
        let path = self.path_for(repo, namespace, id);
        self.ensure_root(repo)?;
        let args = vec![
            OsString::from("worktree"),
            OsString::from("add"),
            path.as_os_str().to_os_string(),
            OsString::from(branch),
        ];
        self.git.run(&repo.root, args)?;
        Ok(path)
    }

    /// Add a worktree, creating `branch` at `start_point` in the same step.
    pub fn add_with_new_branch(
        &self,
        repo: &RepoHandle,
        namespace: &str,
        id: u64,
        branch: &str,
        start_point: &str,
    ) -> Result<PathBuf, GitError> {
        let path = self.path_for(repo, namespace, id);
        self.ensure_root(repo)?;
        let args = vec![
            OsString::from("worktree"),
            OsString::from("add"),
            OsString::from("-b"),
            OsString::from(branch),
            path.as_os_str().to_os_string(),
            OsString::from(start_point),
        ];
        self.git.run(&repo.root, args)?;
        Ok(path)
    }

    /// Remove a task's worktree. Removing an absent worktree is a no-op so
    /// teardown stays re-invocable after a partial failure.
    pub fn remove(
        &self,
        repo: &RepoHandle,
        namespace: &str,
        id: u64,
        force: bool,
    ) -> Result<(), GitError> {
        if !self.exists(repo, namespace, id) {
            return Ok(());
        }
        let path = self.path_for(repo, namespace, id);
        let mut args = vec![OsString::from("worktree"), OsString::from("remove")];
        if force {
            args.push(OsString::from("--force"));
        }
        args.push(path.as_os_str().to_os_string());
        self.git.run(&repo.root, args)?;
        Ok(())
    }

    pub fn list(&self, repo: &RepoHandle) -> Result<Vec<WorktreeEntry>, GitError> {
        let output = self.git.run(&repo.root, ["worktree", "list", "--porcelain"])?;
        parse_porcelain(&output.stdout)
    }

    /// Worktree directory names under the derived root that match the naming
    /// convention for `namespace` (candidates for prune orphan detection).
    pub fn list_derived_dirs(
        &self,
        repo: &RepoHandle,
        namespace: &str,
    ) -> Result<Vec<(u64, PathBuf)>, GitError> {
        let root = repo.root.join(naming::WORKTREE_ROOT);
        let entries = match fs::read_dir(&root) {
            Ok(entries) => entries,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(GitError::Spawn {
                    command: format!("read_dir {}", root.display()),
                    source,
                })
            }
        };

        let mut found = Vec::new();
        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if let Some(id) = naming::parse_worktree_dir_name(name, namespace) {
                found.push((id, path));
            }
        }
        found.sort_by_key(|(id, _)| *id);
        Ok(found)
    }

    fn ensure_root(&self, repo: &RepoHandle) -> Result<(), GitError> {
        let root = repo.root.join(naming::WORKTREE_ROOT);
        fs::create_dir_all(&root).map_err(|source| GitError::Spawn {
            command: format!("create_dir_all {}", root.display()),
            source,
        })
    }
}

fn parse_porcelain(raw: &str) -> Result<Vec<WorktreeEntry>, GitError> {
    let mut entries = Vec::new();
    let mut path: Option<PathBuf> = None;
    let mut branch: Option<String> = None;
    let mut head: Option<String> = None;

    for line in raw.lines().chain(std::iter::once("")) {
        if line.trim().is_empty() {
            if let Some(path) = path.take() {
                entries.push(WorktreeEntry {
                    path,
                    branch: branch.take(),
                    head: head.take(),
                });
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("worktree ") {
            path = Some(PathBuf::from(rest.trim()));
        } else if let Some(rest) = line.strip_prefix("branch ") {
            branch = Some(rest.trim().trim_start_matches("refs/heads/").to_string());
        } else if let Some(rest) = line.strip_prefix("HEAD ") {
            head = Some(rest.trim().to_string());
        }
    }

    if entries.is_empty() && !raw.trim().is_empty() {
        return Err(GitError::Parse {
            context: "unparseable `git worktree list --porcelain` output".to_string(),
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::discover_repo;
    use std::path::Path;
    use std::process::Command;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn run_git(cwd: &Path, args: &[&str]) {
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

    fn init_repo() -> RepoHandle {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let root = std::env::temp_dir().join(format!("taskmux-wt-{now}"));
        fs::create_dir_all(&root).expect("create repo dir");
        run_git(&root, &["init", "-b", "main"]);
        fs::write(root.join("README.md"), "init\n").expect("write file");
        run_git(&root, &["add", "-A"]);
        run_git(
            &root,
            &[
                "-c",
                "user.name=Test",
                "-c",
                "user.email=test@example.com",
                "commit",
                "-m",
                "init",
            ],
        );
        discover_repo(&root, &GitCli::default()).expect("discover")
    }

    #[test]
    fn parse_porcelain_extracts_path_branch_and_head() {
        let raw = "worktree /repo\nHEAD 1234abcd\nbranch refs/heads/main\n\nworktree /repo/.taskmux/worktrees/default-1\nHEAD 5678ef01\nbranch refs/heads/default/task-1\n\n";
        let entries = parse_porcelain(raw).expect("parse");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].branch.as_deref(), Some("main"));
        assert_eq!(
            entries[1].path,
            PathBuf::from("/repo/.taskmux/worktrees/default-1")
        );
        assert_eq!(entries[1].branch.as_deref(), Some("default/task-1"));
    }

    #[test]
    fn parse_porcelain_rejects_garbage() {
        let err = parse_porcelain("not porcelain at all").expect_err("garbage");
        assert!(matches!(err, GitError::Parse { .. }));
    }

    #[test]
    fn add_with_new_branch_creates_worktree_and_branch() {
        let repo = init_repo();
        let manager = WorktreeManager::default();

        assert!(!manager.exists(&repo, "default", 1));
        let path = manager
            .add_with_new_branch(&repo, "default", 1, "default/task-1", "main")
            .expect("add worktree");
        assert!(path.is_dir());
        assert!(manager.exists(&repo, "default", 1));

        let entries = manager.list(&repo).expect("list");
        assert!(entries
            .iter()
            .any(|entry| entry.branch.as_deref() == Some("default/task-1")));

        let _ = fs::remove_dir_all(&repo.root);
    }

    #[test]
    fn remove_is_a_no_op_when_absent() {
        let repo = init_repo();
        let manager = WorktreeManager::default();

        manager
            .remove(&repo, "default", 99, true)
            .expect("absent worktree removal is fine");

        let _ = fs::remove_dir_all(&repo.root);
    }

    #[test]
    fn list_derived_dirs_filters_by_namespace_convention() {
        let repo = init_repo();
        let manager = WorktreeManager::default();

        manager
            .add_with_new_branch(&repo, "default", 2, "default/task-2", "main")
            .expect("add worktree");
        fs::create_dir_all(repo.root.join(naming::WORKTREE_ROOT).join("stray-dir"))
            .expect("create stray");

        let dirs = manager.list_derived_dirs(&repo, "default").expect("list");
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].0, 2);

        let _ = fs::remove_dir_all(&repo.root);
    }
}
