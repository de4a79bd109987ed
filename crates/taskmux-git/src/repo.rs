//! Repository discovery and branch-level operations.

use std::path::{Path, PathBuf};

use crate::command::GitCli;
use crate::error::GitError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    pub root: PathBuf,
}

/// Resolve the repository containing `start_path`.
pub fn discover_repo(start_path: &Path, git: &GitCli) -> Result<RepoHandle, GitError> {
    let inside = match git.run(start_path, ["rev-parse", "--is-inside-work-tree"]) {
        Ok(output) => output.stdout.trim() == "true",
        Err(GitError::Failed { .. }) => false,
        Err(err) => return Err(err),
    };
    if !inside {
        return Err(GitError::NotARepository {
            path: start_path.to_path_buf(),
        });
    }

    let raw = git.run(start_path, ["rev-parse", "--show-toplevel"])?;
    Ok(RepoHandle {
        root: PathBuf::from(raw.stdout.trim()),
    })
}

pub fn current_branch(repo: &RepoHandle, git: &GitCli) -> Result<String, GitError> {
    let output = git.run(&repo.root, ["rev-parse", "--abbrev-ref", "HEAD"])?;
    Ok(output.stdout.trim().to_string())
}

/// True when the given working directory has staged or unstaged changes.
pub fn has_uncommitted_changes(dir: &Path, git: &GitCli) -> Result<bool, GitError> {
    let output = git.run(dir, ["status", "--porcelain"])?;
    Ok(!output.stdout.trim().is_empty())
}

/// Like [`has_uncommitted_changes`], but ignores untracked files. Used where
/// untracked metadata (worktrees, scripts, the task store) must not count as
/// dirt.
pub fn has_tracked_changes(dir: &Path, git: &GitCli) -> Result<bool, GitError> {
    let output = git.run(dir, ["status", "--porcelain", "--untracked-files=no"])?;
    Ok(!output.stdout.trim().is_empty())
}

pub fn branch_exists(repo: &RepoHandle, git: &GitCli, branch: &str) -> Result<bool, GitError> {
    git.run_check(
        &repo.root,
        ["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")],
    )
}

pub fn list_branches(repo: &RepoHandle, git: &GitCli) -> Result<Vec<String>, GitError> {
    let output = git.run(
        &repo.root,
        ["for-each-ref", "--format=%(refname:short)", "refs/heads"],
    )?;
    Ok(output
        .stdout
        .lines()
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .collect())
}

/// Create `branch` at `start_point` without checking it out.
pub fn create_branch(
    repo: &RepoHandle,
    git: &GitCli,
    branch: &str,
    start_point: &str,
) -> Result<(), GitError> {
    git.run(&repo.root, ["branch", branch, start_point])?;
    Ok(())
}

/// Force-delete a local branch.
pub fn delete_branch(repo: &RepoHandle, git: &GitCli, branch: &str) -> Result<(), GitError> {
    git.run(&repo.root, ["branch", "-D", branch])?;
    Ok(())
}

/// Merge `branch` into the currently checked-out branch with a merge commit.
///
/// On a failed merge the in-progress merge is aborted (best effort) before
/// returning, so the working tree is left as it was.
pub fn merge_no_ff(
    repo: &RepoHandle,
    git: &GitCli,
    branch: &str,
    into: &str,
    message: &str,
) -> Result<(), GitError> {
    match git.run(&repo.root, ["merge", "--no-ff", "-m", message, branch]) {
        Ok(_) => Ok(()),
        Err(GitError::Failed { stdout, stderr, .. }) => {
            let _ = git.run(&repo.root, ["merge", "--abort"]);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            Err(GitError::MergeFailed {
                branch: branch.to_string(),
                into: into.to_string(),
                detail,
            })
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        std::env::temp_dir().join(format!("taskmux-repo-{prefix}-{now}"))
    }

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

    fn commit_all(cwd: &Path, message: &str) {
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

    fn init_repo() -> RepoHandle {
        let root = unique_temp_dir("repo");
        fs::create_dir_all(&root).expect("create repo dir");
        run_git(&root, &["init", "-b", "main"]);
        run_git(&root, &["config", "user.name", "Test"]);
        run_git(&root, &["config", "user.email", "test@example.com"]);
        fs::write(root.join("README.md"), "init\n").expect("write file");
        commit_all(&root, "init");
        RepoHandle { root }
    }

    #[test]
    fn discover_repo_finds_root_from_nested_path() {
        let repo = init_repo();
        let nested = repo.root.join("a/b");
        fs::create_dir_all(&nested).expect("create nested");

        let git = GitCli::default();
        let found = discover_repo(&nested, &git).expect("discover");
        assert_eq!(found.root, repo.root);

        let _ = fs::remove_dir_all(&repo.root);
    }

    #[test]
    fn discover_repo_rejects_plain_directories() {
        let dir = unique_temp_dir("plain");
        fs::create_dir_all(&dir).expect("create plain dir");

        let git = GitCli::default();
        let err = discover_repo(&dir, &git).expect_err("plain dir");
        assert!(matches!(err, GitError::NotARepository { path } if path == dir));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn branch_lifecycle_create_list_exists_delete() {
        let repo = init_repo();
        let git = GitCli::default();

        assert!(!branch_exists(&repo, &git, "default/task-1").expect("exists"));
        create_branch(&repo, &git, "default/task-1", "main").expect("create");
        assert!(branch_exists(&repo, &git, "default/task-1").expect("exists"));

        let branches = list_branches(&repo, &git).expect("list");
        assert!(branches.contains(&"default/task-1".to_string()));
        assert!(branches.contains(&"main".to_string()));

        delete_branch(&repo, &git, "default/task-1").expect("delete");
        assert!(!branch_exists(&repo, &git, "default/task-1").expect("exists"));

        let _ = fs::remove_dir_all(&repo.root);
    }

    #[test]
    fn uncommitted_changes_detection() {
        let repo = init_repo();
        let git = GitCli::default();

        assert!(!has_uncommitted_changes(&repo.root, &git).expect("clean"));
        fs::write(repo.root.join("dirty.txt"), "change\n").expect("write");
        assert!(has_uncommitted_changes(&repo.root, &git).expect("dirty"));

        let _ = fs::remove_dir_all(&repo.root);
    }

    #[test]
    fn tracked_changes_ignore_untracked_files() {
        let repo = init_repo();
        let git = GitCli::default();

        fs::create_dir_all(repo.root.join(".taskmux/scripts")).expect("metadata dir");
        fs::write(repo.root.join(".taskmux/scripts/tm-default-1.sh"), "#!/bin/sh\n")
            .expect("write");
        assert!(has_uncommitted_changes(&repo.root, &git).expect("untracked counts"));
        assert!(!has_tracked_changes(&repo.root, &git).expect("untracked ignored"));

        fs::write(repo.root.join("README.md"), "edited\n").expect("modify tracked");
        assert!(has_tracked_changes(&repo.root, &git).expect("tracked change counts"));

        let _ = fs::remove_dir_all(&repo.root);
    }

    #[test]
    fn merge_no_ff_creates_merge_commit() {
        let repo = init_repo();
        let git = GitCli::default();

        create_branch(&repo, &git, "default/task-2", "main").expect("create");
        run_git(&repo.root, &["checkout", "default/task-2"]);
        fs::write(repo.root.join("feature.txt"), "work\n").expect("write");
        commit_all(&repo.root, "feature work");
        run_git(&repo.root, &["checkout", "main"]);

        merge_no_ff(&repo, &git, "default/task-2", "main", "merge task 2").expect("merge");
        assert!(repo.root.join("feature.txt").exists());

        let _ = fs::remove_dir_all(&repo.root);
    }

    #[test]
    fn merge_no_ff_aborts_on_conflict_and_leaves_tree_clean() {
        let repo = init_repo();
        let git = GitCli::default();

        create_branch(&repo, &git, "default/task-3", "main").expect("create");
        run_git(&repo.root, &["checkout", "default/task-3"]);
        fs::write(repo.root.join("README.md"), "branch side\n").expect("write");
        commit_all(&repo.root, "branch change");
        run_git(&repo.root, &["checkout", "main"]);
        fs::write(repo.root.join("README.md"), "main side\n").expect("write");
        commit_all(&repo.root, "main change");

        let err = merge_no_ff(&repo, &git, "default/task-3", "main", "merge task 3")
            .expect_err("conflicting merge");
        assert!(matches!(err, GitError::MergeFailed { .. }));
        assert!(!has_uncommitted_changes(&repo.root, &git).expect("clean after abort"));

        let _ = fs::remove_dir_all(&repo.root);
    }
}
