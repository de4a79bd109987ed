//! Deterministic derivation of branch, worktree and session names from a
//! task, and the inverse branch parse used for current-task detection.

use std::path::{Path, PathBuf};

pub const WORKTREE_ROOT: &str = ".taskmux/worktrees";
const BRANCH_TASK_PREFIX: &str = "task-";
const SESSION_PREFIX: &str = "tm";
const ISSUE_SEGMENT: &str = "-gh-";

/// Namespaces are flat tokens: they become path and session-name segments,
/// so separators and whitespace are rejected at creation time.
pub fn is_valid_namespace(namespace: &str) -> bool {
    !namespace.is_empty()
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && !namespace.starts_with('-')
}

/// Branch name for a task, optionally folding in a linked issue number.
///
/// `default/task-7`, `default/task-7-gh-42`.
pub fn branch_name(namespace: &str, id: u64, issue: Option<u64>) -> String {
    match issue {
        Some(issue) => format!("{namespace}/{BRANCH_TASK_PREFIX}{id}{ISSUE_SEGMENT}{issue}"),
        None => format!("{namespace}/{BRANCH_TASK_PREFIX}{id}"),
    }
}

/// Inverse of [`branch_name`]: recover `(namespace, task id)` from a branch.
///
/// Returns `None` for branches that do not follow the convention, so callers
/// can silently skip foreign branches when scanning.
pub fn parse_branch(branch: &str) -> Option<(String, u64)> {
    let (namespace, rest) = branch.rsplit_once('/')?;
    if namespace.is_empty() {
        return None;
    }
    let rest = rest.strip_prefix(BRANCH_TASK_PREFIX)?;
    let digits_end = rest
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    if digits_end == 0 {
        return None;
    }
    // Anything after the digits must be the issue segment.
    let tail = &rest[digits_end..];
    if !tail.is_empty() {
        let issue = tail.strip_prefix(ISSUE_SEGMENT)?;
        if issue.is_empty() || !issue.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
    }
    let id: u64 = rest[..digits_end].parse().ok()?;
    if id == 0 {
        return None;
    }
    Some((namespace.to_string(), id))
}

/// Directory name for the task's worktree under [`WORKTREE_ROOT`].
pub fn worktree_dir_name(namespace: &str, id: u64) -> String {
    format!("{namespace}-{id}")
}

/// Absolute worktree path for a task inside a repository.
pub fn worktree_path(repo_root: &Path, namespace: &str, id: u64) -> PathBuf {
    repo_root
        .join(WORKTREE_ROOT)
        .join(worktree_dir_name(namespace, id))
}

/// Check whether a worktree directory name matches the derived convention
/// for `namespace`; used by prune to spot orphans.
pub fn parse_worktree_dir_name(name: &str, namespace: &str) -> Option<u64> {
    let rest = name.strip_prefix(namespace)?.strip_prefix('-')?;
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let id: u64 = rest.parse().ok()?;
    if id == 0 {
        return None;
    }
    Some(id)
}

/// tmux session hosting the task's work agent.
pub fn work_session_name(namespace: &str, id: u64) -> String {
    format!("{SESSION_PREFIX}-{namespace}-{id}")
}

/// tmux session hosting the task's review agent.
pub fn review_session_name(namespace: &str, id: u64) -> String {
    format!("{}-review", work_session_name(namespace, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn branch_name_with_and_without_issue() {
        assert_eq!(branch_name("default", 7, None), "default/task-7");
        assert_eq!(branch_name("default", 7, Some(42)), "default/task-7-gh-42");
    }

    #[test]
    fn parse_branch_round_trips_for_valid_pairs() {
        for id in [1u64, 9, 10, 12345] {
            for issue in [None, Some(0u64), Some(7), Some(99999)] {
                let branch = branch_name("default", id, issue);
                let parsed = parse_branch(&branch)
                    .unwrap_or_else(|| panic!("branch {branch} should parse"));
                assert_eq!(parsed, ("default".to_string(), id));
            }
        }
    }

    #[test]
    fn namespace_validation_rejects_separator_characters() {
        assert!(is_valid_namespace("default"));
        assert!(is_valid_namespace("team_payments"));
        assert!(is_valid_namespace("ns-2"));
        assert!(!is_valid_namespace(""));
        assert!(!is_valid_namespace("team/payments"));
        assert!(!is_valid_namespace("has space"));
        assert!(!is_valid_namespace("-leading"));
    }

    #[test]
    fn parse_branch_rejects_foreign_branches() {
        assert_eq!(parse_branch("main"), None);
        assert_eq!(parse_branch("feature/login"), None);
        assert_eq!(parse_branch("default/task-"), None);
        assert_eq!(parse_branch("default/task-0"), None);
        assert_eq!(parse_branch("default/task-7x"), None);
        assert_eq!(parse_branch("default/task-7-gh-"), None);
        assert_eq!(parse_branch("default/task-7-issue-9"), None);
        assert_eq!(parse_branch("/task-7"), None);
    }

    #[test]
    fn worktree_path_is_rooted_under_repo() {
        let path = worktree_path(Path::new("/repo"), "default", 7);
        assert_eq!(path, Path::new("/repo/.taskmux/worktrees/default-7"));
    }

    #[test]
    fn worktree_dir_name_parse_round_trips() {
        let name = worktree_dir_name("default", 31);
        assert_eq!(parse_worktree_dir_name(&name, "default"), Some(31));
        assert_eq!(parse_worktree_dir_name("default-abc", "default"), None);
        assert_eq!(parse_worktree_dir_name("other-7", "default"), None);
        assert_eq!(parse_worktree_dir_name("default-0", "default"), None);
    }

    #[test]
    fn session_names_are_distinct_per_role() {
        assert_eq!(work_session_name("default", 7), "tm-default-7");
        assert_eq!(review_session_name("default", 7), "tm-default-7-review");
    }
}
