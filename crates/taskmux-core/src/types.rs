//! Core task data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::{ExecutionSubstate, TaskStatus};

pub const DEFAULT_NAMESPACE: &str = "default";

/// Prefix that marks a block reason as a parse failure rather than a
/// user-set block. Rendered distinctly and set by the store, never by users.
pub const CORRUPTED_BLOCK_PREFIX: &str = "corrupted:";

/// Store key for a task: namespace-qualified positive ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub namespace: String,
    pub id: u64,
}

impl TaskKey {
    pub fn new(namespace: impl Into<String>, id: u64) -> Self {
        Self {
            namespace: namespace.into(),
            id,
        }
    }
}

impl std::fmt::Display for TaskKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    #[default]
    Note,
    /// Sends the task back to `in_progress` for rework.
    RequestChanges,
    /// Review feedback recorded by the review pipeline.
    Review,
}

impl CommentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CommentKind::Note => "note",
            CommentKind::RequestChanges => "request_changes",
            CommentKind::Review => "review",
        }
    }
}

impl std::str::FromStr for CommentKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "note" => Ok(CommentKind::Note),
            "request_changes" => Ok(CommentKind::RequestChanges),
            "review" => Ok(CommentKind::Review),
            other => Err(format!(
                "invalid comment kind '{other}'. valid values: note, request_changes, review"
            )),
        }
    }
}

/// One comment on a task. Comments are append-only and keep their position;
/// editing replaces the text in place, never reorders or deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    #[serde(default)]
    pub kind: CommentKind,
    #[serde(default)]
    pub tags: Vec<String>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// One unit of orchestrated work, bound 1:1 to a branch, a worktree and a
/// terminal session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub namespace: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    /// Advisory only; never gates transitions.
    #[serde(default)]
    pub substate: Option<ExecutionSubstate>,
    /// May dangle; dangling parents are surfaced as display-only markers.
    #[serde(default)]
    pub parent_id: Option<u64>,
    /// Agent program bound to the active work session.
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    /// Branch the task branch was forked from and merges back into.
    #[serde(default)]
    pub base_branch: Option<String>,
    /// Externally-linked issue number, folded into the branch name.
    #[serde(default)]
    pub issue: Option<u64>,
    /// Set the instant the task first enters `in_progress`; never cleared.
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_review_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub review_count: u32,
    #[serde(default)]
    pub last_review_is_lgtm: bool,
    #[serde(default)]
    pub auto_fix_retry_count: u32,
    /// Non-empty prevents `start`. A `corrupted:` prefix marks a record the
    /// store could not parse.
    #[serde(default)]
    pub block_reason: Option<String>,
    /// Tri-state: task override, else the configured default.
    #[serde(default)]
    pub skip_review: Option<bool>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new task in `todo`.
    pub fn new(id: u64, namespace: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            namespace: namespace.into(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Todo,
            substate: None,
            parent_id: None,
            agent: None,
            model: None,
            base_branch: None,
            issue: None,
            started: None,
            last_review_at: None,
            review_count: 0,
            last_review_is_lgtm: false,
            auto_fix_retry_count: 0,
            block_reason: None,
            skip_review: None,
            labels: Vec::new(),
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> TaskKey {
        TaskKey::new(self.namespace.clone(), self.id)
    }

    pub fn with_issue(mut self, issue: u64) -> Self {
        self.issue = Some(issue);
        self
    }

    pub fn with_parent(mut self, parent_id: u64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn is_blocked(&self) -> bool {
        self.block_reason
            .as_deref()
            .map(|reason| !reason.trim().is_empty())
            .unwrap_or(false)
    }

    /// True when the block reason came from a store parse failure.
    pub fn is_corrupted(&self) -> bool {
        self.block_reason
            .as_deref()
            .map(|reason| reason.starts_with(CORRUPTED_BLOCK_PREFIX))
            .unwrap_or(false)
    }

    /// Resolve the tri-state skip-review flag against the configured default.
    pub fn resolved_skip_review(&self, default_skip: bool) -> bool {
        self.skip_review.unwrap_or(default_skip)
    }

    /// Record entry into `in_progress`. `started` is set only once.
    pub fn mark_started(&mut self, agent: Option<String>, model: Option<String>, at: DateTime<Utc>) {
        self.status = TaskStatus::InProgress;
        self.substate = Some(ExecutionSubstate::Running);
        if self.started.is_none() {
            self.started = Some(at);
        }
        self.agent = agent;
        self.model = model;
        self.updated_at = at;
    }

    /// Record a review verdict. LGTM resets the auto-fix counter; a non-LGTM
    /// verdict increments it only while auto-fix is enabled.
    pub fn record_review(&mut self, lgtm: bool, auto_fix_enabled: bool, at: DateTime<Utc>) {
        self.review_count += 1;
        self.last_review_at = Some(at);
        self.last_review_is_lgtm = lgtm;
        if lgtm {
            self.auto_fix_retry_count = 0;
        } else if auto_fix_enabled {
            self.auto_fix_retry_count += 1;
        }
        self.updated_at = at;
    }

    /// Clear the session binding on a work-session stop.
    pub fn clear_session_binding(&mut self, at: DateTime<Utc>) {
        self.agent = None;
        self.model = None;
        self.substate = None;
        self.updated_at = at;
    }

    pub fn append_comment(&mut self, comment: Comment) {
        self.updated_at = comment.created_at;
        self.comments.push(comment);
    }

    /// Replace the text of the comment at `index`. Out-of-range is an error;
    /// comments are never deleted or reordered.
    pub fn edit_comment(&mut self, index: usize, text: String, at: DateTime<Utc>) -> Result<(), String> {
        let len = self.comments.len();
        let comment = self
            .comments
            .get_mut(index)
            .ok_or_else(|| format!("comment index {index} out of range (have {len})"))?;
        comment.text = text;
        self.updated_at = at;
        Ok(())
    }

    /// Elapsed seconds since the task first entered `in_progress`.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        self.started.map(|started| (now - started).num_seconds())
    }
}
