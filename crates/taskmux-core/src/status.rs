//! Task status and execution substate enums.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Created, no agent session yet.
    #[default]
    Todo,
    /// Agent session active in the task's worktree.
    InProgress,
    /// Agent is waiting for a human answer.
    NeedsInput,
    /// Work handed off to review.
    Reviewing,
    /// Review passed; ready to merge or already merged.
    Done,
    /// Session died unexpectedly. The task itself can be restarted.
    Error,
    /// Explicitly ended, with or without a merge.
    Closed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::NeedsInput => "needs_input",
            TaskStatus::Reviewing => "reviewing",
            TaskStatus::Done => "done",
            TaskStatus::Error => "error",
            TaskStatus::Closed => "closed",
        }
    }

    /// Terminal statuses. `Error` is terminal for the session only, so a
    /// task in `Error` is not terminal and may be restarted.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Closed)
    }

    /// Statuses from which `start` is legal (blocking aside).
    pub fn can_start(self) -> bool {
        matches!(self, TaskStatus::Todo | TaskStatus::Error)
    }

    /// Statuses from which `complete` is legal.
    pub fn can_complete(self) -> bool {
        matches!(self, TaskStatus::InProgress | TaskStatus::NeedsInput)
    }

    /// Statuses from which `merge` is legal.
    pub fn can_merge(self) -> bool {
        matches!(
            self,
            TaskStatus::Reviewing | TaskStatus::Done | TaskStatus::InProgress
        )
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "todo" => Ok(TaskStatus::Todo),
            "in_progress" => Ok(TaskStatus::InProgress),
            "needs_input" => Ok(TaskStatus::NeedsInput),
            "reviewing" => Ok(TaskStatus::Reviewing),
            "done" => Ok(TaskStatus::Done),
            "error" => Ok(TaskStatus::Error),
            "closed" => Ok(TaskStatus::Closed),
            other => Err(format!(
                "invalid task status '{other}'. valid values: todo, in_progress, needs_input, reviewing, done, error, closed"
            )),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advisory refinement of `InProgress`. Never gates a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionSubstate {
    Running,
    Idle,
    AwaitingPermission,
    AwaitingUser,
}

impl ExecutionSubstate {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionSubstate::Running => "running",
            ExecutionSubstate::Idle => "idle",
            ExecutionSubstate::AwaitingPermission => "awaiting_permission",
            ExecutionSubstate::AwaitingUser => "awaiting_user",
        }
    }
}

impl std::fmt::Display for ExecutionSubstate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
