//! Task status transition table and guard checks.
//!
//! Every CLI operation validates here before the coordinator touches any
//! resource, so an illegal request mutates nothing.

use chrono::{DateTime, Utc};
use taskmux_core::status::TaskStatus;
use taskmux_core::types::Task;

#[derive(Debug, thiserror::Error)]
pub enum StateMachineError {
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
    #[error("cannot {op} a task in status '{status}'")]
    WrongStatus {
        op: &'static str,
        status: TaskStatus,
    },
    #[error("task is blocked: {reason}")]
    Blocked { reason: String },
    #[error("task is already closed")]
    AlreadyClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub at: DateTime<Utc>,
}

/// Check if a status transition is legal.
///
/// ```text
/// todo ──start──> in_progress <──────┐
///   error ──start──┘   │ ^           │ request-changes / auto-fix
///                      v │           │
///               needs_input          │
///                      │             │
///        complete      v             │
/// in_progress ────> reviewing ──LGTM──> done
///                      │
/// (merge: reviewing/done/in_progress ──> closed)
/// (close: any non-terminal ──> closed)
/// (session crash: in_progress/needs_input ──> error)
/// ```
pub fn is_transition_allowed(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;

    if from == to {
        return true;
    }

    match (from, to) {
        // start
        (Todo | Error, InProgress) => true,
        // agent pauses for input / resumes
        (InProgress, NeedsInput) | (NeedsInput, InProgress) => true,
        // complete, with or without review
        (InProgress | NeedsInput, Reviewing) => true,
        (InProgress | NeedsInput, Done) => true,
        // review verdicts
        (Reviewing, Done) => true,
        (Reviewing, InProgress) => true,
        // session crash
        (InProgress | NeedsInput, Error) => true,
        // merge and close
        (Todo | InProgress | NeedsInput | Reviewing | Error, Closed) => true,
        (Done, Closed) => true,
        _ => false,
    }
}

/// Apply a transition to a task, updating `updated_at`.
pub fn transition_task(
    task: &mut Task,
    to: TaskStatus,
    at: DateTime<Utc>,
) -> Result<StatusChange, StateMachineError> {
    let from = task.status;
    if !is_transition_allowed(from, to) {
        return Err(StateMachineError::InvalidTransition { from, to });
    }
    task.status = to;
    task.updated_at = at;
    Ok(StatusChange { from, to, at })
}

/// Guard for `start`: status must allow it and the task must not be blocked.
pub fn ensure_can_start(task: &Task) -> Result<(), StateMachineError> {
    if !task.status.can_start() {
        return Err(StateMachineError::WrongStatus {
            op: "start",
            status: task.status,
        });
    }
    if task.is_blocked() {
        return Err(StateMachineError::Blocked {
            reason: task
                .block_reason
                .clone()
                .unwrap_or_default(),
        });
    }
    Ok(())
}

pub fn ensure_can_complete(task: &Task) -> Result<(), StateMachineError> {
    if !task.status.can_complete() {
        return Err(StateMachineError::WrongStatus {
            op: "complete",
            status: task.status,
        });
    }
    Ok(())
}

pub fn ensure_can_merge(task: &Task) -> Result<(), StateMachineError> {
    if !task.status.can_merge() {
        return Err(StateMachineError::WrongStatus {
            op: "merge",
            status: task.status,
        });
    }
    Ok(())
}

/// Guard for `close`: re-closing is an explicit error, other terminal
/// statuses report the generic wrong-status error.
pub fn ensure_can_close(task: &Task) -> Result<(), StateMachineError> {
    match task.status {
        TaskStatus::Closed => Err(StateMachineError::AlreadyClosed),
        status if status.is_terminal() => Err(StateMachineError::WrongStatus {
            op: "close",
            status,
        }),
        _ => Ok(()),
    }
}
