//! Task repository contract and the event records persisted alongside tasks.
//!
//! The store is the single source of truth across process invocations. No
//! cross-process locking is assumed: callers re-read a task immediately
//! before mutating it, re-validate their guard, and write back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Comment, Task, TaskKey};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task not found: {key}")]
    NotFound { key: TaskKey },
    #[error("task record {key} is corrupt: {message}")]
    Corrupt { key: TaskKey, message: String },
    #[error("store backend error: {message}")]
    Backend { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TaskCreated,
    StatusChanged {
        from: String,
        to: String,
    },
    SessionStarted {
        session: String,
    },
    SessionEnded {
        session: String,
        exit_code: i32,
    },
    ReviewCompleted {
        lgtm: bool,
    },
    Merged {
        into: String,
    },
    Pruned {
        branch: String,
    },
}

/// One orchestration event, appended to the store for every observable
/// side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub task: Option<TaskKey>,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn for_task(key: TaskKey, kind: EventKind, at: DateTime<Utc>) -> Self {
        Self {
            task: Some(key),
            at,
            kind,
        }
    }
}

/// Durable task storage.
pub trait TaskStore {
    fn get(&self, key: &TaskKey) -> Result<Option<Task>, StoreError>;
    fn list(&self, namespace: &str) -> Result<Vec<Task>, StoreError>;
    fn save(&self, task: &Task) -> Result<(), StoreError>;
    fn delete(&self, key: &TaskKey) -> Result<bool, StoreError>;
    /// Allocate the next task ID in a namespace, starting at 1.
    fn next_id(&self, namespace: &str) -> Result<u64, StoreError>;
    fn append_event(&self, event: &Event) -> Result<(), StoreError>;
    fn events_for(&self, key: &TaskKey) -> Result<Vec<Event>, StoreError>;

    fn get_required(&self, key: &TaskKey) -> Result<Task, StoreError> {
        self.get(key)?.ok_or_else(|| StoreError::NotFound {
            key: key.clone(),
        })
    }

    /// Append a comment through a read-modify-write on the task record.
    fn append_comment(&self, key: &TaskKey, comment: Comment) -> Result<Task, StoreError> {
        let mut task = self.get_required(key)?;
        task.append_comment(comment);
        self.save(&task)?;
        Ok(task)
    }

    /// Edit the comment at `index` in place.
    fn edit_comment(
        &self,
        key: &TaskKey,
        index: usize,
        text: String,
        at: DateTime<Utc>,
    ) -> Result<Task, StoreError> {
        let mut task = self.get_required(key)?;
        task.edit_comment(index, text, at)
            .map_err(|message| StoreError::Backend { message })?;
        self.save(&task)?;
        Ok(task)
    }
}
