//! Sqlite-backed task repository.
//!
//! Tasks are stored as a JSON payload plus denormalized status/timestamp
//! columns for filtering. A payload that no longer parses is surfaced as a
//! blocked task with a `corrupted:` reason instead of poisoning every list.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use taskmux_core::status::TaskStatus;
use taskmux_core::store::{Event, StoreError, TaskStore};
use taskmux_core::types::{Task, TaskKey, CORRUPTED_BLOCK_PREFIX};

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend {
        message: err.to_string(),
    }
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(backend)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn migrate(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(
                r#"
CREATE TABLE IF NOT EXISTS tasks (
    namespace TEXT NOT NULL,
    task_id INTEGER NOT NULL,
    status_tag TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (namespace, task_id)
);

CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(namespace, status_tag);

CREATE TABLE IF NOT EXISTS events (
    event_id INTEGER PRIMARY KEY AUTOINCREMENT,
    namespace TEXT,
    task_id INTEGER,
    at TEXT NOT NULL,
    payload_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_task ON events(namespace, task_id, at);
"#,
            )
            .map_err(backend)
    }

    /// Decode a stored payload, degrading a parse failure into a blocked
    /// placeholder record rather than an error.
    fn decode_row(
        key: &TaskKey,
        status_tag: &str,
        payload_json: &str,
        created_at: &str,
        updated_at: &str,
    ) -> Task {
        match serde_json::from_str::<Task>(payload_json) {
            Ok(task) => task,
            Err(err) => {
                let mut task = Task::new(key.id, key.namespace.clone(), "(unreadable record)");
                task.status = status_tag.parse().unwrap_or(TaskStatus::Error);
                task.block_reason = Some(format!("{CORRUPTED_BLOCK_PREFIX} {err}"));
                if let Ok(at) = created_at.parse() {
                    task.created_at = at;
                }
                if let Ok(at) = updated_at.parse() {
                    task.updated_at = at;
                }
                task
            }
        }
    }
}

impl TaskStore for SqliteStore {
    fn get(&self, key: &TaskKey) -> Result<Option<Task>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT status_tag, payload_json, created_at, updated_at
                 FROM tasks WHERE namespace = ?1 AND task_id = ?2",
                params![key.namespace, key.id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(backend)?;

        Ok(row.map(|(status_tag, payload, created_at, updated_at)| {
            Self::decode_row(key, &status_tag, &payload, &created_at, &updated_at)
        }))
    }

    fn list(&self, namespace: &str) -> Result<Vec<Task>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT task_id, status_tag, payload_json, created_at, updated_at
                 FROM tasks WHERE namespace = ?1 ORDER BY task_id",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![namespace], |row| {
                Ok((
                    row.get::<_, u64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(backend)?;

        let mut tasks = Vec::new();
        for row in rows {
            let (id, status_tag, payload, created_at, updated_at) = row.map_err(backend)?;
            let key = TaskKey::new(namespace, id);
            tasks.push(Self::decode_row(
                &key, &status_tag, &payload, &created_at, &updated_at,
            ));
        }
        Ok(tasks)
    }

    fn save(&self, task: &Task) -> Result<(), StoreError> {
        let payload = serde_json::to_string(task).map_err(backend)?;
        self.conn
            .execute(
                r#"
INSERT INTO tasks (namespace, task_id, status_tag, payload_json, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(namespace, task_id) DO UPDATE SET
  status_tag = excluded.status_tag,
  payload_json = excluded.payload_json,
  updated_at = excluded.updated_at
"#,
                params![
                    task.namespace,
                    task.id,
                    task.status.as_str(),
                    payload,
                    task.created_at.to_rfc3339(),
                    task.updated_at.to_rfc3339(),
                ],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn delete(&self, key: &TaskKey) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute(
                "DELETE FROM tasks WHERE namespace = ?1 AND task_id = ?2",
                params![key.namespace, key.id],
            )
            .map_err(backend)?;
        Ok(changed > 0)
    }

    fn next_id(&self, namespace: &str) -> Result<u64, StoreError> {
        let max: u64 = self
            .conn
            .query_row(
                "SELECT COALESCE(MAX(task_id), 0) FROM tasks WHERE namespace = ?1",
                params![namespace],
                |row| row.get(0),
            )
            .map_err(backend)?;
        Ok(max + 1)
    }

    fn append_event(&self, event: &Event) -> Result<(), StoreError> {
        let payload = serde_json::to_string(event).map_err(backend)?;
        let (namespace, task_id) = match &event.task {
            Some(key) => (Some(key.namespace.as_str()), Some(key.id)),
            None => (None, None),
        };
        self.conn
            .execute(
                "INSERT INTO events (namespace, task_id, at, payload_json)
                 VALUES (?1, ?2, ?3, ?4)",
                params![namespace, task_id, event.at.to_rfc3339(), payload],
            )
            .map_err(backend)?;
        Ok(())
    }

    fn events_for(&self, key: &TaskKey) -> Result<Vec<Event>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT payload_json FROM events
                 WHERE namespace = ?1 AND task_id = ?2 ORDER BY event_id",
            )
            .map_err(backend)?;
        let rows = stmt
            .query_map(params![key.namespace, key.id], |row| {
                row.get::<_, String>(0)
            })
            .map_err(backend)?;

        let mut events = Vec::new();
        for row in rows {
            let payload = row.map_err(backend)?;
            events.push(serde_json::from_str(&payload).map_err(backend)?);
        }
        Ok(events)
    }
}
