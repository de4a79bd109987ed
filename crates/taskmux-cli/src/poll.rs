//! Single-shot, cancellable status watcher.
//!
//! Blocks the invoking process until a watched task changes status (or any
//! task reaches a target status), fires a templated command once, and exits.
//! The only long-lived loop in the tool; it must tear down promptly on
//! SIGINT/SIGTERM without firing.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use taskmux_core::run::{Clock, CommandRunner, RunError};
use taskmux_core::status::TaskStatus;
use taskmux_core::store::{StoreError, TaskStore};
use taskmux_core::types::TaskKey;

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error("unknown template field '{{{field}}}'")]
    UnknownField { field: String },
    #[error("bad command template: {message}")]
    BadTemplate { message: String },
    #[error("poll requires at least one task ID or a target status")]
    NothingToWatch,
}

/// What to watch. The two modes are mutually exclusive at the CLI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollMode {
    /// Fire on the first status change of any of the given tasks. When
    /// `expect` is set and a task's current status already differs at start,
    /// fire immediately with the expectation as the old status.
    Tasks {
        keys: Vec<TaskKey>,
        expect: Option<TaskStatus>,
    },
    /// Fire when any task in the namespace newly reaches `target`. Tasks
    /// already at `target` when the watch starts do not count.
    AnyReaching {
        namespace: String,
        target: TaskStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Fired { task: TaskKey, command: String },
    TimedOut,
    Cancelled,
}

/// Substitute `{field}` placeholders. Unknown fields and unclosed braces are
/// errors, never silent blanks.
pub fn render_template(template: &str, fields: &[(&str, String)]) -> Result<String, PollError> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        rendered.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            return Err(PollError::BadTemplate {
                message: format!("unclosed '{{' at byte {open}"),
            });
        };
        let field = &after[..close];
        let value = fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, value)| value.as_str())
            .ok_or_else(|| PollError::UnknownField {
                field: field.to_string(),
            })?;
        rendered.push_str(value);
        rest = &after[close + 1..];
    }
    rendered.push_str(rest);
    Ok(rendered)
}

pub struct PollWatcher<'a> {
    store: &'a dyn TaskStore,
    runner: &'a dyn CommandRunner,
    clock: &'a dyn Clock,
    interval: Duration,
    timeout: Duration,
    cancel: Arc<AtomicBool>,
    sleep: Box<dyn Fn(Duration) + 'a>,
}

impl<'a> PollWatcher<'a> {
    pub fn new(
        store: &'a dyn TaskStore,
        runner: &'a dyn CommandRunner,
        clock: &'a dyn Clock,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let sleep = {
            let cancel = Arc::clone(&cancel);
            Box::new(move |total: Duration| sliced_sleep(total, &cancel)) as Box<dyn Fn(Duration)>
        };
        Self {
            store,
            runner,
            clock,
            interval,
            timeout,
            cancel,
            sleep,
        }
    }

    /// Flag to wire up to SIGINT/SIGTERM. Setting it cancels the watch at
    /// the next sleep boundary.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Replace the sleep implementation, so tests can mutate the store and
    /// advance the clock between iterations instead of waiting.
    pub fn with_sleep(mut self, sleep: impl Fn(Duration) + 'a) -> Self {
        self.sleep = Box::new(sleep);
        self
    }

    /// Watch until something fires, the deadline passes, or a signal lands.
    /// The fired command is run once in `cwd` and its exit code is ignored.
    pub fn watch(
        &self,
        mode: &PollMode,
        template: &str,
        cwd: &Path,
    ) -> Result<PollOutcome, PollError> {
        match mode {
            PollMode::Tasks { keys, expect } => self.watch_tasks(keys, *expect, template, cwd),
            PollMode::AnyReaching { namespace, target } => {
                self.watch_any(namespace, *target, template, cwd)
            }
        }
    }

    fn watch_tasks(
        &self,
        keys: &[TaskKey],
        expect: Option<TaskStatus>,
        template: &str,
        cwd: &Path,
    ) -> Result<PollOutcome, PollError> {
        if keys.is_empty() {
            return Err(PollError::NothingToWatch);
        }

        let deadline = self.deadline();
        let mut baselines: HashMap<TaskKey, TaskStatus> = HashMap::new();

        for key in keys {
            let task = self.store.get_required(key)?;
            let baseline = expect.unwrap_or(task.status);
            // A supplied expectation the task has already left means the
            // change happened before we started watching.
            if task.status != baseline {
                return self.fire_change(key, baseline, task.status, template, cwd);
            }
            baselines.insert(key.clone(), baseline);
        }

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(PollOutcome::Cancelled);
            }
            let now = self.clock.now();
            if now >= deadline {
                return Ok(PollOutcome::TimedOut);
            }
            let remaining = (deadline - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(self.interval);
            (self.sleep)(remaining);
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(PollOutcome::Cancelled);
            }

            for key in keys {
                let task = self.store.get_required(key)?;
                let baseline = baselines[key];
                if task.status != baseline {
                    return self.fire_change(key, baseline, task.status, template, cwd);
                }
            }
        }
    }

    fn watch_any(
        &self,
        namespace: &str,
        target: TaskStatus,
        template: &str,
        cwd: &Path,
    ) -> Result<PollOutcome, PollError> {
        let deadline = self.deadline();
        let baseline: HashSet<u64> = self
            .store
            .list(namespace)?
            .into_iter()
            .filter(|task| task.status == target)
            .map(|task| task.id)
            .collect();

        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(PollOutcome::Cancelled);
            }
            let now = self.clock.now();
            if now >= deadline {
                return Ok(PollOutcome::TimedOut);
            }
            let remaining = (deadline - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(self.interval);
            (self.sleep)(remaining);
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(PollOutcome::Cancelled);
            }

            for task in self.store.list(namespace)? {
                if task.status == target && !baseline.contains(&task.id) {
                    let key = task.key();
                    let fields = [
                        ("id", task.id.to_string()),
                        ("namespace", task.namespace.clone()),
                        ("status", task.status.to_string()),
                    ];
                    return self.fire(&key, template, &fields, cwd);
                }
            }
        }
    }

    fn deadline(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Duration::from_std(self.timeout)
            .ok()
            .and_then(|timeout| self.clock.now().checked_add_signed(timeout))
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC)
    }

    fn fire_change(
        &self,
        key: &TaskKey,
        old: TaskStatus,
        new: TaskStatus,
        template: &str,
        cwd: &Path,
    ) -> Result<PollOutcome, PollError> {
        let fields = [
            ("id", key.id.to_string()),
            ("namespace", key.namespace.clone()),
            ("old_status", old.to_string()),
            ("new_status", new.to_string()),
        ];
        self.fire(key, template, &fields, cwd)
    }

    fn fire(
        &self,
        key: &TaskKey,
        template: &str,
        fields: &[(&str, String)],
        cwd: &Path,
    ) -> Result<PollOutcome, PollError> {
        let command = render_template(template, fields)?;
        // Fire-and-forget: a non-zero exit from the notification command is
        // the command's problem, not the watcher's.
        self.runner.run(&command, cwd)?;
        Ok(PollOutcome::Fired {
            task: key.clone(),
            command,
        })
    }
}

fn sliced_sleep(total: Duration, cancel: &AtomicBool) {
    const SLICE: Duration = Duration::from_millis(100);
    let mut left = total;
    while !left.is_zero() {
        if cancel.load(Ordering::SeqCst) {
            return;
        }
        let chunk = left.min(SLICE);
        std::thread::sleep(chunk);
        left -= chunk;
    }
}
