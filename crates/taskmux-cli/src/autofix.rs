//! Bounded auto-fix retry loop layered on top of the review step.
//!
//! With auto-fix enabled a non-LGTM review sends the task back to
//! `in_progress` with the reviewer's feedback instead of waiting for a
//! human, up to a configured retry cap. The cap is checked before running a
//! review, so the limit is enforced without spending another review.

use std::path::Path;

use taskmux_core::naming;
use taskmux_core::run::{Clock, CommandRunner, RunError};
use taskmux_core::session::Sessions;
use taskmux_core::status::TaskStatus;
use taskmux_core::store::{Event, EventKind, StoreError, TaskStore};
use taskmux_core::types::{Comment, CommentKind, Task, TaskKey};

use crate::state_machine::{transition_task, StateMachineError};

/// Fixed textual prefix marking an approving review verdict.
pub const LGTM_PREFIX: &str = "LGTM";

pub fn is_lgtm(review_output: &str) -> bool {
    review_output.trim_start().starts_with(LGTM_PREFIX)
}

#[derive(Debug, thiserror::Error)]
pub enum AutoFixError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error(transparent)]
    Machine(#[from] StateMachineError),
    /// Sentinel: the retry budget is spent. Requires a human or a config
    /// change to proceed; never retried automatically.
    #[error("auto-fix retry limit reached ({count}/{max}); manual review required")]
    MaxRetriesReached { count: u32, max: u32 },
}

/// Produces a review verdict for a task's worktree.
pub trait Reviewer {
    fn review(&self, task: &Task, worktree: &Path) -> Result<String, RunError>;
}

/// Runs the configured review command in the worktree and treats the
/// combined output as the verdict text.
pub struct CommandReviewer<'a> {
    runner: &'a dyn CommandRunner,
    command: String,
}

impl<'a> CommandReviewer<'a> {
    pub fn new(runner: &'a dyn CommandRunner, command: impl Into<String>) -> Self {
        Self {
            runner,
            command: command.into(),
        }
    }
}

impl Reviewer for CommandReviewer<'_> {
    fn review(&self, _task: &Task, worktree: &Path) -> Result<String, RunError> {
        let result = self.runner.run(&self.command, worktree)?;
        Ok(result.output)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoFixOutcome {
    /// LGTM: the task moved to `done` and the retry counter reset.
    Approved { task: Task },
    /// Non-LGTM under the cap: the task reverted to `in_progress` with the
    /// reviewer's feedback recorded for the worker agent to act on.
    NeedsFix {
        task: Task,
        feedback: String,
        retries_used: u32,
    },
}

pub struct AutoFixSupervisor<'a> {
    store: &'a dyn TaskStore,
    reviewer: &'a dyn Reviewer,
    clock: &'a dyn Clock,
    max_retries: u32,
}

impl<'a> AutoFixSupervisor<'a> {
    pub fn new(
        store: &'a dyn TaskStore,
        reviewer: &'a dyn Reviewer,
        clock: &'a dyn Clock,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            reviewer,
            clock,
            max_retries,
        }
    }

    /// Run one synchronous review cycle on a task in `reviewing`.
    pub fn review_once(
        &self,
        key: &TaskKey,
        worktree: &Path,
    ) -> Result<AutoFixOutcome, AutoFixError> {
        let mut task = self.store.get_required(key)?;
        if task.status != TaskStatus::Reviewing {
            return Err(StateMachineError::WrongStatus {
                op: "review",
                status: task.status,
            }
            .into());
        }
        if task.auto_fix_retry_count >= self.max_retries {
            return Err(AutoFixError::MaxRetriesReached {
                count: task.auto_fix_retry_count,
                max: self.max_retries,
            });
        }

        let verdict = self.reviewer.review(&task, worktree)?;
        let lgtm = is_lgtm(&verdict);
        let at = self.clock.now();
        task.record_review(lgtm, true, at);
        self.store.append_event(&Event::for_task(
            key.clone(),
            EventKind::ReviewCompleted { lgtm },
            at,
        ))?;

        if lgtm {
            transition_task(&mut task, TaskStatus::Done, at)?;
            self.store.save(&task)?;
            return Ok(AutoFixOutcome::Approved { task });
        }

        transition_task(&mut task, TaskStatus::InProgress, at)?;
        task.append_comment(Comment {
            author: "reviewer".to_string(),
            kind: CommentKind::Review,
            tags: vec!["auto-fix".to_string()],
            text: verdict.clone(),
            created_at: at,
        });
        let retries_used = task.auto_fix_retry_count;
        self.store.save(&task)?;
        self.store.append_event(&Event::for_task(
            key.clone(),
            EventKind::StatusChanged {
                from: TaskStatus::Reviewing.as_str().to_string(),
                to: TaskStatus::InProgress.as_str().to_string(),
            },
            at,
        ))?;

        Ok(AutoFixOutcome::NeedsFix {
            task,
            feedback: verdict,
            retries_used,
        })
    }
}

/// Run the configured reviewer once with auto-fix disabled. The verdict is
/// recorded with manual semantics: LGTM moves the task to `done`, a
/// rejection records the feedback and leaves the task in `reviewing` with
/// the retry counter untouched.
pub fn run_manual_review(
    store: &dyn TaskStore,
    reviewer: &dyn Reviewer,
    clock: &dyn Clock,
    key: &TaskKey,
    worktree: &Path,
) -> Result<(Task, String), AutoFixError> {
    let task = store.get_required(key)?;
    if task.status != TaskStatus::Reviewing {
        return Err(StateMachineError::WrongStatus {
            op: "review",
            status: task.status,
        }
        .into());
    }

    let verdict = reviewer.review(&task, worktree)?;
    let lgtm = is_lgtm(&verdict);
    let task = apply_manual_verdict(store, clock, key, lgtm, (!lgtm).then_some(verdict.as_str()))?;
    Ok((task, verdict))
}

/// Best effort: type review feedback into the task's work session so the
/// agent can act on it. A missing session is ignored.
pub fn forward_feedback(sessions: &dyn Sessions, key: &TaskKey, feedback: &str) {
    let session = naming::work_session_name(&key.namespace, key.id);
    let _ = sessions.send_keys(&session, feedback);
}

/// Manual review verdict, used when auto-fix is off. LGTM moves the task to
/// `done`; a rejection records the verdict and leaves the task in
/// `reviewing` awaiting a human comment or request-changes.
pub fn apply_manual_verdict(
    store: &dyn TaskStore,
    clock: &dyn Clock,
    key: &TaskKey,
    lgtm: bool,
    feedback: Option<&str>,
) -> Result<Task, AutoFixError> {
    let mut task = store.get_required(key)?;
    if task.status != TaskStatus::Reviewing {
        return Err(StateMachineError::WrongStatus {
            op: "review",
            status: task.status,
        }
        .into());
    }

    let at = clock.now();
    task.record_review(lgtm, false, at);
    store.append_event(&Event::for_task(
        key.clone(),
        EventKind::ReviewCompleted { lgtm },
        at,
    ))?;

    if let Some(text) = feedback {
        task.append_comment(Comment {
            author: "reviewer".to_string(),
            kind: CommentKind::Review,
            tags: Vec::new(),
            text: text.to_string(),
            created_at: at,
        });
    }

    if lgtm {
        transition_task(&mut task, TaskStatus::Done, at)?;
        store.append_event(&Event::for_task(
            key.clone(),
            EventKind::StatusChanged {
                from: TaskStatus::Reviewing.as_str().to_string(),
                to: TaskStatus::Done.as_str().to_string(),
            },
            at,
        ))?;
    }
    store.save(&task)?;
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::SqliteStore;
    use crate::test_support::{FakeRunner, FakeSessions, FixedClock};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Replays scripted verdicts in order, repeating the last one.
    struct ScriptedReviewer {
        verdicts: RefCell<VecDeque<String>>,
    }

    impl ScriptedReviewer {
        fn new(verdicts: &[&str]) -> Self {
            Self {
                verdicts: RefCell::new(verdicts.iter().map(|s| s.to_string()).collect()),
            }
        }
    }

    impl Reviewer for ScriptedReviewer {
        fn review(&self, _task: &Task, _worktree: &Path) -> Result<String, RunError> {
            let mut verdicts = self.verdicts.borrow_mut();
            let verdict = verdicts.front().cloned().expect("scripted verdict");
            if verdicts.len() > 1 {
                verdicts.pop_front();
            }
            Ok(verdict)
        }
    }

    fn seed_reviewing(store: &SqliteStore, id: u64) -> TaskKey {
        let mut task = Task::new(id, "default", format!("Task {id}"));
        task.status = TaskStatus::Reviewing;
        store.save(&task).expect("seed");
        TaskKey::new("default", id)
    }

    #[test]
    fn lgtm_detection_uses_the_fixed_prefix() {
        assert!(is_lgtm("LGTM"));
        assert!(is_lgtm("LGTM: ship it"));
        assert!(is_lgtm("  LGTM with nits"));
        assert!(!is_lgtm("looks good to me"));
        assert!(!is_lgtm("not LGTM"));
    }

    #[test]
    fn approving_review_moves_to_done_and_resets_the_counter() {
        let store = SqliteStore::open_in_memory().expect("store");
        let clock = FixedClock::default();
        let key = seed_reviewing(&store, 1);
        let mut task = store.get_required(&key).unwrap();
        task.auto_fix_retry_count = 2;
        store.save(&task).unwrap();

        let reviewer = ScriptedReviewer::new(&["LGTM: clean diff"]);
        let supervisor = AutoFixSupervisor::new(&store, &reviewer, &clock, 3);

        let outcome = supervisor
            .review_once(&key, Path::new("."))
            .expect("review");
        let AutoFixOutcome::Approved { task } = outcome else {
            panic!("expected approval");
        };
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.auto_fix_retry_count, 0);
        assert!(task.last_review_is_lgtm);
        assert_eq!(task.review_count, 1);
    }

    #[test]
    fn rejection_under_the_cap_reverts_with_feedback() {
        let store = SqliteStore::open_in_memory().expect("store");
        let clock = FixedClock::default();
        let key = seed_reviewing(&store, 1);

        let reviewer = ScriptedReviewer::new(&["error handling is missing in the parser"]);
        let supervisor = AutoFixSupervisor::new(&store, &reviewer, &clock, 3);

        let outcome = supervisor
            .review_once(&key, Path::new("."))
            .expect("review");
        let AutoFixOutcome::NeedsFix {
            task,
            feedback,
            retries_used,
        } = outcome
        else {
            panic!("expected needs-fix");
        };
        assert_eq!(task.status, TaskStatus::InProgress);
        assert_eq!(retries_used, 1);
        assert!(feedback.contains("error handling"));
        assert_eq!(task.comments.len(), 1);
        assert_eq!(task.comments[0].kind, CommentKind::Review);
    }

    #[test]
    fn cap_is_enforced_before_running_another_review() {
        let store = SqliteStore::open_in_memory().expect("store");
        let clock = FixedClock::default();
        let key = seed_reviewing(&store, 1);
        let mut task = store.get_required(&key).unwrap();
        task.auto_fix_retry_count = 3;
        store.save(&task).unwrap();

        struct PanickingReviewer;
        impl Reviewer for PanickingReviewer {
            fn review(&self, _task: &Task, _worktree: &Path) -> Result<String, RunError> {
                panic!("cap must short-circuit before the review runs");
            }
        }

        let supervisor = AutoFixSupervisor::new(&store, &PanickingReviewer, &clock, 3);
        let err = supervisor
            .review_once(&key, Path::new("."))
            .expect_err("cap reached");
        assert!(matches!(
            err,
            AutoFixError::MaxRetriesReached { count: 3, max: 3 }
        ));
    }

    #[test]
    fn n_rejections_with_max_n_fail_on_the_next_cycle() {
        let store = SqliteStore::open_in_memory().expect("store");
        let clock = FixedClock::default();
        let key = seed_reviewing(&store, 1);

        let reviewer = ScriptedReviewer::new(&["needs more tests"]);
        let supervisor = AutoFixSupervisor::new(&store, &reviewer, &clock, 2);

        for round in 1..=2 {
            let outcome = supervisor
                .review_once(&key, Path::new("."))
                .expect("review");
            let AutoFixOutcome::NeedsFix { retries_used, .. } = outcome else {
                panic!("expected needs-fix");
            };
            assert_eq!(retries_used, round);

            // Worker iterates and completes again.
            let mut task = store.get_required(&key).unwrap();
            task.status = TaskStatus::Reviewing;
            store.save(&task).unwrap();
        }

        let err = supervisor
            .review_once(&key, Path::new("."))
            .expect_err("budget spent");
        assert!(matches!(err, AutoFixError::MaxRetriesReached { .. }));
    }

    #[test]
    fn lgtm_mid_sequence_resets_the_budget() {
        let store = SqliteStore::open_in_memory().expect("store");
        let clock = FixedClock::default();
        let key = seed_reviewing(&store, 1);

        let reviewer = ScriptedReviewer::new(&["nope", "LGTM"]);
        let supervisor = AutoFixSupervisor::new(&store, &reviewer, &clock, 2);

        supervisor.review_once(&key, Path::new(".")).expect("first");
        let mut task = store.get_required(&key).unwrap();
        task.status = TaskStatus::Reviewing;
        store.save(&task).unwrap();

        let outcome = supervisor
            .review_once(&key, Path::new("."))
            .expect("second");
        let AutoFixOutcome::Approved { task } = outcome else {
            panic!("expected approval");
        };
        assert_eq!(task.auto_fix_retry_count, 0);
    }

    #[test]
    fn review_requires_reviewing_status() {
        let store = SqliteStore::open_in_memory().expect("store");
        let clock = FixedClock::default();
        let task = Task::new(1, "default", "Task");
        store.save(&task).unwrap();

        let reviewer = ScriptedReviewer::new(&["LGTM"]);
        let supervisor = AutoFixSupervisor::new(&store, &reviewer, &clock, 3);
        let err = supervisor
            .review_once(&TaskKey::new("default", 1), Path::new("."))
            .expect_err("wrong status");
        assert!(matches!(
            err,
            AutoFixError::Machine(StateMachineError::WrongStatus { op: "review", .. })
        ));
    }

    #[test]
    fn command_reviewer_runs_the_configured_command_in_the_worktree() {
        let runner = FakeRunner::default();
        runner.respond_matching("claude-review", "LGTM: all good");
        let reviewer = CommandReviewer::new(&runner, "claude-review --diff");

        let task = Task::new(1, "default", "Task");
        let verdict = reviewer
            .review(&task, Path::new("/tmp/worktree"))
            .expect("review");
        assert!(is_lgtm(&verdict));
        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].command, "claude-review --diff");
        assert_eq!(invocations[0].cwd, Path::new("/tmp/worktree"));
    }

    #[test]
    fn manual_lgtm_moves_to_done_without_touching_the_retry_counter() {
        let store = SqliteStore::open_in_memory().expect("store");
        let clock = FixedClock::default();
        let key = seed_reviewing(&store, 1);

        let task =
            apply_manual_verdict(&store, &clock, &key, true, None).expect("verdict");
        assert_eq!(task.status, TaskStatus::Done);
        assert!(task.last_review_is_lgtm);
        assert_eq!(task.auto_fix_retry_count, 0);
    }

    #[test]
    fn manual_rejection_stays_in_reviewing_with_the_feedback_recorded() {
        let store = SqliteStore::open_in_memory().expect("store");
        let clock = FixedClock::default();
        let key = seed_reviewing(&store, 1);

        let task = apply_manual_verdict(&store, &clock, &key, false, Some("split this up"))
            .expect("verdict");
        assert_eq!(task.status, TaskStatus::Reviewing);
        assert_eq!(task.auto_fix_retry_count, 0);
        assert_eq!(task.comments.len(), 1);
        assert_eq!(task.comments[0].text, "split this up");
    }

    #[test]
    fn manual_review_rejection_stays_in_reviewing_without_counting_retries() {
        let store = SqliteStore::open_in_memory().expect("store");
        let clock = FixedClock::default();
        let key = seed_reviewing(&store, 1);

        let reviewer = ScriptedReviewer::new(&["missing error handling"]);
        for _ in 0..5 {
            let (task, verdict) =
                run_manual_review(&store, &reviewer, &clock, &key, Path::new(".")).expect("review");
            assert_eq!(task.status, TaskStatus::Reviewing);
            assert_eq!(task.auto_fix_retry_count, 0);
            assert!(!is_lgtm(&verdict));
        }

        let task = store.get_required(&key).unwrap();
        assert_eq!(task.review_count, 5);
        assert_eq!(task.comments.len(), 5);
        assert_eq!(task.comments[0].text, "missing error handling");
    }

    #[test]
    fn manual_review_lgtm_moves_to_done() {
        let store = SqliteStore::open_in_memory().expect("store");
        let clock = FixedClock::default();
        let key = seed_reviewing(&store, 1);

        let reviewer = ScriptedReviewer::new(&["LGTM: ship it"]);
        let (task, verdict) =
            run_manual_review(&store, &reviewer, &clock, &key, Path::new(".")).expect("review");
        assert_eq!(task.status, TaskStatus::Done);
        assert!(is_lgtm(&verdict));
        // No feedback comment is recorded for an approval.
        assert!(task.comments.is_empty());
    }

    #[test]
    fn feedback_is_typed_into_a_running_work_session() {
        let sessions = FakeSessions::default();
        sessions
            .start("tm-default-1", Path::new("."), "claude")
            .expect("start");
        let key = TaskKey::new("default", 1);

        forward_feedback(&sessions, &key, "fix the parser tests");
        assert_eq!(
            sessions.sent(),
            vec![("tm-default-1".to_string(), "fix the parser tests".to_string())]
        );
    }

    #[test]
    fn feedback_to_a_dead_work_session_is_dropped_silently() {
        let sessions = FakeSessions::default();
        let key = TaskKey::new("default", 1);

        forward_feedback(&sessions, &key, "fix the parser tests");
        assert!(sessions.sent().is_empty());
    }
}
