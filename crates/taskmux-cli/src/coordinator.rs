//! Resource coordination: turns legal status transitions into idempotent
//! side effects against git, worktrees and terminal sessions.
//!
//! Consistency model: no cross-process locks. Every operation re-reads the
//! task from the store immediately before mutating, re-validates its guard
//! against the fresh copy, performs resource side effects, and persists the
//! new status last. A narrow lost-update window between concurrent writers
//! remains; in practice each task is driven by one pipeline at a time.

use std::path::{Path, PathBuf};

use taskmux_core::config::Settings;
use taskmux_core::naming;
use taskmux_core::run::{Clock, CommandRunner, RunError};
use taskmux_core::session::{SessionError, Sessions};
use taskmux_core::status::TaskStatus;
use taskmux_core::store::{Event, EventKind, StoreError, TaskStore};
use taskmux_core::types::{Task, TaskKey};
use taskmux_git::{
    branch_exists, current_branch, delete_branch, has_tracked_changes, has_uncommitted_changes,
    list_branches, merge_no_ff, GitCli, GitError, RepoHandle, WorktreeManager,
};
use taskmux_session::script::write_wrapper_script;

use crate::state_machine::{
    ensure_can_close, ensure_can_complete, ensure_can_merge, ensure_can_start, transition_task,
    StateMachineError,
};

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Run(#[from] RunError),
    #[error(transparent)]
    Machine(#[from] StateMachineError),
    #[error("worktree has uncommitted changes: {path}")]
    DirtyWorktree { path: PathBuf },
    #[error("pre-complete check failed ({command}) status={exit_code:?}:\n{output}")]
    PreCheckFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },
    #[error("worktree setup command failed ({command}):\n{output}")]
    SetupFailed { command: String, output: String },
    #[error("not on merge target branch: on '{current}', expected '{expected}'")]
    NotOnBaseBranch { current: String, expected: String },
    #[error("merge target branch '{branch}' has uncommitted changes")]
    DirtyBaseBranch { branch: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOutcome {
    pub task: Task,
    pub branch: String,
    pub worktree: PathBuf,
    pub session: String,
    pub reused_session: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteOutcome {
    pub task: Task,
    /// True when skip-review resolved true and the task went straight to done.
    pub skipped_review: bool,
    /// Review session name, when one was launched.
    pub review_session: Option<String>,
    /// Set when the review session failed to start. The task stays in
    /// `reviewing`; retrying the review launch is the caller's business.
    pub review_warning: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOutcome {
    pub session: String,
    pub was_running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneReason {
    TerminalTask,
    OrphanBranch,
    OrphanWorktree,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneItem {
    pub task_id: Option<u64>,
    pub branch: Option<String>,
    pub worktree: Option<PathBuf>,
    pub reason: PruneReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneReport {
    pub items: Vec<PruneItem>,
    /// False for a dry run.
    pub applied: bool,
}

pub struct Coordinator<'a> {
    store: &'a dyn TaskStore,
    sessions: &'a dyn Sessions,
    runner: &'a dyn CommandRunner,
    clock: &'a dyn Clock,
    git: GitCli,
    worktrees: WorktreeManager,
    repo: RepoHandle,
    settings: Settings,
    /// Binary path baked into generated exit-trap wrapper scripts.
    orchestrator_bin: String,
}

impl<'a> Coordinator<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: &'a dyn TaskStore,
        sessions: &'a dyn Sessions,
        runner: &'a dyn CommandRunner,
        clock: &'a dyn Clock,
        git: GitCli,
        repo: RepoHandle,
        settings: Settings,
        orchestrator_bin: impl Into<String>,
    ) -> Self {
        let worktrees = WorktreeManager::new(git.clone());
        Self {
            store,
            sessions,
            runner,
            clock,
            git,
            worktrees,
            repo,
            settings,
            orchestrator_bin: orchestrator_bin.into(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo.root
    }

    /// Launch the task's agent session: branch + worktree (reused when
    /// present), optional setup command, then a wrapped tmux session.
    pub fn start(&self, key: &TaskKey) -> Result<StartOutcome, CoordinatorError> {
        let mut task = self.store.get_required(key)?;
        ensure_can_start(&task)?;

        let branch = naming::branch_name(&task.namespace, task.id, task.issue);
        let base = self.resolve_base(&task)?;

        let worktree = self.worktrees.path_for(&self.repo, &task.namespace, task.id);
        if !self.worktrees.exists(&self.repo, &task.namespace, task.id) {
            if branch_exists(&self.repo, &self.git, &branch)? {
                self.worktrees.add(&self.repo, &task.namespace, task.id, &branch)?;
            } else {
                self.worktrees.add_with_new_branch(
                    &self.repo,
                    &task.namespace,
                    task.id,
                    &branch,
                    &base,
                )?;
            }

            if let Some(setup) = self.settings.commands.worktree_setup.as_deref() {
                let result = self.runner.run(setup, &worktree)?;
                if !result.success() {
                    return Err(CoordinatorError::SetupFailed {
                        command: setup.to_string(),
                        output: result.output,
                    });
                }
            }
        }

        let session = naming::work_session_name(&task.namespace, task.id);
        let reused_session = self.sessions.is_running(&session)?;
        if !reused_session {
            let wrapped = write_wrapper_script(
                &self.repo.root,
                &session,
                &self.orchestrator_bin,
                &task.namespace,
                task.id,
                &self.settings.agent.command,
                false,
            )?;
            self.sessions.start(&session, &worktree, &wrapped)?;
            self.record(Event::for_task(
                key.clone(),
                EventKind::SessionStarted {
                    session: session.clone(),
                },
                self.clock.now(),
            ))?;
        }

        let at = self.clock.now();
        let from = task.status;
        task.mark_started(
            Some(self.settings.agent.command.clone()),
            self.settings.agent.model.clone(),
            at,
        );
        if task.base_branch.is_none() {
            task.base_branch = Some(base);
        }
        self.store.save(&task)?;
        self.record_change(key, from, task.status)?;

        Ok(StartOutcome {
            branch,
            worktree,
            session,
            reused_session,
            task,
        })
    }

    /// Hand the task off to review (or straight to done when skip-review
    /// resolves true). The clean-worktree check always runs before any
    /// configured pre-complete command.
    pub fn complete(&self, key: &TaskKey) -> Result<CompleteOutcome, CoordinatorError> {
        let mut task = self.store.get_required(key)?;
        ensure_can_complete(&task)?;

        let worktree = self.worktrees.path_for(&self.repo, &task.namespace, task.id);
        if has_uncommitted_changes(&worktree, &self.git)? {
            return Err(CoordinatorError::DirtyWorktree { path: worktree });
        }

        if let Some(check) = self.settings.commands.pre_complete.as_deref() {
            let result = self.runner.run(check, &worktree)?;
            if !result.success() {
                return Err(CoordinatorError::PreCheckFailed {
                    command: check.to_string(),
                    exit_code: result.exit_code,
                    output: result.output,
                });
            }
        }

        let skip = task.resolved_skip_review(self.settings.review.skip_by_default);
        let to = if skip {
            TaskStatus::Done
        } else {
            TaskStatus::Reviewing
        };

        let at = self.clock.now();
        let change = transition_task(&mut task, to, at)?;
        self.store.save(&task)?;
        self.record_change(key, change.from, change.to)?;

        if skip {
            return Ok(CompleteOutcome {
                task,
                skipped_review: true,
                review_session: None,
                review_warning: None,
            });
        }

        // With auto-fix on the review runs synchronously in the invoking
        // process, so no review session is launched here.
        if self.settings.review.auto_fix {
            return Ok(CompleteOutcome {
                task,
                skipped_review: false,
                review_session: None,
                review_warning: None,
            });
        }

        // The task is committed to `reviewing` at this point; a review
        // session that fails to launch is reported, never rolled back.
        let review_session = naming::review_session_name(&task.namespace, task.id);
        let warning = match self.launch_review_session(&task, &review_session, &worktree) {
            Ok(()) => None,
            Err(err) => Some(format!(
                "failed to start review session '{review_session}': {err}"
            )),
        };

        Ok(CompleteOutcome {
            task,
            skipped_review: false,
            review_session: Some(review_session),
            review_warning: warning,
        })
    }

    fn launch_review_session(
        &self,
        task: &Task,
        session: &str,
        worktree: &Path,
    ) -> Result<(), CoordinatorError> {
        if self.sessions.is_running(session)? {
            return Ok(());
        }
        let wrapped = write_wrapper_script(
            &self.repo.root,
            session,
            &self.orchestrator_bin,
            &task.namespace,
            task.id,
            &self.settings.review.command,
            true,
        )?;
        self.sessions.start(session, worktree, &wrapped)?;
        self.record(Event::for_task(
            task.key(),
            EventKind::SessionStarted {
                session: session.to_string(),
            },
            self.clock.now(),
        ))?;
        Ok(())
    }

    /// Merge the task branch into its base branch and tear everything down.
    /// Preconditions (checked in order, nothing deleted on failure): legal
    /// status, current branch == target base, base worktree clean, merge ok.
    pub fn merge(
        &self,
        key: &TaskKey,
        base_override: Option<&str>,
    ) -> Result<Task, CoordinatorError> {
        let mut task = self.store.get_required(key)?;
        ensure_can_merge(&task)?;

        let target = match base_override {
            Some(target) => target.to_string(),
            None => self.resolve_base(&task)?,
        };

        let current = current_branch(&self.repo, &self.git)?;
        if current != target {
            return Err(CoordinatorError::NotOnBaseBranch {
                current,
                expected: target,
            });
        }
        // Untracked files are ignored here: the tool's own metadata under
        // `.taskmux/` (worktrees, wrapper scripts, the task store) lives in
        // the root working tree and must not block merges.
        if has_tracked_changes(&self.repo.root, &self.git)? {
            return Err(CoordinatorError::DirtyBaseBranch { branch: target });
        }

        let branch = naming::branch_name(&task.namespace, task.id, task.issue);
        let message = format!("Merge {branch} (task {})", task.key());
        merge_no_ff(&self.repo, &self.git, &branch, &target, &message)?;

        self.stop_sessions_best_effort(&task);
        self.worktrees
            .remove(&self.repo, &task.namespace, task.id, true)?;
        if branch_exists(&self.repo, &self.git, &branch)? {
            delete_branch(&self.repo, &self.git, &branch)?;
        }

        let at = self.clock.now();
        self.record(Event::for_task(
            key.clone(),
            EventKind::Merged {
                into: target.clone(),
            },
            at,
        ))?;

        let from = task.status;
        task.status = TaskStatus::Closed;
        task.clear_session_binding(at);
        self.store.save(&task)?;
        self.record_change(key, from, TaskStatus::Closed)?;
        Ok(task)
    }

    /// End the task without merging. Session stop and worktree removal are
    /// best-effort so close can be re-invoked after a partial failure; the
    /// branch is kept for `prune`.
    pub fn close(&self, key: &TaskKey) -> Result<Task, CoordinatorError> {
        let mut task = self.store.get_required(key)?;
        ensure_can_close(&task)?;

        self.stop_sessions_best_effort(&task);
        self.worktrees
            .remove(&self.repo, &task.namespace, task.id, true)?;

        let at = self.clock.now();
        let from = task.status;
        task.status = TaskStatus::Closed;
        task.clear_session_binding(at);
        self.store.save(&task)?;
        self.record_change(key, from, TaskStatus::Closed)?;
        Ok(task)
    }

    /// Stop the work or review session. Stopping an absent session is a
    /// no-op success; status never changes here.
    pub fn stop(&self, key: &TaskKey, review: bool) -> Result<StopOutcome, CoordinatorError> {
        let mut task = self.store.get_required(key)?;
        let session = if review {
            naming::review_session_name(&task.namespace, task.id)
        } else {
            naming::work_session_name(&task.namespace, task.id)
        };

        let was_running = self.sessions.is_running(&session)?;
        if was_running {
            self.sessions.stop(&session)?;
        }

        // A work-session stop releases the agent binding; a review-session
        // stop leaves the task untouched.
        if !review && (task.agent.is_some() || task.model.is_some() || task.substate.is_some()) {
            task.clear_session_binding(self.clock.now());
            self.store.save(&task)?;
        }

        Ok(StopOutcome {
            session,
            was_running,
        })
    }

    /// Self-reported session exit, invoked by the generated wrapper's EXIT
    /// trap. A review-session exit is recorded and otherwise ignored: the
    /// work session may still be alive and the review verdict travels
    /// through the review pipeline, not the exit code. For the work session,
    /// exit 0 leaves the status alone (an explicit `complete` already moved
    /// it, or the user detached cleanly); non-zero while `in_progress` or
    /// `needs_input` means the session died and the task goes to `error`.
    pub fn session_ended(
        &self,
        key: &TaskKey,
        exit_code: i32,
        review: bool,
    ) -> Result<(), CoordinatorError> {
        let Some(mut task) = self.store.get(key)? else {
            // The record may have been pruned while the session lingered.
            return Ok(());
        };

        let session = if review {
            naming::review_session_name(&task.namespace, task.id)
        } else {
            naming::work_session_name(&task.namespace, task.id)
        };
        let at = self.clock.now();
        self.record(Event::for_task(
            key.clone(),
            EventKind::SessionEnded { session, exit_code },
            at,
        ))?;
        if review {
            return Ok(());
        }

        let crashed = exit_code != 0
            && matches!(
                task.status,
                TaskStatus::InProgress | TaskStatus::NeedsInput
            );
        let from = task.status;
        if crashed {
            task.status = TaskStatus::Error;
        }
        task.clear_session_binding(at);
        self.store.save(&task)?;
        if crashed {
            self.record_change(key, from, TaskStatus::Error)?;
        }
        Ok(())
    }

    /// Delete branches/worktrees for terminal tasks, plus any branch or
    /// worktree matching the naming convention with no task record at all.
    pub fn prune(&self, namespace: &str, dry_run: bool) -> Result<PruneReport, CoordinatorError> {
        let tasks = self.store.list(namespace)?;
        let known: std::collections::HashMap<u64, &Task> =
            tasks.iter().map(|task| (task.id, task)).collect();

        let mut items = Vec::new();

        for task in &tasks {
            if !task.status.is_terminal() {
                continue;
            }
            let branch = naming::branch_name(namespace, task.id, task.issue);
            let branch_present = branch_exists(&self.repo, &self.git, &branch)?;
            let worktree_present = self.worktrees.exists(&self.repo, namespace, task.id);
            if !branch_present && !worktree_present {
                continue;
            }
            items.push(PruneItem {
                task_id: Some(task.id),
                branch: branch_present.then_some(branch),
                worktree: worktree_present
                    .then(|| self.worktrees.path_for(&self.repo, namespace, task.id)),
                reason: PruneReason::TerminalTask,
            });
        }

        for branch in list_branches(&self.repo, &self.git)? {
            let Some((ns, id)) = naming::parse_branch(&branch) else {
                continue;
            };
            if ns != namespace || known.contains_key(&id) {
                continue;
            }
            let worktree_present = self.worktrees.exists(&self.repo, namespace, id);
            items.push(PruneItem {
                task_id: None,
                branch: Some(branch),
                worktree: worktree_present
                    .then(|| self.worktrees.path_for(&self.repo, namespace, id)),
                reason: PruneReason::OrphanBranch,
            });
        }

        let covered: std::collections::HashSet<PathBuf> = items
            .iter()
            .filter_map(|item| item.worktree.clone())
            .collect();
        for (id, path) in self.worktrees.list_derived_dirs(&self.repo, namespace)? {
            if known.contains_key(&id) || covered.contains(&path) {
                continue;
            }
            items.push(PruneItem {
                task_id: None,
                branch: None,
                worktree: Some(path),
                reason: PruneReason::OrphanWorktree,
            });
        }

        if dry_run {
            return Ok(PruneReport {
                items,
                applied: false,
            });
        }

        for item in &items {
            if item.worktree.is_some() {
                let id = item
                    .task_id
                    .or_else(|| {
                        item.branch
                            .as_deref()
                            .and_then(naming::parse_branch)
                            .map(|(_, id)| id)
                    })
                    .or_else(|| {
                        item.worktree.as_deref().and_then(|path| {
                            path.file_name()
                                .and_then(|name| name.to_str())
                                .and_then(|name| naming::parse_worktree_dir_name(name, namespace))
                        })
                    });
                if let Some(id) = id {
                    self.worktrees.remove(&self.repo, namespace, id, true)?;
                }
            }
            if let Some(branch) = item.branch.as_deref() {
                delete_branch(&self.repo, &self.git, branch)?;
                self.record(Event {
                    task: item.task_id.map(|id| TaskKey::new(namespace, id)),
                    at: self.clock.now(),
                    kind: EventKind::Pruned {
                        branch: branch.to_string(),
                    },
                })?;
            }
        }

        Ok(PruneReport {
            items,
            applied: true,
        })
    }

    fn resolve_base(&self, task: &Task) -> Result<String, CoordinatorError> {
        if let Some(base) = task.base_branch.as_deref() {
            return Ok(base.to_string());
        }
        if let Some(base) = self.settings.base_branch.as_deref() {
            return Ok(base.to_string());
        }
        Ok(current_branch(&self.repo, &self.git)?)
    }

    fn stop_sessions_best_effort(&self, task: &Task) {
        let work = naming::work_session_name(&task.namespace, task.id);
        let review = naming::review_session_name(&task.namespace, task.id);
        let _ = self.sessions.stop(&work);
        let _ = self.sessions.stop(&review);
    }

    fn record_change(
        &self,
        key: &TaskKey,
        from: TaskStatus,
        to: TaskStatus,
    ) -> Result<(), StoreError> {
        self.record(Event::for_task(
            key.clone(),
            EventKind::StatusChanged {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            },
            self.clock.now(),
        ))
    }

    fn record(&self, event: Event) -> Result<(), StoreError> {
        self.store.append_event(&event)
    }
}

/// Resolve the task whose derived branch is checked out at `cwd`, if any.
pub fn detect_current_task(cwd: &Path, git: &GitCli) -> Option<(String, u64)> {
    let output = git.run(cwd, ["rev-parse", "--abbrev-ref", "HEAD"]).ok()?;
    naming::parse_branch(output.stdout.trim())
}
