//! `taskmux`: task orchestration over git branches, worktrees and tmux
//! sessions. Every invocation is a fresh short-lived process; all shared
//! state lives in the sqlite store under the repository root.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use taskmux_cli::autofix::{
    apply_manual_verdict, forward_feedback, is_lgtm, run_manual_review, AutoFixOutcome,
    AutoFixSupervisor, CommandReviewer,
};
use taskmux_cli::coordinator::{detect_current_task, Coordinator, PruneReason};
use taskmux_cli::persistence::SqliteStore;
use taskmux_cli::poll::{PollMode, PollOutcome, PollWatcher};
use taskmux_cli::state_machine::transition_task;
use taskmux_core::config::{load_settings, Settings};
use taskmux_core::naming;
use taskmux_core::run::{Clock, SystemClock};
use taskmux_core::session::Sessions;
use taskmux_core::status::TaskStatus;
use taskmux_core::store::{Event, EventKind, TaskStore};
use taskmux_core::types::{
    Comment, CommentKind, Task, TaskKey, CORRUPTED_BLOCK_PREFIX, DEFAULT_NAMESPACE,
};
use taskmux_git::{current_branch, discover_repo, GitCli, RepoHandle};
use taskmux_session::runner::ShellRunner;
use taskmux_session::tmux::TmuxSessions;

const DB_RELATIVE_PATH: &str = ".taskmux/tasks.db";

#[derive(Parser)]
#[command(
    name = "taskmux",
    version,
    about = "Orchestrate agent tasks over git worktrees and tmux sessions"
)]
struct Cli {
    /// Task namespace.
    #[arg(long, global = true, default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Create a task in `todo`.
    New {
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Linked issue number, folded into the branch name.
        #[arg(long)]
        issue: Option<u64>,
        #[arg(long)]
        parent: Option<u64>,
        /// Base branch override; defaults to the configured or current branch.
        #[arg(long)]
        base: Option<String>,
        #[arg(long = "label")]
        labels: Vec<String>,
        /// Per-task skip-review override (true/false); unset falls back to
        /// the configured default.
        #[arg(long)]
        skip_review: Option<bool>,
    },
    /// List tasks in the namespace.
    List {
        #[arg(long)]
        status: Option<TaskStatus>,
    },
    /// Show one task in full.
    Show { id: Option<u64> },
    /// Create branch + worktree and launch the agent session.
    Start { id: Option<u64> },
    /// Hand the task off to review (or straight to done).
    Complete { id: Option<u64> },
    /// Record a review verdict, or run the configured review command.
    Review {
        id: Option<u64>,
        /// Record an approving verdict without running the review command.
        #[arg(long)]
        lgtm: bool,
        /// Record a rejecting verdict with this feedback.
        #[arg(long, conflicts_with = "lgtm")]
        feedback: Option<String>,
    },
    /// Merge the task branch into its base branch and close the task.
    Merge {
        id: Option<u64>,
        /// Merge target override.
        #[arg(long)]
        into: Option<String>,
    },
    /// End the task without merging; the branch is kept for `prune`.
    Close { id: Option<u64> },
    /// Stop the work (or review) session without changing status.
    Stop {
        id: Option<u64>,
        #[arg(long)]
        review: bool,
    },
    /// Append a comment, or edit one in place with --edit.
    Comment {
        id: Option<u64>,
        text: String,
        #[arg(long, default_value = "me")]
        author: String,
        #[arg(long, default_value = "note")]
        kind: CommentKind,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Replace the text of the comment at this index instead.
        #[arg(long)]
        edit: Option<usize>,
    },
    /// Block the task from starting.
    Block { id: Option<u64>, reason: String },
    Unblock { id: Option<u64> },
    /// Attach the terminal to the task's session.
    Attach {
        id: Option<u64>,
        #[arg(long)]
        review: bool,
    },
    /// Type text into the task's session, followed by Enter.
    Send {
        id: Option<u64>,
        text: String,
        #[arg(long)]
        review: bool,
    },
    /// Print the recorded orchestration events for a task.
    Events { id: Option<u64> },
    /// Block until a watched task changes status, then run a command.
    Poll {
        /// Task IDs to watch (repeatable). Fires on the first change.
        #[arg(long = "id")]
        ids: Vec<u64>,
        /// Watch for any task newly reaching this status instead.
        #[arg(long)]
        status: Option<TaskStatus>,
        /// Expected current status; fires immediately if already different.
        #[arg(long)]
        expect: Option<TaskStatus>,
        #[arg(long)]
        interval: Option<u64>,
        #[arg(long)]
        timeout: Option<u64>,
        /// Command template; {id}, {old_status}, {new_status} (or {status}).
        template: String,
    },
    /// Delete branches/worktrees of terminal tasks and convention-named
    /// orphans.
    Prune {
        #[arg(long)]
        dry_run: bool,
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Session exit self-report, invoked by generated wrapper scripts.
    #[command(name = "_session-ended", hide = true)]
    SessionEnded {
        id: u64,
        exit_code: i32,
        /// Set when the report comes from a review session.
        #[arg(long)]
        review: bool,
    },
}

struct App {
    namespace: String,
    cwd: PathBuf,
    store: SqliteStore,
    sessions: TmuxSessions,
    runner: ShellRunner,
    clock: SystemClock,
    git: GitCli,
    repo: RepoHandle,
    settings: Settings,
    bin: String,
}

impl App {
    fn init(namespace: String) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().context("resolve working directory")?;
        let git = GitCli::default();
        let repo = discover_repo(&cwd, &git).context("locate git repository")?;
        let settings = load_settings(&repo.root).context("load configuration")?;

        let db_path = repo.root.join(DB_RELATIVE_PATH);
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let store = SqliteStore::open(&db_path)
            .with_context(|| format!("open task store at {}", db_path.display()))?;

        let bin = std::env::current_exe()
            .ok()
            .map(|path| path.to_string_lossy().into_owned())
            .unwrap_or_else(|| "taskmux".to_string());

        Ok(Self {
            namespace,
            cwd,
            store,
            sessions: TmuxSessions::default(),
            runner: ShellRunner::default(),
            clock: SystemClock,
            git,
            repo,
            settings,
            bin,
        })
    }

    fn coordinator(&self) -> Coordinator<'_> {
        Coordinator::new(
            &self.store,
            &self.sessions,
            &self.runner,
            &self.clock,
            self.git.clone(),
            self.repo.clone(),
            self.settings.clone(),
            self.bin.clone(),
        )
    }

    /// Resolve an explicit ID, or fall back to the task whose branch is
    /// checked out in the current directory.
    fn key(&self, id: Option<u64>) -> anyhow::Result<TaskKey> {
        if let Some(id) = id {
            return Ok(TaskKey::new(self.namespace.clone(), id));
        }
        match detect_current_task(&self.cwd, &self.git) {
            Some((namespace, id)) => Ok(TaskKey::new(namespace, id)),
            None => bail!("no task ID given and the current branch is not a task branch"),
        }
    }

    fn session_name(&self, key: &TaskKey, review: bool) -> String {
        if review {
            naming::review_session_name(&key.namespace, key.id)
        } else {
            naming::work_session_name(&key.namespace, key.id)
        }
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let app = App::init(cli.namespace)?;

    match cli.command {
        CliCommand::New {
            title,
            description,
            issue,
            parent,
            base,
            labels,
            skip_review,
        } => cmd_new(&app, title, description, issue, parent, base, labels, skip_review),
        CliCommand::List { status } => cmd_list(&app, status),
        CliCommand::Show { id } => cmd_show(&app, id),
        CliCommand::Start { id } => cmd_start(&app, id),
        CliCommand::Complete { id } => cmd_complete(&app, id),
        CliCommand::Review { id, lgtm, feedback } => cmd_review(&app, id, lgtm, feedback),
        CliCommand::Merge { id, into } => cmd_merge(&app, id, into),
        CliCommand::Close { id } => cmd_close(&app, id),
        CliCommand::Stop { id, review } => cmd_stop(&app, id, review),
        CliCommand::Comment {
            id,
            text,
            author,
            kind,
            tags,
            edit,
        } => cmd_comment(&app, id, text, author, kind, tags, edit),
        CliCommand::Block { id, reason } => cmd_block(&app, id, reason),
        CliCommand::Unblock { id } => cmd_unblock(&app, id),
        CliCommand::Attach { id, review } => {
            let key = app.key(id)?;
            let name = app.session_name(&key, review);
            app.sessions.attach(&name)?;
            Ok(())
        }
        CliCommand::Send { id, text, review } => {
            let key = app.key(id)?;
            let name = app.session_name(&key, review);
            app.sessions.send_keys(&name, &text)?;
            println!("sent to session '{name}'");
            Ok(())
        }
        CliCommand::Events { id } => cmd_events(&app, id),
        CliCommand::Poll {
            ids,
            status,
            expect,
            interval,
            timeout,
            template,
        } => cmd_poll(&app, ids, status, expect, interval, timeout, template),
        CliCommand::Prune { dry_run, yes } => cmd_prune(&app, dry_run, yes),
        CliCommand::SessionEnded {
            id,
            exit_code,
            review,
        } => {
            let key = TaskKey::new(app.namespace.clone(), id);
            app.coordinator().session_ended(&key, exit_code, review)?;
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn cmd_new(
    app: &App,
    title: String,
    description: String,
    issue: Option<u64>,
    parent: Option<u64>,
    base: Option<String>,
    labels: Vec<String>,
    skip_review: Option<bool>,
) -> anyhow::Result<()> {
    if !naming::is_valid_namespace(&app.namespace) {
        bail!("invalid namespace '{}'", app.namespace);
    }

    let id = app.store.next_id(&app.namespace)?;
    let mut task = Task::new(id, app.namespace.clone(), title);
    task.description = description;
    task.issue = issue;
    task.parent_id = parent;
    task.labels = labels;
    task.skip_review = skip_review;
    task.base_branch = match base {
        Some(base) => Some(base),
        None => match app.settings.base_branch.clone() {
            Some(base) => Some(base),
            None => Some(current_branch(&app.repo, &app.git)?),
        },
    };

    app.store.save(&task)?;
    app.store.append_event(&Event::for_task(
        task.key(),
        EventKind::TaskCreated,
        app.clock.now(),
    ))?;
    println!("created task {} ({})", task.key(), task.title);
    Ok(())
}

fn cmd_list(app: &App, status: Option<TaskStatus>) -> anyhow::Result<()> {
    let now = app.clock.now();
    let mut tasks = app.store.list(&app.namespace)?;
    if let Some(status) = status {
        tasks.retain(|task| task.status == status);
    }
    if tasks.is_empty() {
        println!("no tasks");
        return Ok(());
    }
    for task in &tasks {
        println!("{}", render_task_line(task, now));
    }
    Ok(())
}

fn render_task_line(task: &Task, now: chrono::DateTime<chrono::Utc>) -> String {
    let mut line = format!("{:>4}  {:<12} {}", task.id, task.status, task.title);
    if task.is_corrupted() {
        line.push_str("  [corrupted]");
    } else if let Some(reason) = task.block_reason.as_deref().filter(|r| !r.trim().is_empty()) {
        line.push_str(&format!("  [blocked: {reason}]"));
    }
    if let Some(issue) = task.issue {
        line.push_str(&format!("  #{issue}"));
    }
    if task.status == TaskStatus::InProgress {
        if let Some(secs) = task.elapsed_secs(now) {
            line.push_str(&format!("  ({})", render_elapsed(secs)));
        }
    }
    line
}

fn render_elapsed(secs: i64) -> String {
    if secs >= 3600 {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{secs}s")
    }
}

fn cmd_show(app: &App, id: Option<u64>) -> anyhow::Result<()> {
    let key = app.key(id)?;
    let task = app.store.get_required(&key)?;

    println!("task:        {}", task.key());
    println!("title:       {}", task.title);
    if !task.description.is_empty() {
        println!("description: {}", task.description);
    }
    print!("status:      {}", task.status);
    if let Some(substate) = task.substate {
        print!(" ({substate})");
    }
    println!();
    if let Some(parent) = task.parent_id {
        let exists = app
            .store
            .get(&TaskKey::new(key.namespace.clone(), parent))?
            .is_some();
        if exists {
            println!("parent:      {parent}");
        } else {
            println!("parent:      {parent} (missing)");
        }
    }
    if let Some(agent) = task.agent.as_deref() {
        match task.model.as_deref() {
            Some(model) => println!("agent:       {agent} ({model})"),
            None => println!("agent:       {agent}"),
        }
    }
    println!(
        "branch:      {}",
        naming::branch_name(&task.namespace, task.id, task.issue)
    );
    if let Some(base) = task.base_branch.as_deref() {
        println!("base:        {base}");
    }
    if let Some(issue) = task.issue {
        println!("issue:       #{issue}");
    }
    if !task.labels.is_empty() {
        println!("labels:      {}", task.labels.join(", "));
    }
    if let Some(reason) = task.block_reason.as_deref() {
        if task.is_corrupted() {
            println!("CORRUPTED:   {}", reason.trim_start_matches(CORRUPTED_BLOCK_PREFIX).trim());
        } else {
            println!("blocked:     {reason}");
        }
    }
    if task.review_count > 0 {
        println!(
            "reviews:     {} (last {}, auto-fix retries {})",
            task.review_count,
            if task.last_review_is_lgtm { "LGTM" } else { "rejected" },
            task.auto_fix_retry_count
        );
    }
    if let Some(started) = task.started {
        println!("started:     {started}");
    }
    println!("created:     {}", task.created_at);
    println!("updated:     {}", task.updated_at);

    if !task.comments.is_empty() {
        println!();
        for (index, comment) in task.comments.iter().enumerate() {
            let tags = if comment.tags.is_empty() {
                String::new()
            } else {
                format!(" [{}]", comment.tags.join(", "))
            };
            println!(
                "[{index}] {} ({}){tags} at {}:",
                comment.author,
                comment.kind.as_str(),
                comment.created_at
            );
            println!("    {}", comment.text);
        }
    }
    Ok(())
}

fn cmd_start(app: &App, id: Option<u64>) -> anyhow::Result<()> {
    let key = app.key(id)?;
    let outcome = app.coordinator().start(&key)?;
    println!(
        "started task {} on branch {} (worktree {})",
        outcome.task.key(),
        outcome.branch,
        outcome.worktree.display()
    );
    if outcome.reused_session {
        println!("session '{}' was already running", outcome.session);
    } else {
        println!("session '{}' launched", outcome.session);
    }
    Ok(())
}

fn cmd_complete(app: &App, id: Option<u64>) -> anyhow::Result<()> {
    let key = app.key(id)?;
    let coordinator = app.coordinator();
    let outcome = coordinator.complete(&key)?;

    if outcome.skipped_review {
        println!("task {} is done (review skipped)", outcome.task.key());
        return Ok(());
    }
    if let Some(warning) = outcome.review_warning.as_deref() {
        eprintln!("warning: {warning}");
    }
    if let Some(session) = outcome.review_session.as_deref() {
        println!(
            "task {} is in review (session '{session}')",
            outcome.task.key()
        );
        return Ok(());
    }

    // Auto-fix: run the review synchronously in this process.
    run_review_command(app, &key)
}

fn run_review_command(app: &App, key: &TaskKey) -> anyhow::Result<()> {
    let reviewer = CommandReviewer::new(&app.runner, app.settings.review.command.clone());
    let worktree = naming::worktree_path(&app.repo.root, &key.namespace, key.id);

    // With auto-fix off a rejection must not revert the task or spend the
    // retry budget; the verdict is recorded with manual semantics.
    if !app.settings.review.auto_fix {
        let (task, verdict) =
            run_manual_review(&app.store, &reviewer, &app.clock, key, &worktree)?;
        if is_lgtm(&verdict) {
            println!("review passed, task {} is done", task.key());
        } else {
            println!("review rejected, task {} stays in review", task.key());
            println!("{verdict}");
        }
        return Ok(());
    }

    let supervisor = AutoFixSupervisor::new(
        &app.store,
        &reviewer,
        &app.clock,
        app.settings.review.auto_fix_max_retries,
    );
    match supervisor.review_once(key, &worktree)? {
        AutoFixOutcome::Approved { task } => {
            println!("review passed, task {} is done", task.key());
        }
        AutoFixOutcome::NeedsFix {
            task,
            feedback,
            retries_used,
        } => {
            println!(
                "review rejected (attempt {}/{}), task {} back in progress",
                retries_used,
                app.settings.review.auto_fix_max_retries,
                task.key()
            );
            println!("{feedback}");
            forward_feedback(&app.sessions, key, &feedback);
        }
    }
    Ok(())
}

fn cmd_review(
    app: &App,
    id: Option<u64>,
    lgtm: bool,
    feedback: Option<String>,
) -> anyhow::Result<()> {
    let key = app.key(id)?;

    if lgtm || feedback.is_some() {
        let task = apply_manual_verdict(&app.store, &app.clock, &key, lgtm, feedback.as_deref())?;
        if lgtm {
            println!("LGTM recorded, task {} is done", task.key());
        } else {
            println!(
                "rejection recorded, task {} awaits rework or a request-changes comment",
                task.key()
            );
        }
        return Ok(());
    }

    run_review_command(app, &key)
}

fn cmd_merge(app: &App, id: Option<u64>, into: Option<String>) -> anyhow::Result<()> {
    let key = app.key(id)?;
    let task = app.coordinator().merge(&key, into.as_deref())?;
    println!(
        "merged {} into {}; task {} closed",
        naming::branch_name(&task.namespace, task.id, task.issue),
        task.base_branch.as_deref().unwrap_or("base"),
        task.key()
    );
    Ok(())
}

fn cmd_close(app: &App, id: Option<u64>) -> anyhow::Result<()> {
    let key = app.key(id)?;
    let task = app.coordinator().close(&key)?;
    println!("task {} closed (branch kept; run prune to delete)", task.key());
    Ok(())
}

fn cmd_stop(app: &App, id: Option<u64>, review: bool) -> anyhow::Result<()> {
    let key = app.key(id)?;
    let outcome = app.coordinator().stop(&key, review)?;
    if outcome.was_running {
        println!("stopped session '{}'", outcome.session);
    } else {
        println!("no running session '{}'", outcome.session);
    }
    Ok(())
}

fn cmd_comment(
    app: &App,
    id: Option<u64>,
    text: String,
    author: String,
    kind: CommentKind,
    tags: Vec<String>,
    edit: Option<usize>,
) -> anyhow::Result<()> {
    let key = app.key(id)?;

    if let Some(index) = edit {
        app.store.edit_comment(&key, index, text, app.clock.now())?;
        println!("comment {index} updated on task {key}");
        return Ok(());
    }

    let at = app.clock.now();
    let mut task = app.store.append_comment(
        &key,
        Comment {
            author,
            kind,
            tags,
            text,
            created_at: at,
        },
    )?;
    println!("comment added to task {key}");

    // A request-changes comment sends any non-terminal task back to work.
    if kind == CommentKind::RequestChanges
        && !task.status.is_terminal()
        && task.status != TaskStatus::InProgress
    {
        let change = transition_task(&mut task, TaskStatus::InProgress, at)?;
        app.store.save(&task)?;
        app.store.append_event(&Event::for_task(
            key.clone(),
            EventKind::StatusChanged {
                from: change.from.as_str().to_string(),
                to: change.to.as_str().to_string(),
            },
            at,
        ))?;
        println!("task {key} moved back to in_progress");
    }
    Ok(())
}

fn cmd_block(app: &App, id: Option<u64>, reason: String) -> anyhow::Result<()> {
    if reason.trim().is_empty() {
        bail!("block reason must not be empty");
    }
    if reason.starts_with(CORRUPTED_BLOCK_PREFIX) {
        bail!("the '{CORRUPTED_BLOCK_PREFIX}' prefix is reserved for store parse failures");
    }
    let key = app.key(id)?;
    let mut task = app.store.get_required(&key)?;
    task.block_reason = Some(reason);
    task.updated_at = app.clock.now();
    app.store.save(&task)?;
    println!("task {key} blocked");
    Ok(())
}

fn cmd_unblock(app: &App, id: Option<u64>) -> anyhow::Result<()> {
    let key = app.key(id)?;
    let mut task = app.store.get_required(&key)?;
    if task.is_corrupted() {
        bail!("task {key} is marked corrupted; fix or delete the record instead of unblocking");
    }
    task.block_reason = None;
    task.updated_at = app.clock.now();
    app.store.save(&task)?;
    println!("task {key} unblocked");
    Ok(())
}

fn cmd_events(app: &App, id: Option<u64>) -> anyhow::Result<()> {
    let key = app.key(id)?;
    let events = app.store.events_for(&key)?;
    if events.is_empty() {
        println!("no events for task {key}");
        return Ok(());
    }
    for event in events {
        let kind = serde_json::to_string(&event.kind)?;
        println!("{}  {kind}", event.at);
    }
    Ok(())
}

fn cmd_poll(
    app: &App,
    ids: Vec<u64>,
    status: Option<TaskStatus>,
    expect: Option<TaskStatus>,
    interval: Option<u64>,
    timeout: Option<u64>,
    template: String,
) -> anyhow::Result<()> {
    let mode = match (ids.is_empty(), status) {
        (false, Some(_)) => bail!("--id and --status are mutually exclusive"),
        (false, None) => PollMode::Tasks {
            keys: ids
                .into_iter()
                .map(|id| TaskKey::new(app.namespace.clone(), id))
                .collect(),
            expect,
        },
        (true, Some(target)) => {
            if expect.is_some() {
                bail!("--expect only applies when watching explicit task IDs");
            }
            PollMode::AnyReaching {
                namespace: app.namespace.clone(),
                target,
            }
        }
        (true, None) => bail!("provide --id (repeatable) or --status"),
    };

    let interval = Duration::from_secs(interval.unwrap_or(app.settings.poll.interval_secs));
    let timeout = Duration::from_secs(timeout.unwrap_or(app.settings.poll.timeout_secs));
    let watcher = PollWatcher::new(&app.store, &app.runner, &app.clock, interval, timeout);

    let cancel = watcher.cancel_flag();
    signal_hook::flag::register(signal_hook::consts::SIGINT, cancel.clone())
        .context("install SIGINT handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, cancel)
        .context("install SIGTERM handler")?;

    match watcher.watch(&mode, &template, &app.repo.root)? {
        PollOutcome::Fired { task, command } => {
            println!("task {task} changed; ran: {command}");
        }
        PollOutcome::TimedOut => println!("poll timed out with no change"),
        PollOutcome::Cancelled => println!("poll cancelled"),
    }
    Ok(())
}

fn cmd_prune(app: &App, dry_run: bool, yes: bool) -> anyhow::Result<()> {
    let coordinator = app.coordinator();
    let preview = coordinator.prune(&app.namespace, true)?;
    if preview.items.is_empty() {
        println!("nothing to prune");
        return Ok(());
    }

    for item in &preview.items {
        let what = match item.reason {
            PruneReason::TerminalTask => "terminal task",
            PruneReason::OrphanBranch => "orphan branch",
            PruneReason::OrphanWorktree => "orphan worktree",
        };
        let mut parts = Vec::new();
        if let Some(id) = item.task_id {
            parts.push(format!("task {id}"));
        }
        if let Some(branch) = item.branch.as_deref() {
            parts.push(format!("branch {branch}"));
        }
        if let Some(worktree) = item.worktree.as_deref() {
            parts.push(format!("worktree {}", worktree.display()));
        }
        println!("{what}: {}", parts.join(", "));
    }

    if dry_run {
        println!("dry run; nothing deleted");
        return Ok(());
    }
    if !yes && !confirm(&format!("delete {} item(s)?", preview.items.len()))? {
        println!("aborted");
        return Ok(());
    }

    let report = coordinator.prune(&app.namespace, false)?;
    println!("pruned {} item(s)", report.items.len());
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
