pub mod autofix;
pub mod coordinator;
pub mod persistence;
pub mod poll;
pub mod state_machine;

#[cfg(test)]
mod test_support;

pub use autofix::{
    apply_manual_verdict, forward_feedback, is_lgtm, run_manual_review, AutoFixError,
    AutoFixOutcome, AutoFixSupervisor, CommandReviewer, Reviewer,
};
pub use coordinator::{
    detect_current_task, CompleteOutcome, Coordinator, CoordinatorError, PruneReport, StartOutcome,
    StopOutcome,
};
pub use persistence::SqliteStore;
pub use poll::{PollError, PollMode, PollOutcome, PollWatcher};
pub use state_machine::{is_transition_allowed, transition_task, StateMachineError, StatusChange};
