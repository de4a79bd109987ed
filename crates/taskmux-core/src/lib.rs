pub mod config;
pub mod naming;
pub mod run;
pub mod session;
pub mod status;
pub mod store;
pub mod types;

pub use config::*;
pub use naming::{
    branch_name, is_valid_namespace, parse_branch, parse_worktree_dir_name, review_session_name,
    work_session_name, worktree_dir_name, worktree_path, WORKTREE_ROOT,
};
pub use run::*;
pub use session::*;
pub use status::*;
pub use store::*;
pub use types::*;
