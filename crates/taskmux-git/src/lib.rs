pub mod command;
pub mod error;
pub mod repo;
pub mod worktree;

pub use command::*;
pub use error::*;
pub use repo::*;
pub use worktree::*;
