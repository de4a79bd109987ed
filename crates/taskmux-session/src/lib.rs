pub mod runner;
pub mod script;
pub mod tmux;

pub use runner::*;
pub use script::*;
pub use tmux::*;
