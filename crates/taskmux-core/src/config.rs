//! Settings for the orchestrator, loaded from `.taskmux/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_RELATIVE_PATH: &str = ".taskmux/config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Full settings tree. Every section and field has a default so a missing
/// file is equivalent to an empty one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Base branch used when a task carries none and no override is given.
    pub base_branch: Option<String>,
    pub agent: AgentSettings,
    pub review: ReviewSettings,
    pub commands: CommandSettings,
    pub poll: PollSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Command launched inside the work session.
    pub command: String,
    pub model: Option<String>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            model: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewSettings {
    /// Command launched inside the review session.
    pub command: String,
    /// Default for tasks whose skip-review flag is unset.
    pub skip_by_default: bool,
    pub auto_fix: bool,
    pub auto_fix_max_retries: u32,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            skip_by_default: false,
            auto_fix: false,
            auto_fix_max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CommandSettings {
    /// Run inside a freshly created worktree before the session starts.
    pub worktree_setup: Option<String>,
    /// Must exit 0 before `complete` is allowed to transition.
    pub pre_complete: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            timeout_secs: 600,
        }
    }
}

pub fn parse_settings(contents: &str) -> Result<Settings, toml::de::Error> {
    toml::from_str(contents)
}

/// Load settings from `<repo_root>/.taskmux/config.toml`. A missing file
/// yields defaults; an unreadable or malformed file is an error.
pub fn load_settings(repo_root: &Path) -> Result<Settings, ConfigError> {
    let path = repo_root.join(CONFIG_RELATIVE_PATH);
    let body = match fs::read_to_string(&path) {
        Ok(body) => body,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Settings::default());
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };
    parse_settings(&body).map_err(|source| ConfigError::Parse { path, source })
}
