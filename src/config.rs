//! Process configuration from `AUTOLANDER_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::github::DEFAULT_CHECKIN_LABEL;
use crate::landing::DEFAULT_STATUS_CONTEXT;
use crate::orchestrator::DEFAULT_POLL_INTERVAL_SECS;
use crate::tracker::DEFAULT_TASK_GRAPH_PATH;
use crate::types::RepoId;

pub const ENV_REPO: &str = "AUTOLANDER_REPO";
pub const ENV_GITHUB_TOKEN: &str = "AUTOLANDER_GITHUB_TOKEN";
pub const ENV_STATE_DIR: &str = "AUTOLANDER_STATE_DIR";
pub const ENV_BIND: &str = "AUTOLANDER_BIND";
pub const ENV_POLL_INTERVAL_SECS: &str = "AUTOLANDER_POLL_INTERVAL_SECS";
pub const ENV_TASK_GRAPH_PATH: &str = "AUTOLANDER_TASK_GRAPH_PATH";
pub const ENV_CHECKIN_LABEL: &str = "AUTOLANDER_CHECKIN_LABEL";
pub const ENV_STATUS_CONTEXT: &str = "AUTOLANDER_STATUS_CONTEXT";

const DEFAULT_STATE_DIR: &str = "./state";
const DEFAULT_BIND: &str = "0.0.0.0:3000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Clone)]
pub struct Config {
    pub repo: RepoId,
    pub github_token: String,
    /// Root for durable state. Tables live under `<state_dir>/tables`.
    pub state_dir: PathBuf,
    pub bind: SocketAddr,
    pub poll_interval: Duration,
    pub task_graph_path: String,
    pub checkin_label: String,
    pub status_context: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("repo", &self.repo)
            .field("github_token", &"<redacted>")
            .field("state_dir", &self.state_dir)
            .field("bind", &self.bind)
            .field("poll_interval", &self.poll_interval)
            .field("task_graph_path", &self.task_graph_path)
            .field("checkin_label", &self.checkin_label)
            .field("status_context", &self.status_context)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a config from an arbitrary variable lookup. Empty values count
    /// as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let require = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));

        let repo_raw = require(ENV_REPO)?;
        let repo = RepoId::parse(&repo_raw).ok_or_else(|| ConfigError::Invalid {
            var: ENV_REPO,
            value: repo_raw.clone(),
            reason: "expected owner/name",
        })?;

        let github_token = require(ENV_GITHUB_TOKEN)?;

        let bind_raw = get(ENV_BIND).unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            var: ENV_BIND,
            value: bind_raw.clone(),
            reason: "expected host:port",
        })?;

        let poll_interval = match get(ENV_POLL_INTERVAL_SECS) {
            None => Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        var: ENV_POLL_INTERVAL_SECS,
                        value: raw,
                        reason: "expected a positive number of seconds",
                    });
                }
            },
        };

        Ok(Config {
            repo,
            github_token,
            state_dir: get(ENV_STATE_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
            bind,
            poll_interval,
            task_graph_path: get(ENV_TASK_GRAPH_PATH)
                .unwrap_or_else(|| DEFAULT_TASK_GRAPH_PATH.to_string()),
            checkin_label: get(ENV_CHECKIN_LABEL)
                .unwrap_or_else(|| DEFAULT_CHECKIN_LABEL.to_string()),
            status_context: get(ENV_STATUS_CONTEXT)
                .unwrap_or_else(|| DEFAULT_STATUS_CONTEXT.to_string()),
        })
    }

    pub fn tables_dir(&self) -> PathBuf {
        self.state_dir.join("tables")
    }
}
