//! CI task runner interface.

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{RunId, Sha};

/// Errors from the CI collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CiError {
    #[error("unknown run {0}")]
    UnknownRun(RunId),

    #[error("task runner rejected graph: {0}")]
    Rejected(String),

    #[error("task runner unavailable: {0}")]
    Unavailable(String),
}

/// Normalized state of a CI run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Pending,
    Success,
    Failure,
}

/// A task graph as read from the repository. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskGraph(pub serde_json::Value);

impl TaskGraph {
    /// The graph submitted when the repository carries no task graph file.
    pub fn empty() -> Self {
        TaskGraph(serde_json::json!({ "tasks": [] }))
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(TaskGraph)
    }

    /// Number of entries in the top-level `tasks` array.
    pub fn task_count(&self) -> usize {
        self.0
            .get("tasks")
            .and_then(|t| t.as_array())
            .map_or(0, |t| t.len())
    }

    pub fn is_empty(&self) -> bool {
        self.task_count() == 0
    }
}

/// Submits and polls CI runs.
pub trait TaskRunner: Send + Sync {
    /// Starts a run of `graph` against `sha`.
    fn submit(
        &self,
        sha: &Sha,
        graph: &TaskGraph,
    ) -> impl Future<Output = Result<RunId, CiError>> + Send;

    fn poll_outcome(&self, run: &RunId) -> impl Future<Output = Result<RunOutcome, CiError>> + Send;
}
