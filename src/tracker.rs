//! Submission and polling of CI runs for integration heads.
//!
//! The tracker has no cadence of its own: callers poll when a completion
//! signal arrives or on their periodic tick. A pending run is never treated
//! as a failure here.

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::collab::{CiError, RunOutcome, ScmError, SourceControl, TaskGraph, TaskRunner};
use crate::types::{RunId, Sha};

/// Default location of the task graph inside the repository.
pub const DEFAULT_TASK_GRAPH_PATH: &str = "taskgraph.json";

/// Errors reading the task graph from the integration head.
#[derive(Debug, Error)]
pub enum TaskGraphError {
    #[error(transparent)]
    Scm(#[from] ScmError),

    #[error("invalid task graph at {path}: {source}")]
    Invalid {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Reads the task graph at `path` in commit `sha`.
///
/// An absent file yields [`TaskGraph::empty`].
pub async fn read_task_graph<S: SourceControl>(
    scm: &S,
    sha: &Sha,
    path: &str,
) -> Result<TaskGraph, TaskGraphError> {
    match scm.read_file(sha, path).await? {
        Some(text) => TaskGraph::parse(&text).map_err(|source| TaskGraphError::Invalid {
            path: path.to_string(),
            source,
        }),
        None => {
            debug!(path, sha = %sha.short(), "No task graph, submitting empty graph");
            Ok(TaskGraph::empty())
        }
    }
}

pub struct TaskRunTracker<'a, R> {
    runner: &'a R,
}

impl<'a, R: TaskRunner> TaskRunTracker<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        TaskRunTracker { runner }
    }

    #[instrument(skip(self, graph), fields(sha = %sha.short(), tasks = graph.task_count()))]
    pub async fn submit(&self, sha: &Sha, graph: &TaskGraph) -> Result<RunId, CiError> {
        let run = self.runner.submit(sha, graph).await?;
        info!(run_id = %run, "Submitted integration run");
        Ok(run)
    }

    #[instrument(skip(self), fields(run_id = %run))]
    pub async fn poll_outcome(&self, run: &RunId) -> Result<RunOutcome, CiError> {
        let outcome = self.runner.poll_outcome(run).await?;
        debug!(?outcome, "Polled integration run");
        Ok(outcome)
    }
}
