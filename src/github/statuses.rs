//! A `TaskRunner` that reads CI results from commit statuses.
//!
//! CI in this deployment is triggered by pushes to the integration branch and
//! reports back through commit statuses. Submitting a graph therefore only
//! names the run; polling reads the statuses on the integration head. The run
//! id encodes the head and the number of tasks so polling needs no state and
//! survives a restart.

use serde::Deserialize;
use tracing::{debug, instrument};

use super::client::OctocrabClient;
use super::error::GitHubApiError;
use crate::collab::{CiError, RunOutcome, TaskGraph, TaskRunner};
use crate::types::{RunId, Sha};

const NOOP_PREFIX: &str = "noop-";

#[derive(Debug, Clone, Deserialize)]
pub struct StatusEntry {
    pub context: String,
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct CombinedStatusResponse {
    #[serde(default)]
    statuses: Vec<StatusEntry>,
}

/// A parsed run id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusRun {
    /// The graph had no tasks. Succeeds immediately.
    Noop,
    /// Waits for `tasks` successful contexts on `sha`.
    Commit { sha: Sha, tasks: usize },
}

impl StatusRun {
    pub fn run_id(sha: &Sha, graph: &TaskGraph) -> RunId {
        if graph.is_empty() {
            RunId::new(format!("{}{}", NOOP_PREFIX, sha))
        } else {
            RunId::new(format!("{}:{}", sha, graph.task_count()))
        }
    }

    pub fn parse(run: &RunId) -> Option<Self> {
        let raw = run.as_str();
        if let Some(rest) = raw.strip_prefix(NOOP_PREFIX) {
            return Sha::parse(rest).ok().map(|_| StatusRun::Noop);
        }
        let (sha, tasks) = raw.split_once(':')?;
        Some(StatusRun::Commit {
            sha: Sha::parse(sha).ok()?,
            tasks: tasks.parse().ok()?,
        })
    }
}

/// Folds the statuses on a commit into a run outcome.
///
/// Our own context is ignored. Any failing context fails the run; the run
/// succeeds once at least `tasks` contexts have succeeded.
pub fn fold_statuses(statuses: &[StatusEntry], own_context: &str, tasks: usize) -> RunOutcome {
    let relevant = statuses.iter().filter(|s| s.context != own_context);
    let mut succeeded = 0;
    for status in relevant {
        match status.state.as_str() {
            "failure" | "error" => return RunOutcome::Failure,
            "success" => succeeded += 1,
            _ => {}
        }
    }
    if succeeded >= tasks.max(1) {
        RunOutcome::Success
    } else {
        RunOutcome::Pending
    }
}

/// Task runner over the combined commit status API.
#[derive(Debug, Clone)]
pub struct CommitStatusRunner {
    client: OctocrabClient,
    own_context: String,
}

impl CommitStatusRunner {
    /// `own_context` is the status context this service writes, excluded
    /// when judging CI.
    pub fn new(client: OctocrabClient, own_context: impl Into<String>) -> Self {
        Self {
            client,
            own_context: own_context.into(),
        }
    }
}

impl TaskRunner for CommitStatusRunner {
    #[instrument(skip(self, graph), fields(sha = %sha.short(), tasks = graph.task_count()))]
    async fn submit(&self, sha: &Sha, graph: &TaskGraph) -> Result<RunId, CiError> {
        let run = StatusRun::run_id(sha, graph);
        debug!(run_id = %run, "Watching commit statuses");
        Ok(run)
    }

    #[instrument(skip(self), fields(run_id = %run))]
    async fn poll_outcome(&self, run: &RunId) -> Result<RunOutcome, CiError> {
        let (sha, tasks) = match StatusRun::parse(run) {
            Some(StatusRun::Noop) => return Ok(RunOutcome::Success),
            Some(StatusRun::Commit { sha, tasks }) => (sha, tasks),
            None => return Err(CiError::UnknownRun(run.clone())),
        };

        let client = &self.client;
        let route = client.route(&format!("commits/{}/status?per_page=100", sha));
        let route = route.as_str();

        let result = client
            .call(move || async move {
                let response: CombinedStatusResponse = client
                    .inner()
                    .get(route, None::<&()>)
                    .await
                    .map_err(GitHubApiError::from_octocrab)?;
                Ok(response)
            })
            .await;

        match result {
            Ok(combined) => Ok(fold_statuses(&combined.statuses, &self.own_context, tasks)),
            Err(e) if e.is_not_found() => Err(CiError::UnknownRun(run.clone())),
            Err(e) => Err(e.into_ci()),
        }
    }
}
