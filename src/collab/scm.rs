//! Source control hosting interface.

use std::fmt;
use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{PrNumber, Sha};

/// Errors from the source control collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScmError {
    /// The branch could not be merged without conflicts.
    #[error("merge conflict merging {head} into {base}")]
    MergeConflict { base: String, head: String },

    /// The target is not an ancestor of the requested commit.
    #[error("{branch} cannot be fast-forwarded to {sha}")]
    NonFastForward { branch: String, sha: String },

    /// A ref, commit or pull request does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request was understood and refused. Retrying will not help.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The service could not be reached or failed transiently.
    #[error("source control unavailable: {0}")]
    Unavailable(String),
}

/// State of a commit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    Pending,
    Success,
    Failure,
}

impl CommitState {
    pub fn as_api_str(&self) -> &'static str {
        match self {
            CommitState::Pending => "pending",
            CommitState::Success => "success",
            CommitState::Failure => "failure",
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

/// Operations against the hosting service's git data and pull requests.
///
/// Branch names are bare (`master`, not `refs/heads/master`).
pub trait SourceControl: Send + Sync {
    /// Returns the head commit of a branch, or `None` if it does not exist.
    fn branch_head(
        &self,
        branch: &str,
    ) -> impl Future<Output = Result<Option<Sha>, ScmError>> + Send;

    /// Creates a branch pointing at `sha`. Fails if the branch exists.
    fn create_branch(
        &self,
        branch: &str,
        sha: &Sha,
    ) -> impl Future<Output = Result<(), ScmError>> + Send;

    /// Deletes a branch. Returns `NotFound` if it does not exist.
    fn delete_branch(&self, branch: &str) -> impl Future<Output = Result<(), ScmError>> + Send;

    /// Merges `head` into `base` with a merge commit, returning the new head of `base`.
    fn merge(
        &self,
        base: &str,
        head: &str,
        message: &str,
    ) -> impl Future<Output = Result<Sha, ScmError>> + Send;

    /// Moves `branch` to `sha` if that is a fast-forward.
    fn fast_forward(
        &self,
        branch: &str,
        sha: &Sha,
    ) -> impl Future<Output = Result<(), ScmError>> + Send;

    /// Returns true if `ancestor` is reachable from `descendant` (or equal to it).
    fn is_ancestor(
        &self,
        ancestor: &Sha,
        descendant: &Sha,
    ) -> impl Future<Output = Result<bool, ScmError>> + Send;

    /// Reads a file at a commit, or `None` if the path does not exist there.
    fn read_file(
        &self,
        sha: &Sha,
        path: &str,
    ) -> impl Future<Output = Result<Option<String>, ScmError>> + Send;

    fn post_pr_comment(
        &self,
        pr: PrNumber,
        body: &str,
    ) -> impl Future<Output = Result<(), ScmError>> + Send;

    /// Attaches a status to a commit under the given context.
    fn set_commit_status(
        &self,
        sha: &Sha,
        state: CommitState,
        context: &str,
        description: &str,
    ) -> impl Future<Output = Result<(), ScmError>> + Send;
}
