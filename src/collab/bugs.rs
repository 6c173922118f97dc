//! Bug tracker interface.

use std::future::Future;

use thiserror::Error;

use crate::types::{BugId, PrNumber};

/// Errors from the bug tracker collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BugTrackerError {
    #[error("bug {0} not found")]
    NotFound(BugId),

    #[error("bug tracker rejected request: {0}")]
    Rejected(String),

    #[error("bug tracker unavailable: {0}")]
    Unavailable(String),
}

/// The landing-relevant state of a bug, as seen for one pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BugState {
    /// A human asked for the change to be checked in.
    pub checkin_requested: bool,
    /// The pull request's review was approved.
    pub approved: bool,
}

impl BugState {
    pub fn is_ready(&self) -> bool {
        self.checkin_requested && self.approved
    }
}

/// Operations against the bug tracker.
///
/// Every mutation must be safe to repeat: clearing an already clear flag or
/// resolving an already resolved bug succeeds.
pub trait BugTracker: Send + Sync {
    fn bug_state(
        &self,
        bug: BugId,
        pr: PrNumber,
    ) -> impl Future<Output = Result<BugState, BugTrackerError>> + Send;

    /// Returns the text of every comment on the bug, oldest first.
    fn list_comments(
        &self,
        bug: BugId,
    ) -> impl Future<Output = Result<Vec<String>, BugTrackerError>> + Send;

    fn post_comment(
        &self,
        bug: BugId,
        body: &str,
    ) -> impl Future<Output = Result<(), BugTrackerError>> + Send;

    fn clear_checkin_requested(
        &self,
        bug: BugId,
    ) -> impl Future<Output = Result<(), BugTrackerError>> + Send;

    fn resolve_fixed(&self, bug: BugId) -> impl Future<Output = Result<(), BugTrackerError>> + Send;

    /// Links a pull request to the bug so reviewers can find it.
    fn attach_pull_request(
        &self,
        bug: BugId,
        pr: PrNumber,
        source_branch: &str,
        target_branch: &str,
    ) -> impl Future<Output = Result<(), BugTrackerError>> + Send;
}
