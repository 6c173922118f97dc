//! Pull request records and their landing lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{BugId, PrNumber};

/// Where a pull request is in the landing lifecycle.
///
/// ```text
/// New ──► AwaitingReview ──► Queued ──► InAttempt ──► Landed
///  │            ▲   │          │  ▲         │
///  │            │   │          │  └─────────┤ (target moved: requeue)
///  ▼            │   ▼          ▼            ▼
/// Abandoned ◄───┴───┴──────────┘          Failed ──► AwaitingReview / Queued
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandingState {
    /// Observed but not yet validated.
    New,

    /// Valid bug reference; waiting for approval and checkin-requested.
    AwaitingReview,

    /// Approved and checkin-requested; waiting for the next attempt.
    Queued,

    /// Part of the current integration attempt.
    InAttempt,

    /// Fast-forwarded into the target branch.
    Landed,

    /// Its attempt failed. Requires a human to re-request checkin.
    Failed,

    /// Invalid, or closed before landing.
    Abandoned,
}

impl LandingState {
    /// Returns the name of this state for logging/display.
    pub fn name(&self) -> &'static str {
        match self {
            LandingState::New => "new",
            LandingState::AwaitingReview => "awaiting_review",
            LandingState::Queued => "queued",
            LandingState::InAttempt => "in_attempt",
            LandingState::Landed => "landed",
            LandingState::Failed => "failed",
            LandingState::Abandoned => "abandoned",
        }
    }

    /// Returns true if the pull request can never land from this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LandingState::Landed | LandingState::Abandoned)
    }

    /// Checks if a transition from this state to `next` is valid.
    pub fn can_transition_to(&self, next: LandingState) -> bool {
        use LandingState::*;
        matches!(
            (self, next),
            (New, AwaitingReview)
                | (New, Abandoned)
                | (AwaitingReview, Queued)
                | (AwaitingReview, Abandoned)
                | (Queued, InAttempt)
                | (Queued, AwaitingReview)
                | (Queued, Abandoned)
                | (InAttempt, Landed)
                | (InAttempt, Failed)
                | (InAttempt, Queued)
                | (Failed, AwaitingReview)
                | (Failed, Queued)
                | (Failed, Abandoned)
        )
    }
}

/// A pull request tracked by a branch coordinator.
///
/// Only pull requests whose title carried a bug number are ever stored;
/// invalid ones are rejected before a record exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: PrNumber,
    pub title: String,
    /// The head branch to merge.
    pub source_branch: String,
    /// The branch it lands on.
    pub target_branch: String,
    pub bug: BugId,
    pub approved: bool,
    pub checkin_requested: bool,
    pub state: LandingState,
    /// When the pull request last entered `Queued`. Defines FIFO order.
    pub queued_at: Option<DateTime<Utc>>,
    /// False once the pull request is closed on the hosting side.
    pub open: bool,
}

impl PullRequest {
    pub fn new(
        number: PrNumber,
        title: impl Into<String>,
        source_branch: impl Into<String>,
        target_branch: impl Into<String>,
        bug: BugId,
    ) -> Self {
        PullRequest {
            number,
            title: title.into(),
            source_branch: source_branch.into(),
            target_branch: target_branch.into(),
            bug,
            approved: false,
            checkin_requested: false,
            state: LandingState::New,
            queued_at: None,
            open: true,
        }
    }

    /// Both human gates are satisfied.
    pub fn is_ready(&self) -> bool {
        self.approved && self.checkin_requested && self.open
    }
}
