//! Events consumed by the orchestrator.

use serde::{Deserialize, Serialize};

use crate::landing::BranchEvent;
use crate::types::{BugId, PrNumber, RunId};

/// An inbound notification, as accepted on `POST /events`.
///
/// ```
/// use autolander::orchestrator::LandingEvent;
///
/// let event: LandingEvent = serde_json::from_str(
///     r#"{"type": "bug_updated", "bug": 1234}"#,
/// ).unwrap();
/// assert_eq!(event.kind(), "bug_updated");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LandingEvent {
    PullRequestOpened {
        number: PrNumber,
        title: String,
        source_branch: String,
        target_branch: String,
    },
    PullRequestClosed {
        number: PrNumber,
        target_branch: String,
    },
    /// Any change to a bug: flags, comments or attachment reviews.
    BugUpdated { bug: BugId },
    /// A CI run reached a terminal state.
    RunCompleted { run_id: RunId },
}

impl LandingEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LandingEvent::PullRequestOpened { .. } => "pull_request_opened",
            LandingEvent::PullRequestClosed { .. } => "pull_request_closed",
            LandingEvent::BugUpdated { .. } => "bug_updated",
            LandingEvent::RunCompleted { .. } => "run_completed",
        }
    }

    /// The target branch this event is addressed to, if it names one.
    pub fn target_branch(&self) -> Option<&str> {
        match self {
            LandingEvent::PullRequestOpened { target_branch, .. }
            | LandingEvent::PullRequestClosed { target_branch, .. } => Some(target_branch),
            LandingEvent::BugUpdated { .. } | LandingEvent::RunCompleted { .. } => None,
        }
    }

    /// Converts into the per-branch form.
    pub fn into_branch_event(self) -> BranchEvent {
        match self {
            LandingEvent::PullRequestOpened {
                number,
                title,
                source_branch,
                ..
            } => BranchEvent::Opened {
                number,
                title,
                source_branch,
            },
            LandingEvent::PullRequestClosed { number, .. } => BranchEvent::Closed { number },
            LandingEvent::BugUpdated { bug } => BranchEvent::BugChanged { bug },
            LandingEvent::RunCompleted { run_id } => BranchEvent::RunCompleted { run_id },
        }
    }
}
