//! Integration attempt records.
//!
//! An attempt is one coalesced CI run: a set of pull requests merged in queue
//! order onto the target's integration branch, plus the run validating the
//! resulting head. The record is persisted as-is by the active attempt store,
//! so everything recovery needs lives here rather than in the in-memory arena.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{BugId, PrNumber, RunId, Sha};

/// Prefix of every integration ref. One integration ref exists per target.
pub const INTEGRATION_REF_PREFIX: &str = "integration-";

/// Returns the integration ref name for a target branch.
pub fn integration_ref_for(target_branch: &str) -> String {
    format!("{}{}", INTEGRATION_REF_PREFIX, target_branch)
}

/// Why an attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The task graph finished unsuccessfully.
    CiFailed,

    /// A member could not be merged onto the integration branch.
    MergeConflict { pr: PrNumber },

    /// The task graph file at the integration head is not valid JSON.
    InvalidTaskGraph { message: String },
}

/// The outcome of an attempt. Only ever moves forward from `Pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Pending,
    Success,
    Failure { reason: FailureReason },
    /// Loaded as pending after a restart and not yet re-polled.
    UnknownAfterRestart,
}

impl AttemptOutcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AttemptOutcome::Success | AttemptOutcome::Failure { .. })
    }

    /// Checks if a transition from this outcome to `next` is valid.
    ///
    /// `UnknownAfterRestart -> Pending` is the "resumed" resolution: the run
    /// was re-polled and is confirmed to still be running.
    pub fn can_transition_to(&self, next: &AttemptOutcome) -> bool {
        match (self, next) {
            (AttemptOutcome::Pending, AttemptOutcome::Pending) => false,
            (AttemptOutcome::Pending, _) => true,
            (AttemptOutcome::UnknownAfterRestart, AttemptOutcome::UnknownAfterRestart) => false,
            (AttemptOutcome::UnknownAfterRestart, _) => true,
            _ => false,
        }
    }
}

/// A pull request included in an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptMember {
    pub pr: PrNumber,
    pub bug: BugId,
    pub source_branch: String,
    pub title: String,
}

/// One coalesced integration run for a target branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationAttempt {
    pub target_branch: String,
    pub integration_ref: String,
    /// Members in merge order (queue order at creation).
    pub members: Vec<AttemptMember>,
    /// Integration head after all members were merged. `None` while merging.
    pub head_sha: Option<Sha>,
    /// Set once the task graph was submitted.
    pub run_id: Option<RunId>,
    pub outcome: AttemptOutcome,
    /// The target branch was advanced to `head_sha`.
    pub fast_forwarded: bool,
    /// Members whose bug and pull request have been fully updated.
    pub finalized: BTreeSet<PrNumber>,
    pub started_at: DateTime<Utc>,
}

impl IntegrationAttempt {
    /// Creates a pending attempt with no merges performed yet.
    pub fn new(target_branch: impl Into<String>, members: Vec<AttemptMember>) -> Self {
        let target_branch = target_branch.into();
        IntegrationAttempt {
            integration_ref: integration_ref_for(&target_branch),
            target_branch,
            members,
            head_sha: None,
            run_id: None,
            outcome: AttemptOutcome::Pending,
            fast_forwarded: false,
            finalized: BTreeSet::new(),
            started_at: Utc::now(),
        }
    }

    pub fn member_prs(&self) -> impl Iterator<Item = PrNumber> + '_ {
        self.members.iter().map(|m| m.pr)
    }

    pub fn contains(&self, pr: PrNumber) -> bool {
        self.members.iter().any(|m| m.pr == pr)
    }

    /// Members not yet marked finalized.
    pub fn unfinalized(&self) -> impl Iterator<Item = &AttemptMember> {
        self.members
            .iter()
            .filter(|m| !self.finalized.contains(&m.pr))
    }

    /// True once every side effect of a terminal outcome has been applied.
    pub fn is_fully_processed(&self) -> bool {
        self.outcome.is_terminal() && self.unfinalized().next().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(n: u64) -> AttemptMember {
        AttemptMember {
            pr: PrNumber(n),
            bug: BugId(100 + n),
            source_branch: format!("branch{}", n),
            title: format!("Bug {} - change", 100 + n),
        }
    }

    #[test]
    fn integration_ref_is_derived_from_target() {
        assert_eq!(integration_ref_for("master"), "integration-master");
        let attempt = IntegrationAttempt::new("v2.2", vec![member(1)]);
        assert_eq!(attempt.integration_ref, "integration-v2.2");
    }

    #[test]
    fn outcome_only_moves_forward() {
        let failure = AttemptOutcome::Failure {
            reason: FailureReason::CiFailed,
        };
        assert!(AttemptOutcome::Pending.can_transition_to(&AttemptOutcome::Success));
        assert!(AttemptOutcome::Pending.can_transition_to(&failure));
        assert!(AttemptOutcome::Pending.can_transition_to(&AttemptOutcome::UnknownAfterRestart));
        assert!(AttemptOutcome::UnknownAfterRestart.can_transition_to(&AttemptOutcome::Pending));
        assert!(!AttemptOutcome::Success.can_transition_to(&AttemptOutcome::Pending));
        assert!(!failure.can_transition_to(&AttemptOutcome::Success));
        assert!(!AttemptOutcome::Success.can_transition_to(&failure));
    }

    #[test]
    fn fully_processed_requires_terminal_and_all_finalized() {
        let mut attempt = IntegrationAttempt::new("master", vec![member(1), member(2)]);
        assert!(!attempt.is_fully_processed());

        attempt.outcome = AttemptOutcome::Success;
        attempt.finalized.insert(PrNumber(1));
        assert!(!attempt.is_fully_processed());
        assert_eq!(
            attempt.unfinalized().map(|m| m.pr).collect::<Vec<_>>(),
            vec![PrNumber(2)]
        );

        attempt.finalized.insert(PrNumber(2));
        assert!(attempt.is_fully_processed());
    }

    #[test]
    fn serde_roundtrip_preserves_progress() {
        let mut attempt = IntegrationAttempt::new("master", vec![member(1)]);
        attempt.run_id = Some(RunId::new("run-1"));
        attempt.outcome = AttemptOutcome::Failure {
            reason: FailureReason::MergeConflict { pr: PrNumber(1) },
        };
        attempt.finalized.insert(PrNumber(1));

        let json = serde_json::to_string(&attempt).unwrap();
        let parsed: IntegrationAttempt = serde_json::from_str(&json).unwrap();
        assert_eq!(attempt, parsed);
    }
}
