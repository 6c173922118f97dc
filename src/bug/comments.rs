//! Comment and status texts posted by the autolander.
//!
//! Landing and failure comments embed the pull request number and the
//! integration head, so that a replay can recognise a comment it already
//! posted by exact text comparison.

use crate::types::{AttemptMember, FailureReason, PrNumber, Sha};

/// Posted on a pull request whose title carries no bug reference.
pub const NO_BUG_FOUND: &str = "Autolander could not find a bug number in the title of this pull \
request. Please edit the title to include a reference such as \"Bug 1234 - description\" so \
that it can be landed.";

/// Posted on the bug once a pull request was fast-forwarded into the target branch.
pub fn landing_comment(target_branch: &str, pr: PrNumber, head: &Sha) -> String {
    format!(
        "Pull request has landed in {}: {} (integration head {})",
        target_branch,
        pr,
        head.short()
    )
}

/// Posted on the bug of every member of a failed attempt.
pub fn failure_comment(
    target_branch: &str,
    member: &AttemptMember,
    reason: &FailureReason,
    head: Option<&Sha>,
) -> String {
    let head = head.map(|h| h.short()).unwrap_or("unknown");
    match reason {
        FailureReason::CiFailed => format!(
            "Pull request {} failed to land in {}: the integration run for {} did not succeed. \
             Please fix the failure and set checkin-needed again.",
            member.pr, target_branch, head
        ),
        FailureReason::MergeConflict { pr } if *pr == member.pr => format!(
            "Pull request {} failed to land in {}: branch '{}' could not be merged cleanly. \
             Please rebase and set checkin-needed again.",
            member.pr, target_branch, member.source_branch
        ),
        FailureReason::MergeConflict { pr } => format!(
            "Pull request {} failed to land in {}: it was integrated together with {}, which \
             could not be merged cleanly. Please set checkin-needed again.",
            member.pr, target_branch, pr
        ),
        FailureReason::InvalidTaskGraph { message } => format!(
            "Pull request {} failed to land in {}: the task graph at {} is invalid ({}).",
            member.pr, target_branch, head, message
        ),
    }
}

/// Posted on the bug when a pull request is first picked up.
pub fn attached_comment(pr: PrNumber, source_branch: &str, target_branch: &str) -> String {
    format!(
        "Pull request {} ({} -> {}) is tracked by autolander.",
        pr, source_branch, target_branch
    )
}

/// Status description for a member while its attempt runs.
pub fn pending_description(run: &str) -> String {
    format!("Integration run {} in progress", run)
}

pub const SUCCESS_DESCRIPTION: &str = "Landed";

pub const FAILURE_DESCRIPTION: &str = "Integration failed";
