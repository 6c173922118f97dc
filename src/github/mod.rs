//! GitHub-backed collaborators.
//!
//! One repository hosts everything: its git data and pull requests are the
//! source control, its issues are the bugs, and commit statuses on the
//! integration head report CI.
//!
//! Key features:
//! - Exponential backoff retry for transient failures
//! - Distinguishes transient vs permanent errors, mapping exhausted transient
//!   failures to `Unavailable` so the landing core retries on its next poll

mod client;
mod error;
mod issues;
mod retry;
mod scm;
mod statuses;

pub use client::{OctocrabClient, encode_ref};
pub use error::{GitHubApiError, GitHubErrorKind};
pub use issues::{DEFAULT_CHECKIN_LABEL, GitHubBugTracker, is_approved};
pub use retry::Backoff;
pub use statuses::{CommitStatusRunner, StatusRun, fold_statuses};
