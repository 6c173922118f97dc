//! Interfaces to the external services the landing core drives.
//!
//! Each trait returns `impl Future + Send` so implementations can be used
//! from spawned per-branch tasks. Concrete GitHub-backed implementations live
//! in [`crate::github`]; in-memory fakes live in `test_utils`.

mod bugs;
mod ci;
mod scm;

pub use bugs::{BugState, BugTracker, BugTrackerError};
pub use ci::{CiError, RunOutcome, TaskGraph, TaskRunner};
pub use scm::{CommitState, ScmError, SourceControl};
