//! Core domain types for the autolander.
//!
//! This module contains the fundamental types used throughout the application,
//! designed to encode invariants via the type system.

pub mod attempt;
pub mod ids;
pub mod pr;

pub use attempt::{
    AttemptMember, AttemptOutcome, FailureReason, INTEGRATION_REF_PREFIX, IntegrationAttempt,
    integration_ref_for,
};
pub use ids::{BugId, InvalidSha, PrNumber, RepoId, RunId, Sha};
pub use pr::{LandingState, PullRequest};
