//! Autolander - lands review-approved, bug-tracked pull requests.
//!
//! Approved pull requests whose bug requests checkin are queued per target
//! branch, merged together onto an integration branch, run through CI, and on
//! success fast-forwarded onto the target. In-flight attempts are persisted
//! so a restart neither loses nor double-lands work.

pub mod bug;
pub mod collab;
pub mod config;
pub mod github;
pub mod integration;
pub mod landing;
pub mod orchestrator;
pub mod server;
pub mod store;
pub mod table;
pub mod tracker;
pub mod types;

#[cfg(test)]
mod test_utils;
