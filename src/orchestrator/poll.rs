//! Polling cadence for branch workers.
//!
//! Completion signals are the primary trigger for advancing an attempt, but
//! they can be lost. Every worker also polls its running attempt on a fixed
//! interval, with per-branch jitter so that branches recovered together do
//! not poll in lockstep.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

/// Default poll interval (1 minute).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default jitter percentage (0-100).
const DEFAULT_JITTER_PERCENT: u8 = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub poll_interval: Duration,

    /// Up to this percentage is added to `poll_interval` per branch.
    pub jitter_percent: u8,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PollConfig {
    pub fn new() -> Self {
        PollConfig {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            jitter_percent: DEFAULT_JITTER_PERCENT,
        }
    }

    pub fn with_interval(poll_interval: Duration) -> Self {
        PollConfig {
            poll_interval,
            ..Self::new()
        }
    }

    /// Returns the poll interval with deterministic jitter for `branch`.
    ///
    /// `interval * (1 + (hash(branch) % jitter_percent) / 100)`
    pub fn poll_interval_with_jitter(&self, branch: &str) -> Duration {
        if self.jitter_percent == 0 {
            return self.poll_interval;
        }
        let jitter = (branch_hash(branch) % self.jitter_percent as u64) as f64 / 100.0;
        self.poll_interval.mul_f64(1.0 + jitter)
    }
}

fn branch_hash(branch: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    branch.hash(&mut hasher);
    hasher.finish()
}
