//! Backoff for GitHub API calls.
//!
//! Transient failures (5xx, 429, secondary rate limits, network) are retried
//! with doubling delays; permanent ones return at once. When the retries run
//! out the last error surfaces, which the collaborator layer maps to
//! `Unavailable` so the branch worker tries again on its next poll.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use super::error::{GitHubApiError, GitHubErrorKind};

/// Doubling delays between retries, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Retries after the first call. Zero disables retrying.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Backoff {
    /// 3 retries at 2s, 4s and 8s.
    pub const GITHUB: Self = Self {
        max_retries: 3,
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(16),
    };

    /// A single call, no retries.
    pub const NONE: Self = Self {
        max_retries: 0,
        initial_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    };

    /// Delay before retry number `retry` (0-indexed).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::GITHUB
    }
}

/// Runs `operation` until it succeeds, fails permanently, or exhausts
/// `backoff`.
pub async fn with_backoff<T, F, Fut>(backoff: Backoff, mut operation: F) -> Result<T, GitHubApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GitHubApiError>>,
{
    let mut retry = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.kind == GitHubErrorKind::Permanent => return Err(e),
            Err(e) if retry >= backoff.max_retries => return Err(e),
            Err(e) => {
                let delay = backoff.delay(retry);
                warn!(error = %e, retry = retry + 1, ?delay, "Transient GitHub error, retrying");
                tokio::time::sleep(delay).await;
                retry += 1;
            }
        }
    }
}
