//! GitHub API error types.
//!
//! Errors are categorized as transient or permanent so the retry layer knows
//! what to repeat:
//!
//! - **Transient** errors are retriable (5xx, rate limits, network failures)
//! - **Permanent** errors are returned immediately (most 4xx)
//!
//! After retries are exhausted an error is mapped into the collaborator error
//! of whichever interface made the call. Transient errors become `Unavailable`
//! so the landing core retries later instead of failing a pull request.

use std::fmt;
use thiserror::Error;

use crate::collab::{BugTrackerError, CiError, ScmError};
use crate::types::BugId;

/// The kind of GitHub API error, categorized for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHubErrorKind {
    /// Transient error - safe to retry with backoff.
    ///
    /// Examples:
    /// - HTTP 5xx (server errors)
    /// - HTTP 429 (rate limited)
    /// - HTTP 403 with rate limit headers
    /// - "Base branch was modified" (concurrent push)
    /// - Network timeouts
    Transient,

    /// Permanent error - retrying will not help.
    ///
    /// Examples:
    /// - HTTP 4xx (except rate limits and specific transient messages)
    /// - Merge conflicts (409 on the merges endpoint)
    /// - Ref or file not found (404)
    /// - Authentication failures (401, 403 non-rate-limit)
    Permanent,
}

impl GitHubErrorKind {
    pub fn is_retriable(&self) -> bool {
        matches!(self, GitHubErrorKind::Transient)
    }
}

/// A GitHub API error with categorization for retry decisions.
#[derive(Debug, Error)]
pub struct GitHubApiError {
    pub kind: GitHubErrorKind,

    /// The HTTP status code, if available.
    pub status_code: Option<u16>,

    pub message: String,

    /// The underlying octocrab error, if available.
    #[source]
    pub source: Option<octocrab::Error>,
}

impl fmt::Display for GitHubApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "GitHub API error (HTTP {}): {}", code, self.message),
            None => write!(f, "GitHub API error: {}", self.message),
        }
    }
}

impl GitHubApiError {
    /// Creates a transient error from an octocrab error.
    pub fn transient(message: impl Into<String>, source: octocrab::Error) -> Self {
        let status_code = Self::extract_status_code(&source);
        Self {
            kind: GitHubErrorKind::Transient,
            status_code,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a permanent error from an octocrab error.
    pub fn permanent(message: impl Into<String>, source: octocrab::Error) -> Self {
        let status_code = Self::extract_status_code(&source);
        Self {
            kind: GitHubErrorKind::Permanent,
            status_code,
            message: message.into(),
            source: Some(source),
        }
    }

    /// Creates a permanent error without an octocrab source.
    pub fn permanent_without_source(message: impl Into<String>) -> Self {
        Self {
            kind: GitHubErrorKind::Permanent,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a transient error without an octocrab source.
    pub fn transient_without_source(message: impl Into<String>) -> Self {
        Self {
            kind: GitHubErrorKind::Transient,
            status_code: None,
            message: message.into(),
            source: None,
        }
    }

    /// Categorizes an octocrab error.
    ///
    /// This function examines the error to determine if it's transient (retriable)
    /// or permanent. The categorization is based on:
    /// - HTTP status codes
    /// - Error message patterns for known GitHub API responses
    pub fn from_octocrab(err: octocrab::Error) -> Self {
        let status_code = Self::extract_status_code(&err);
        let message = err.to_string();

        // Check for specific transient messages first
        if is_transient_message(&message) {
            return Self {
                kind: GitHubErrorKind::Transient,
                status_code,
                message,
                source: Some(err),
            };
        }

        // 409 is left permanent here. On the merges endpoint it means a
        // conflict, which the call site maps explicitly.
        let kind = match status_code {
            Some(429) => GitHubErrorKind::Transient, // Rate limited
            Some(403) if is_rate_limit_error(&message) => GitHubErrorKind::Transient,
            Some(code) if (500..600).contains(&code) => GitHubErrorKind::Transient,
            Some(_) => GitHubErrorKind::Permanent, // 4xx including 409
            None => {
                // No status code - check if it's a network error
                if is_network_error(&message) {
                    GitHubErrorKind::Transient
                } else {
                    GitHubErrorKind::Permanent
                }
            }
        };

        Self {
            kind,
            status_code,
            message,
            source: Some(err),
        }
    }

    /// Extracts the HTTP status code from an octocrab error, if present.
    ///
    /// API errors carry the status directly. For the other octocrab variants
    /// this parses the rendered message; returning `None` falls back to
    /// message-based categorization in `from_octocrab`.
    fn extract_status_code(err: &octocrab::Error) -> Option<u16> {
        if let octocrab::Error::GitHub { source, .. } = err {
            return Some(source.status_code.as_u16());
        }

        let err_str = err.to_string();

        // Try to extract status code from common error message patterns
        // octocrab formats errors like "GitHub API returned error 404"
        // or includes "status code: 404" in messages
        if let Some(idx) = err_str.find("status: ") {
            let rest = &err_str[idx + 8..];
            if let Some(end) = rest.find(|c: char| !c.is_ascii_digit()) {
                if let Ok(code) = rest[..end].parse() {
                    return Some(code);
                }
            } else if let Ok(code) = rest.trim().parse() {
                return Some(code);
            }
        }

        // Another common pattern
        if err_str.contains("404") && err_str.to_lowercase().contains("not found") {
            return Some(404);
        }
        if err_str.contains("409") && err_str.to_lowercase().contains("conflict") {
            return Some(409);
        }
        if err_str.contains("422") {
            return Some(422);
        }
        if err_str.contains("403") {
            return Some(403);
        }
        if err_str.contains("401") {
            return Some(401);
        }
        if err_str.contains("429") {
            return Some(429);
        }
        if err_str.contains("500") {
            return Some(500);
        }
        if err_str.contains("502") {
            return Some(502);
        }
        if err_str.contains("503") {
            return Some(503);
        }

        None
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status_code == Some(409)
    }

    /// Maps into a source control error. `what` names the ref or object the
    /// call was about, for `NotFound`.
    pub fn into_scm(self, what: impl Into<String>) -> ScmError {
        match self.kind {
            GitHubErrorKind::Transient => ScmError::Unavailable(self.to_string()),
            GitHubErrorKind::Permanent if self.is_not_found() => ScmError::NotFound(what.into()),
            GitHubErrorKind::Permanent => ScmError::Rejected(self.to_string()),
        }
    }

    pub fn into_bug_tracker(self, bug: BugId) -> BugTrackerError {
        match self.kind {
            GitHubErrorKind::Transient => BugTrackerError::Unavailable(self.to_string()),
            GitHubErrorKind::Permanent if self.is_not_found() => BugTrackerError::NotFound(bug),
            GitHubErrorKind::Permanent => BugTrackerError::Rejected(self.to_string()),
        }
    }

    pub fn into_ci(self) -> CiError {
        match self.kind {
            GitHubErrorKind::Transient => CiError::Unavailable(self.to_string()),
            GitHubErrorKind::Permanent => CiError::Rejected(self.to_string()),
        }
    }
}

/// Checks if an error message indicates a transient condition.
///
/// These messages indicate GitHub API quirks that resolve with retries:
/// - Status check propagation delays after a push
/// - Concurrent modifications to the base branch
fn is_transient_message(message: &str) -> bool {
    let message_lower = message.to_lowercase();

    // Status check hasn't propagated yet
    if message_lower.contains("required status check") && message_lower.contains("expected") {
        return true;
    }

    // Base branch was modified concurrently
    if message_lower.contains("base branch was modified") {
        return true;
    }

    // Generic "try again" suggestions from GitHub
    if message_lower.contains("try again") {
        return true;
    }

    false
}

/// Checks if an error message indicates a rate limit.
fn is_rate_limit_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("rate limit")
        || message_lower.contains("api rate")
        || message_lower.contains("secondary rate")
        || message_lower.contains("abuse detection")
}

/// Checks if an error message indicates a network-level error.
fn is_network_error(message: &str) -> bool {
    let message_lower = message.to_lowercase();
    message_lower.contains("timeout")
        || message_lower.contains("connection")
        || message_lower.contains("network")
        || message_lower.contains("dns")
        || message_lower.contains("timed out")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_message_detection() {
        assert!(is_transient_message(
            "Required status check 'ci/test' is expected"
        ));
        assert!(is_transient_message("Base branch was modified"));
        assert!(is_transient_message("Please try again later"));
        assert!(!is_transient_message("Pull request is not mergeable"));
        assert!(!is_transient_message("Approving review required"));
    }

    #[test]
    fn rate_limit_detection() {
        assert!(is_rate_limit_error("API rate limit exceeded"));
        assert!(is_rate_limit_error("secondary rate limit"));
        assert!(is_rate_limit_error("abuse detection mechanism"));
        assert!(!is_rate_limit_error("Permission denied"));
    }

    #[test]
    fn network_error_detection() {
        assert!(is_network_error("connection timeout"));
        assert!(is_network_error("DNS resolution failed"));
        assert!(is_network_error("request timed out"));
        assert!(!is_network_error("Not found"));
    }

    #[test]
    fn error_kind_retriable() {
        assert!(GitHubErrorKind::Transient.is_retriable());
        assert!(!GitHubErrorKind::Permanent.is_retriable());
    }

    #[test]
    fn transient_errors_become_unavailable() {
        let err = GitHubApiError::transient_without_source("502 bad gateway");
        assert!(matches!(err.into_scm("master"), ScmError::Unavailable(_)));

        let err = GitHubApiError::transient_without_source("timed out");
        assert!(matches!(
            err.into_bug_tracker(BugId(7)),
            BugTrackerError::Unavailable(_)
        ));

        let err = GitHubApiError::transient_without_source("rate limit");
        assert!(matches!(err.into_ci(), CiError::Unavailable(_)));
    }

    #[test]
    fn not_found_maps_to_not_found() {
        let err = GitHubApiError {
            kind: GitHubErrorKind::Permanent,
            status_code: Some(404),
            message: "Not Found".to_string(),
            source: None,
        };
        assert_eq!(
            err.into_scm("integration-master"),
            ScmError::NotFound("integration-master".to_string())
        );

        let err = GitHubApiError {
            kind: GitHubErrorKind::Permanent,
            status_code: Some(404),
            message: "Not Found".to_string(),
            source: None,
        };
        assert_eq!(err.into_bug_tracker(BugId(3)), BugTrackerError::NotFound(BugId(3)));
    }

    #[test]
    fn other_permanent_errors_are_rejections() {
        let err = GitHubApiError::permanent_without_source("Validation Failed");
        assert!(matches!(err.into_scm("x"), ScmError::Rejected(_)));
        let err = GitHubApiError::permanent_without_source("Validation Failed");
        assert!(matches!(err.into_ci(), CiError::Rejected(_)));
    }
}
