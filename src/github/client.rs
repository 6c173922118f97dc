//! Octocrab client wrapper scoped to a specific repository.
//!
//! `OctocrabClient` wraps an `Octocrab` instance, pins it to one repository,
//! and runs every request through the retry layer. The collaborator
//! implementations in the sibling modules build on [`OctocrabClient::call`].

use std::future::Future;

use octocrab::Octocrab;

use super::error::GitHubApiError;
use super::retry::{Backoff, with_backoff};
use crate::types::RepoId;

/// A GitHub API client scoped to a specific repository.
#[derive(Clone)]
pub struct OctocrabClient {
    client: Octocrab,

    repo: RepoId,

    backoff: Backoff,
}

impl OctocrabClient {
    pub fn new(client: Octocrab, repo: RepoId) -> Self {
        Self {
            client,
            repo,
            backoff: Backoff::GITHUB,
        }
    }

    /// Creates a client from a GitHub token.
    pub fn from_token(token: impl Into<String>, repo: RepoId) -> Result<Self, octocrab::Error> {
        let client = Octocrab::builder().personal_token(token.into()).build()?;
        Ok(Self::new(client, repo))
    }

    /// Replaces the backoff used for every request.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn inner(&self) -> &Octocrab {
        &self.client
    }

    pub fn repo(&self) -> &RepoId {
        &self.repo
    }

    pub fn owner(&self) -> &str {
        &self.repo.owner
    }

    pub fn repo_name(&self) -> &str {
        &self.repo.repo
    }

    /// Builds a repository-scoped route: `/repos/{owner}/{repo}/{path}`.
    pub fn route(&self, path: &str) -> String {
        format!("/repos/{}/{}/{}", self.owner(), self.repo_name(), path)
    }

    /// Runs `operation`, retrying transient failures with the configured
    /// backoff.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, GitHubApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GitHubApiError>>,
    {
        with_backoff(self.backoff, operation).await
    }
}

impl std::fmt::Debug for OctocrabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OctocrabClient")
            .field("repo", &self.repo)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// Percent-encodes a branch name for use in a URL path, keeping `/`
/// separators intact.
pub fn encode_ref(branch: &str) -> String {
    branch
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_ref_keeps_slashes() {
        assert_eq!(encode_ref("release/v2.2"), "release/v2.2");
        assert_eq!(encode_ref("a b"), "a%20b");
        assert_eq!(encode_ref("integration-master"), "integration-master");
    }

    proptest! {
        #[test]
        fn encode_ref_preserves_segment_count(name in "[a-z0-9#% ]{1,8}(/[a-z0-9#% ]{1,8}){0,3}") {
            let encoded = encode_ref(&name);
            prop_assert_eq!(encoded.split('/').count(), name.split('/').count());
            prop_assert!(!encoded.contains(' '));
            prop_assert!(!encoded.contains('#'));
        }
    }

    #[tokio::test]
    async fn route_is_repository_scoped() {
        let octocrab = Octocrab::builder().build().unwrap();
        let client = OctocrabClient::new(octocrab, RepoId::new("mozilla-b2g", "gaia"))
            .with_backoff(Backoff::NONE);
        assert_eq!(
            client.route("git/refs"),
            "/repos/mozilla-b2g/gaia/git/refs"
        );
        assert_eq!(client.backoff, Backoff::NONE);
    }
}
