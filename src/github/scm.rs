//! `SourceControl` backed by the GitHub REST API.
//!
//! Branch heads and updates go through the git refs API, merges through the
//! merges endpoint, and files through the contents API. Every request runs
//! under the client's retry policy.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::client::{OctocrabClient, encode_ref};
use super::error::GitHubApiError;
use crate::collab::{CommitState, ScmError, SourceControl};
use crate::types::{PrNumber, Sha};

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Debug, Serialize)]
struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    reference: String,
    sha: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

#[derive(Debug, Serialize)]
struct MergeRequest<'a> {
    base: &'a str,
    head: &'a str,
    commit_message: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    status: String,
}

#[derive(Debug, Serialize)]
struct StatusRequest<'a> {
    state: &'static str,
    context: &'a str,
    description: &'a str,
}

fn parse_sha(raw: &str) -> Result<Sha, GitHubApiError> {
    Sha::parse(raw).map_err(|e| {
        GitHubApiError::permanent_without_source(format!("Invalid SHA in response: {}", e))
    })
}

/// Returns true for the compare API statuses meaning `base` is reachable from `head`.
pub fn is_ancestor_status(status: &str) -> bool {
    matches!(status, "ahead" | "identical")
}

/// Checks whether a ref update failed because it was not a fast-forward.
pub fn is_non_fast_forward_error(err: &GitHubApiError) -> bool {
    let message = err.message.to_lowercase();
    err.status_code == Some(422)
        && (message.contains("fast forward") || message.contains("fast-forward"))
}

impl OctocrabClient {
    async fn get_ref(&self, branch: &str) -> Result<Option<Sha>, GitHubApiError> {
        let route = self.route(&format!("git/ref/heads/{}", encode_ref(branch)));
        let route = route.as_str();
        let result = self
            .call(move || async move {
                let response: RefResponse = self
                    .inner()
                    .get(route, None::<&()>)
                    .await
                    .map_err(GitHubApiError::from_octocrab)?;
                Ok(response)
            })
            .await;

        match result {
            Ok(response) => parse_sha(&response.object.sha).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl SourceControl for OctocrabClient {
    async fn branch_head(&self, branch: &str) -> Result<Option<Sha>, ScmError> {
        self.get_ref(branch).await.map_err(|e| e.into_scm(branch))
    }

    #[instrument(skip(self, sha), fields(sha = %sha.short()))]
    async fn create_branch(&self, branch: &str, sha: &Sha) -> Result<(), ScmError> {
        let route = self.route("git/refs");
        let request = CreateRefRequest {
            reference: format!("refs/heads/{}", branch),
            sha: sha.as_str(),
        };
        let (route, request) = (route.as_str(), &request);

        self.call(move || async move {
            let _: serde_json::Value = self
                .inner()
                .post(route, Some(request))
                .await
                .map_err(GitHubApiError::from_octocrab)?;
            Ok(())
        })
        .await
        .map_err(|e| e.into_scm(branch))?;

        debug!("Created branch");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_branch(&self, branch: &str) -> Result<(), ScmError> {
        let route = self.route(&format!("git/refs/heads/{}", encode_ref(branch)));
        let route = route.as_str();

        let result = self
            .call(move || async move {
                let response = self
                    .inner()
                    ._delete(route, None::<&()>)
                    .await
                    .map_err(GitHubApiError::from_octocrab)?;
                octocrab::map_github_error(response)
                    .await
                    .map(|_| ())
                    .map_err(GitHubApiError::from_octocrab)
            })
            .await;

        match result {
            Ok(()) => {
                debug!("Deleted branch");
                Ok(())
            }
            // GitHub answers 422 "Reference does not exist" for missing refs.
            Err(e) if e.is_not_found() || e.status_code == Some(422) => {
                Err(ScmError::NotFound(branch.to_string()))
            }
            Err(e) => Err(e.into_scm(branch)),
        }
    }

    #[instrument(skip(self, message))]
    async fn merge(&self, base: &str, head: &str, message: &str) -> Result<Sha, ScmError> {
        let route = self.route("merges");
        let request = MergeRequest {
            base,
            head,
            commit_message: message,
        };
        let (route, request) = (route.as_str(), &request);

        // 201 creates a merge commit; 204 means head was already merged.
        let result = self
            .call(move || async move {
                let response = self
                    .inner()
                    ._post(route, Some(request))
                    .await
                    .map_err(GitHubApiError::from_octocrab)?;
                octocrab::map_github_error(response)
                    .await
                    .map(|_| ())
                    .map_err(GitHubApiError::from_octocrab)
            })
            .await;

        match result {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                return Err(ScmError::MergeConflict {
                    base: base.to_string(),
                    head: head.to_string(),
                });
            }
            Err(e) => return Err(e.into_scm(format!("{} or {}", base, head))),
        }

        self.get_ref(base)
            .await
            .map_err(|e| e.into_scm(base))?
            .ok_or_else(|| ScmError::NotFound(base.to_string()))
    }

    #[instrument(skip(self, sha), fields(sha = %sha.short()))]
    async fn fast_forward(&self, branch: &str, sha: &Sha) -> Result<(), ScmError> {
        let route = self.route(&format!("git/refs/heads/{}", encode_ref(branch)));
        let request = UpdateRefRequest {
            sha: sha.as_str(),
            force: false,
        };
        let (route, request) = (route.as_str(), &request);

        let result = self
            .call(move || async move {
                let _: serde_json::Value = self
                    .inner()
                    .patch(route, Some(request))
                    .await
                    .map_err(GitHubApiError::from_octocrab)?;
                Ok(())
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(e) if is_non_fast_forward_error(&e) => Err(ScmError::NonFastForward {
                branch: branch.to_string(),
                sha: sha.to_string(),
            }),
            Err(e) => Err(e.into_scm(branch)),
        }
    }

    async fn is_ancestor(&self, ancestor: &Sha, descendant: &Sha) -> Result<bool, ScmError> {
        if ancestor == descendant {
            return Ok(true);
        }
        let route = self.route(&format!("compare/{}...{}", ancestor, descendant));
        let route = route.as_str();

        let response = self
            .call(move || async move {
                let response: CompareResponse = self
                    .inner()
                    .get(route, None::<&()>)
                    .await
                    .map_err(GitHubApiError::from_octocrab)?;
                Ok(response)
            })
            .await
            .map_err(|e| e.into_scm(format!("{}...{}", ancestor, descendant)))?;

        Ok(is_ancestor_status(&response.status))
    }

    async fn read_file(&self, sha: &Sha, path: &str) -> Result<Option<String>, ScmError> {
        let result = self
            .call(move || async move {
                self.inner()
                    .repos(self.owner(), self.repo_name())
                    .get_content()
                    .path(path)
                    .r#ref(sha.as_str())
                    .send()
                    .await
                    .map_err(GitHubApiError::from_octocrab)
            })
            .await;

        match result {
            Ok(mut items) => Ok(items
                .take_items()
                .into_iter()
                .next()
                .and_then(|content| content.decoded_content())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into_scm(path)),
        }
    }

    #[instrument(skip(self, body))]
    async fn post_pr_comment(&self, pr: PrNumber, body: &str) -> Result<(), ScmError> {
        self.call(move || async move {
            self.inner()
                .issues(self.owner(), self.repo_name())
                .create_comment(pr.0, body)
                .await
                .map(|_| ())
                .map_err(GitHubApiError::from_octocrab)
        })
        .await
        .map_err(|e| e.into_scm(format!("pull request {}", pr)))
    }

    #[instrument(skip(self, sha, description), fields(sha = %sha.short()))]
    async fn set_commit_status(
        &self,
        sha: &Sha,
        state: CommitState,
        context: &str,
        description: &str,
    ) -> Result<(), ScmError> {
        let route = self.route(&format!("statuses/{}", sha));
        let request = StatusRequest {
            state: state.as_api_str(),
            context,
            description,
        };
        let (route, request) = (route.as_str(), &request);

        self.call(move || async move {
            let _: serde_json::Value = self
                .inner()
                .post(route, Some(request))
                .await
                .map_err(GitHubApiError::from_octocrab)?;
            Ok(())
        })
        .await
        .map_err(|e| e.into_scm(sha.to_string()))
    }
}
