//! A `BugTracker` that keeps bugs as GitHub issues.
//!
//! Bug N is issue N of the same repository. Checkin is requested by adding a
//! label, review approval comes from the pull request's reviews, and resolving
//! a bug closes the issue as completed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::client::OctocrabClient;
use super::error::GitHubApiError;
use crate::bug::comments::attached_comment;
use crate::collab::{BugState, BugTracker, BugTrackerError};
use crate::types::{BugId, PrNumber};

/// Default label a human adds to request checkin.
pub const DEFAULT_CHECKIN_LABEL: &str = "checkin-needed";

const PAGE_SIZE: u8 = 100;

#[derive(Debug, Deserialize)]
struct IssueResponse {
    #[serde(default)]
    labels: Vec<LabelResponse>,
}

#[derive(Debug, Deserialize)]
struct LabelResponse {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewResponse {
    pub user: Option<ReviewUser>,
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReviewUser {
    pub login: String,
}

#[derive(Debug, Serialize)]
struct CloseIssueRequest {
    state: &'static str,
    state_reason: &'static str,
}

/// Decides approval from a pull request's reviews, oldest first.
///
/// Each reviewer's latest approving or change-requesting review counts;
/// comments and dismissals do not override it. The pull request is approved
/// when someone approved and nobody is still requesting changes.
pub fn is_approved(reviews: &[ReviewResponse]) -> bool {
    let mut latest: HashMap<&str, &str> = HashMap::new();
    for review in reviews {
        let Some(user) = &review.user else { continue };
        match review.state.as_str() {
            "APPROVED" | "CHANGES_REQUESTED" => {
                latest.insert(user.login.as_str(), review.state.as_str());
            }
            "DISMISSED" => {
                latest.remove(user.login.as_str());
            }
            _ => {}
        }
    }
    latest.values().any(|s| *s == "APPROVED") && !latest.values().any(|s| *s == "CHANGES_REQUESTED")
}

/// Bug tracker over the issues of the client's repository.
#[derive(Debug, Clone)]
pub struct GitHubBugTracker {
    client: OctocrabClient,
    checkin_label: String,
}

impl GitHubBugTracker {
    pub fn new(client: OctocrabClient, checkin_label: impl Into<String>) -> Self {
        Self {
            client,
            checkin_label: checkin_label.into(),
        }
    }

    pub fn checkin_label(&self) -> &str {
        &self.checkin_label
    }

    async fn has_checkin_label(&self, bug: BugId) -> Result<bool, GitHubApiError> {
        let route = self.client.route(&format!("issues/{}", bug));
        let route = route.as_str();
        let client = &self.client;

        let issue: IssueResponse = client
            .call(move || async move {
                client
                    .inner()
                    .get(route, None::<&()>)
                    .await
                    .map_err(GitHubApiError::from_octocrab)
            })
            .await?;

        Ok(issue.labels.iter().any(|l| l.name == self.checkin_label))
    }

    async fn reviews(&self, pr: PrNumber) -> Result<Vec<ReviewResponse>, GitHubApiError> {
        let client = &self.client;
        let mut page = 1u32;
        let mut all = Vec::new();

        loop {
            let route = client.route(&format!(
                "pulls/{}/reviews?per_page={}&page={}",
                pr, PAGE_SIZE, page
            ));
            let route = route.as_str();
            let items: Vec<ReviewResponse> = client
                .call(move || async move {
                    client
                        .inner()
                        .get(route, None::<&()>)
                        .await
                        .map_err(GitHubApiError::from_octocrab)
                })
                .await?;

            let is_last_page = items.len() < PAGE_SIZE as usize;
            all.extend(items);
            if is_last_page {
                break;
            }
            page += 1;
        }

        Ok(all)
    }
}

impl BugTracker for GitHubBugTracker {
    #[instrument(skip(self))]
    async fn bug_state(&self, bug: BugId, pr: PrNumber) -> Result<BugState, BugTrackerError> {
        let checkin_requested = self
            .has_checkin_label(bug)
            .await
            .map_err(|e| e.into_bug_tracker(bug))?;

        let approved = match self.reviews(pr).await {
            Ok(reviews) => is_approved(&reviews),
            // A pull request that vanished cannot be approved.
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e.into_bug_tracker(bug)),
        };

        debug!(checkin_requested, approved, "Read bug state");
        Ok(BugState {
            checkin_requested,
            approved,
        })
    }

    async fn list_comments(&self, bug: BugId) -> Result<Vec<String>, BugTrackerError> {
        let client = &self.client;
        let mut page = 1u32;
        let mut all_comments = Vec::new();

        loop {
            let page_result = client
                .call(move || async move {
                    client
                        .inner()
                        .issues(client.owner(), client.repo_name())
                        .list_comments(bug.0)
                        .per_page(PAGE_SIZE)
                        .page(page)
                        .send()
                        .await
                        .map_err(GitHubApiError::from_octocrab)
                })
                .await
                .map_err(|e| e.into_bug_tracker(bug))?;

            let items = page_result.items;
            let is_last_page = items.len() < PAGE_SIZE as usize;
            all_comments.extend(items.into_iter().map(|c| c.body.unwrap_or_default()));

            if is_last_page {
                break;
            }
            page += 1;
        }

        Ok(all_comments)
    }

    #[instrument(skip(self, body))]
    async fn post_comment(&self, bug: BugId, body: &str) -> Result<(), BugTrackerError> {
        let client = &self.client;
        client
            .call(move || async move {
                client
                    .inner()
                    .issues(client.owner(), client.repo_name())
                    .create_comment(bug.0, body)
                    .await
                    .map(|_| ())
                    .map_err(GitHubApiError::from_octocrab)
            })
            .await
            .map_err(|e| e.into_bug_tracker(bug))
    }

    #[instrument(skip(self))]
    async fn clear_checkin_requested(&self, bug: BugId) -> Result<(), BugTrackerError> {
        let client = &self.client;
        let route = client.route(&format!(
            "issues/{}/labels/{}",
            bug,
            urlencoding::encode(&self.checkin_label)
        ));
        let route = route.as_str();

        let result = client
            .call(move || async move {
                let response = client
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
            Ok(()) => Ok(()),
            // The label was already gone.
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into_bug_tracker(bug)),
        }
    }

    #[instrument(skip(self))]
    async fn resolve_fixed(&self, bug: BugId) -> Result<(), BugTrackerError> {
        let client = &self.client;
        let route = client.route(&format!("issues/{}", bug));
        let request = CloseIssueRequest {
            state: "closed",
            state_reason: "completed",
        };
        let (route, request) = (route.as_str(), &request);

        client
            .call(move || async move {
                let _: serde_json::Value = client
                    .inner()
                    .patch(route, Some(request))
                    .await
                    .map_err(GitHubApiError::from_octocrab)?;
                Ok(())
            })
            .await
            .map_err(|e| e.into_bug_tracker(bug))
    }

    /// Posts a link comment once; repeated attachment is a no-op.
    #[instrument(skip(self))]
    async fn attach_pull_request(
        &self,
        bug: BugId,
        pr: PrNumber,
        source_branch: &str,
        target_branch: &str,
    ) -> Result<(), BugTrackerError> {
        let body = attached_comment(pr, source_branch, target_branch);
        if self.list_comments(bug).await?.contains(&body) {
            debug!("Pull request already attached");
            return Ok(());
        }
        self.post_comment(bug, &body).await
    }
}
