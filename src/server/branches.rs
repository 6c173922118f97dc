//! Branch inspection endpoints for observability.
//!
//! Read-only: the live view comes from the branch worker, the attempt from
//! the durable store, so the two can be compared when debugging recovery.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::AppState;
use crate::collab::{BugTracker, SourceControl, TaskRunner};
use crate::landing::BranchView;
use crate::orchestrator::DispatchError;
use crate::store::StoreError;
use crate::table::TableStore;
use crate::types::IntegrationAttempt;

#[derive(Debug, Error)]
pub enum BranchError {
    #[error("no {what} for branch {branch}")]
    NotFound { what: &'static str, branch: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("worker error: {0}")]
    Worker(#[from] DispatchError),
}

impl IntoResponse for BranchError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            BranchError::NotFound { .. } => (StatusCode::NOT_FOUND, self.to_string()),
            BranchError::Store(StoreError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            BranchError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            BranchError::Worker(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
        };

        (status, message).into_response()
    }
}

/// Returns the live queue, attempt and tracked pull requests of a branch.
///
/// 404 if no worker has been started for the branch.
pub async fn branch_handler<S, B, R, T>(
    State(app_state): State<AppState<S, B, R, T>>,
    Path(branch): Path<String>,
) -> Result<Json<BranchView>, BranchError>
where
    S: SourceControl + 'static,
    B: BugTracker + 'static,
    R: TaskRunner + 'static,
    T: TableStore + 'static,
{
    match app_state.dispatcher().inspect(&branch).await? {
        Some(view) => Ok(Json(view)),
        None => Err(BranchError::NotFound {
            what: "worker",
            branch,
        }),
    }
}

/// Returns the persisted attempt of a branch, 404 if it has none.
pub async fn attempt_handler<S, B, R, T>(
    State(app_state): State<AppState<S, B, R, T>>,
    Path(branch): Path<String>,
) -> Result<Json<IntegrationAttempt>, BranchError>
where
    S: SourceControl + 'static,
    B: BugTracker + 'static,
    R: TaskRunner + 'static,
    T: TableStore + 'static,
{
    let attempt = app_state
        .dispatcher()
        .context()
        .attempts
        .load(&branch)
        .await?;

    attempt.map(Json).ok_or(BranchError::NotFound {
        what: "active attempt",
        branch,
    })
}
