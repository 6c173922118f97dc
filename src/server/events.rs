//! Event intake endpoint.
//!
//! Accepts landing events from whatever watches the hosting service and bug
//! tracker, and hands them to the dispatcher. Processing happens
//! asynchronously in the per-branch workers; the response only says how many
//! workers the event reached.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use super::AppState;
use crate::collab::{BugTracker, SourceControl, TaskRunner};
use crate::orchestrator::{DispatchError, LandingEvent};
use crate::table::TableStore;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("invalid event: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

impl IntoResponse for EventError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            EventError::InvalidJson(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            // Both store outages and closed worker channels are temporary
            // from the sender's point of view: redeliver later.
            EventError::Dispatch(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
        };

        (status, message).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct EventAccepted {
    /// Number of branch workers the event was delivered to.
    pub delivered: usize,
}

/// Event handler.
///
/// # Response
///
/// - 202 Accepted: routed (possibly to no worker, for irrelevant bug updates)
/// - 400 Bad Request: the body is not a `LandingEvent`
/// - 503 Service Unavailable: the subscription store or a worker is unavailable
///
/// # Example
///
/// ```ignore
/// POST /events HTTP/1.1
/// Content-Type: application/json
///
/// {"type": "bug_updated", "bug": 1016}
///
/// HTTP/1.1 202 Accepted
///
/// {"delivered": 1}
/// ```
pub async fn events_handler<S, B, R, T>(
    State(app_state): State<AppState<S, B, R, T>>,
    body: Bytes,
) -> Result<(StatusCode, Json<EventAccepted>), EventError>
where
    S: SourceControl + 'static,
    B: BugTracker + 'static,
    R: TaskRunner + 'static,
    T: TableStore + 'static,
{
    let event: LandingEvent = serde_json::from_slice(&body)?;
    debug!(kind = event.kind(), "Received event");

    let delivered = match app_state.dispatcher().dispatch(event).await {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "Failed to dispatch event");
            return Err(e.into());
        }
    };

    Ok((StatusCode::ACCEPTED, Json(EventAccepted { delivered })))
}
