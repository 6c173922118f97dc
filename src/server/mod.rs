//! HTTP server for the autolander.
//!
//! # Endpoints
//!
//! - `POST /events` - Accepts a landing event and routes it to a branch worker (202 Accepted)
//! - `GET /api/v1/branches/{branch}` - Live view of a branch's queue and attempt
//! - `GET /api/v1/branches/{branch}/attempt` - The persisted attempt for a branch
//! - `GET /health` - Returns 200 if server is running

use std::sync::Arc;

pub mod branches;
pub mod events;
pub mod health;

pub use branches::{attempt_handler, branch_handler};
pub use events::events_handler;
pub use health::health_handler;

use crate::collab::{BugTracker, SourceControl, TaskRunner};
use crate::orchestrator::Dispatcher;
use crate::table::TableStore;

/// Shared application state, passed to handlers via Axum's `State` extractor.
pub struct AppState<S, B, R, T> {
    inner: Arc<Dispatcher<S, B, R, T>>,
}

impl<S, B, R, T> Clone for AppState<S, B, R, T> {
    fn clone(&self) -> Self {
        AppState {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, B, R, T> AppState<S, B, R, T> {
    pub fn new(dispatcher: Arc<Dispatcher<S, B, R, T>>) -> Self {
        AppState { inner: dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher<S, B, R, T> {
        &self.inner
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router<S, B, R, T>(app_state: AppState<S, B, R, T>) -> axum::Router
where
    S: SourceControl + 'static,
    B: BugTracker + 'static,
    R: TaskRunner + 'static,
    T: TableStore + 'static,
{
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/events", post(events_handler::<S, B, R, T>))
        .route("/api/v1/branches/{branch}", get(branch_handler::<S, B, R, T>))
        .route(
            "/api/v1/branches/{branch}/attempt",
            get(attempt_handler::<S, B, R, T>),
        )
        .route("/health", get(health_handler))
        .with_state(app_state)
}
