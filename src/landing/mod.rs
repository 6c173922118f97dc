//! Landing queue, coalescer and per-branch coordination.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────────────── LandingContext (shared) ───────────────────────┐
//!                  │  SourceControl  BugTracker  TaskRunner  Subscriptions  Attempts  Index │
//!                  └────────────────────────────────────────────────────────────────────────┘
//!                        ▲                        ▲                         ▲
//! BranchEvent ──► BranchCoordinator(master)  BranchCoordinator(v2.2)   ...
//!                   arena: PrNumber → PullRequest
//!                   queue: LandingQueue (indices into the arena)
//!                   attempt: Option<IntegrationAttempt>
//! ```
//!
//! Each coordinator exclusively owns its arena, queue and current attempt.
//! The stores are durable mirrors, written before the side effect they guard.

mod coordinator;
mod index;
mod queue;
mod recovery;


use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::collab::{BugTrackerError, CiError, ScmError};
use crate::store::{ActiveAttemptStore, PullRequestStore, StoreError, SubscriptionStore};
use crate::table::TableStore;
use crate::tracker::DEFAULT_TASK_GRAPH_PATH;
use crate::types::{BugId, IntegrationAttempt, PrNumber, PullRequest, RunId};

pub use coordinator::BranchCoordinator;
pub use index::PullRequestIndex;
pub use queue::LandingQueue;

/// Errors surfaced by a branch coordinator.
///
/// User-facing outcomes (invalid titles, merge conflicts, CI failures) are
/// handled inside the coordinator and never appear here.
#[derive(Debug, Error)]
pub enum LandingError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scm(#[from] ScmError),

    #[error(transparent)]
    Bugs(#[from] BugTrackerError),

    #[error(transparent)]
    Ci(#[from] CiError),

    #[error("attempt on {target} succeeded without an integration head")]
    MissingHead { target: String },
}

impl LandingError {
    /// True for operational failures that a later event or poll may get past.
    pub fn is_retriable(&self) -> bool {
        match self {
            LandingError::Store(StoreError::Unavailable(_)) => true,
            LandingError::Store(StoreError::Corrupt { .. }) => false,
            LandingError::Scm(ScmError::Unavailable(_)) => true,
            LandingError::Bugs(BugTrackerError::Unavailable(_)) => true,
            LandingError::Ci(CiError::Unavailable(_)) => true,
            LandingError::Scm(_)
            | LandingError::Bugs(_)
            | LandingError::Ci(_)
            | LandingError::MissingHead { .. } => false,
        }
    }
}

/// Result type for landing operations.
pub type Result<T> = std::result::Result<T, LandingError>;

/// Default context name for the commit statuses set on pull requests.
pub const DEFAULT_STATUS_CONTEXT: &str = "autolander";

/// Repository-level settings shared by all coordinators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LandingSettings {
    /// Path of the task graph file inside the repository.
    pub task_graph_path: String,
    /// Context name of the commit statuses set on pull requests.
    pub status_context: String,
}

impl Default for LandingSettings {
    fn default() -> Self {
        LandingSettings {
            task_graph_path: DEFAULT_TASK_GRAPH_PATH.to_string(),
            status_context: DEFAULT_STATUS_CONTEXT.to_string(),
        }
    }
}

/// Collaborators and stores shared by every branch coordinator.
pub struct LandingContext<S, B, R, T> {
    pub scm: S,
    pub bugs: B,
    pub ci: R,
    pub subscriptions: SubscriptionStore<T>,
    pub attempts: ActiveAttemptStore<T>,
    pub pull_requests: PullRequestStore<T>,
    pub index: PullRequestIndex,
    pub settings: LandingSettings,
    /// Held across every index change and the subscription write it implies,
    /// so that no bug is unsubscribed while a pull request references it.
    subscription_lock: Mutex<()>,
}

impl<S, B, R, T: TableStore> LandingContext<S, B, R, T> {
    /// Builds a context whose stores all live in `table`.
    pub fn new(scm: S, bugs: B, ci: R, table: Arc<T>, settings: LandingSettings) -> Self {
        LandingContext {
            scm,
            bugs,
            ci,
            subscriptions: SubscriptionStore::new(Arc::clone(&table)),
            attempts: ActiveAttemptStore::new(Arc::clone(&table)),
            pull_requests: PullRequestStore::new(table),
            index: PullRequestIndex::new(),
            settings,
            subscription_lock: Mutex::new(()),
        }
    }

    /// Creates every backing table that does not exist yet.
    pub async fn init_stores(&self) -> std::result::Result<(), StoreError> {
        self.subscriptions.init().await?;
        self.attempts.init().await?;
        self.pull_requests.init().await
    }

    /// Subscribes to `bug`, then indexes the pull request referencing it.
    pub async fn track(
        &self,
        pr: PrNumber,
        bug: BugId,
        target_branch: &str,
    ) -> std::result::Result<(), StoreError> {
        let _guard = self.subscription_lock.lock().await;
        self.subscriptions.subscribe(bug).await?;
        self.index.track(pr, bug, target_branch);
        Ok(())
    }

    /// Drops a pull request from the index and unsubscribes its bug if no
    /// other tracked pull request references it.
    pub async fn untrack(&self, pr: PrNumber, bug: BugId) -> std::result::Result<(), StoreError> {
        let _guard = self.subscription_lock.lock().await;
        self.index.untrack(pr);
        if !self.index.is_referenced(bug) {
            debug!(%bug, "No tracked pull request left, unsubscribing");
            self.subscriptions.unsubscribe(bug).await?;
        }
        Ok(())
    }
}

/// An event for one target branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchEvent {
    Opened {
        number: PrNumber,
        title: String,
        source_branch: String,
    },
    Closed {
        number: PrNumber,
    },
    /// Flags or review state of the bug may have changed.
    BugChanged {
        bug: BugId,
    },
    RunCompleted {
        run_id: RunId,
    },
    /// Periodic tick: re-poll the running attempt and retry stalled work.
    Poll,
}

/// Read-only snapshot of a coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchView {
    pub target_branch: String,
    pub queue: Vec<PrNumber>,
    pub attempt: Option<IntegrationAttempt>,
    pub pull_requests: Vec<PullRequest>,
}
