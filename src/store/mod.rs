//! Durable stores layered on a [`TableStore`](crate::table::TableStore).
//!
//! - [`SubscriptionStore`]: the set of bugs whose updates are worth processing
//! - [`ActiveAttemptStore`]: the in-flight integration attempt of each target branch
//! - [`PullRequestStore`]: every pull request a branch is tracking

mod attempts;
mod pull_requests;
mod subscription;

use thiserror::Error;

use crate::table::TableError;

pub use attempts::{ACTIVE_ATTEMPT_TABLE, ActiveAttemptStore};
pub use pull_requests::{PULL_REQUEST_TABLE, PullRequestStore};
pub use subscription::{SUBSCRIPTION_TABLE, SubscriptionStore, partition_key};

/// Errors from the durable stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing table failed for any reason other than a missing record.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] TableError),

    /// A record exists but cannot be decoded.
    #[error("corrupt record {key} in {table}: {source}")]
    Corrupt {
        table: &'static str,
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
