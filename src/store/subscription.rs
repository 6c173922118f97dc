//! Durable set of subscribed bugs.
//!
//! The set is an index used to cheaply drop notifications for bugs nobody
//! is landing. It is never the source of truth for landing decisions.

use std::sync::Arc;

use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use super::Result;
use crate::table::{Lookup, TableEntity, TableStore};
use crate::types::BugId;

/// Name of the backing table.
pub const SUBSCRIPTION_TABLE: &str = "autolandersubscribedbugs";

/// Partition key for a bug: lowercase hex SHA-256 of its decimal id.
///
/// Hashing spreads bugs evenly across partitions while staying
/// deterministic across restarts.
pub fn partition_key(bug: BugId) -> String {
    hex::encode(Sha256::digest(bug.to_string().as_bytes()))
}

/// Subscription records keyed by bug.
#[derive(Debug)]
pub struct SubscriptionStore<T> {
    table: Arc<T>,
}

impl<T> Clone for SubscriptionStore<T> {
    fn clone(&self) -> Self {
        SubscriptionStore {
            table: Arc::clone(&self.table),
        }
    }
}

impl<T: TableStore> SubscriptionStore<T> {
    pub fn new(table: Arc<T>) -> Self {
        SubscriptionStore { table }
    }

    /// Creates the backing table if absent.
    pub async fn init(&self) -> Result<()> {
        self.table.create_table_if_absent(SUBSCRIPTION_TABLE).await?;
        Ok(())
    }

    /// Records interest in a bug. Idempotent.
    #[instrument(skip(self), fields(bug = %bug))]
    pub async fn subscribe(&self, bug: BugId) -> Result<()> {
        let entity = TableEntity::new(
            partition_key(bug),
            bug.to_string(),
            json!({ "bug": bug }),
        );
        self.table.upsert(SUBSCRIPTION_TABLE, entity).await?;
        debug!("Subscribed to bug");
        Ok(())
    }

    /// Drops interest in a bug. Unsubscribing an unknown bug succeeds.
    #[instrument(skip(self), fields(bug = %bug))]
    pub async fn unsubscribe(&self, bug: BugId) -> Result<()> {
        self.table
            .delete(SUBSCRIPTION_TABLE, &partition_key(bug), &bug.to_string())
            .await?;
        debug!("Unsubscribed from bug");
        Ok(())
    }

    pub async fn is_subscribed(&self, bug: BugId) -> Result<bool> {
        let lookup = self
            .table
            .get(SUBSCRIPTION_TABLE, &partition_key(bug), &bug.to_string())
            .await?;
        Ok(matches!(lookup, Lookup::Found(_)))
    }
}
