//! Durable record of the in-flight integration attempt per target branch.
//!
//! Every write replaces the whole attempt record, so the stored value always
//! reflects the last completed transition.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, instrument};

use super::{Result, StoreError};
use crate::table::{Lookup, TableEntity, TableStore};
use crate::types::IntegrationAttempt;

/// Name of the backing table.
pub const ACTIVE_ATTEMPT_TABLE: &str = "autolanderactiveintegrations";

/// All attempts share one partition so that startup can list them in one query.
const PARTITION: &str = "attempts";

const ATTEMPT_PROPERTY: &str = "attempt";

#[derive(Debug)]
pub struct ActiveAttemptStore<T> {
    table: Arc<T>,
}

impl<T> Clone for ActiveAttemptStore<T> {
    fn clone(&self) -> Self {
        ActiveAttemptStore {
            table: Arc::clone(&self.table),
        }
    }
}

fn decode(entity: TableEntity) -> Result<IntegrationAttempt> {
    let value = entity
        .properties
        .get(ATTEMPT_PROPERTY)
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
        table: ACTIVE_ATTEMPT_TABLE,
        key: entity.row_key,
        source,
    })
}

impl<T: TableStore> ActiveAttemptStore<T> {
    pub fn new(table: Arc<T>) -> Self {
        ActiveAttemptStore { table }
    }

    /// Creates the backing table if absent.
    pub async fn init(&self) -> Result<()> {
        self.table
            .create_table_if_absent(ACTIVE_ATTEMPT_TABLE)
            .await?;
        Ok(())
    }

    /// Writes the attempt, replacing any record for the same target branch.
    #[instrument(skip(self, attempt), fields(branch = %attempt.target_branch, outcome = ?attempt.outcome))]
    pub async fn save(&self, attempt: &IntegrationAttempt) -> Result<()> {
        let properties = json!({ ATTEMPT_PROPERTY: attempt });
        let entity = TableEntity::new(PARTITION, attempt.target_branch.clone(), properties);
        self.table.upsert(ACTIVE_ATTEMPT_TABLE, entity).await?;
        debug!("Persisted attempt");
        Ok(())
    }

    pub async fn load(&self, target_branch: &str) -> Result<Option<IntegrationAttempt>> {
        match self
            .table
            .get(ACTIVE_ATTEMPT_TABLE, PARTITION, target_branch)
            .await?
        {
            Lookup::Found(entity) => decode(entity).map(Some),
            Lookup::NotFound => Ok(None),
        }
    }

    /// Removes the record for a target branch. Absent records are ignored.
    #[instrument(skip(self))]
    pub async fn remove(&self, target_branch: &str) -> Result<()> {
        self.table
            .delete(ACTIVE_ATTEMPT_TABLE, PARTITION, target_branch)
            .await?;
        debug!("Removed attempt record");
        Ok(())
    }

    /// Every persisted attempt, ordered by target branch.
    pub async fn list_all(&self) -> Result<Vec<IntegrationAttempt>> {
        self.table
            .query_partition(ACTIVE_ATTEMPT_TABLE, PARTITION)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }
}
