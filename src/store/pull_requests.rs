//! Durable records of the pull requests each branch is tracking.
//!
//! A record exists from the moment a pull request with a valid bug reference
//! is observed until it lands or is abandoned. Together with the active
//! attempt it is enough to rebuild a branch's arena, queue and the
//! cross-branch index after a restart.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, instrument};

use super::{Result, StoreError};
use crate::table::{TableEntity, TableStore};
use crate::types::{PrNumber, PullRequest};

/// Name of the backing table.
pub const PULL_REQUEST_TABLE: &str = "autolanderpullrequests";

/// Pull request numbers are unique per repository, so one partition holds
/// every branch and startup reads it in one query.
const PARTITION: &str = "pulls";

const RECORD_PROPERTY: &str = "pull_request";

/// Row key: zero-padded so that row order matches numeric order.
pub fn row_key(pr: PrNumber) -> String {
    format!("{:020}", pr.0)
}

#[derive(Debug)]
pub struct PullRequestStore<T> {
    table: Arc<T>,
}

impl<T> Clone for PullRequestStore<T> {
    fn clone(&self) -> Self {
        PullRequestStore {
            table: Arc::clone(&self.table),
        }
    }
}

fn decode(entity: TableEntity) -> Result<PullRequest> {
    let value = entity
        .properties
        .get(RECORD_PROPERTY)
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    serde_json::from_value(value).map_err(|source| StoreError::Corrupt {
        table: PULL_REQUEST_TABLE,
        key: entity.row_key,
        source,
    })
}

impl<T: TableStore> PullRequestStore<T> {
    pub fn new(table: Arc<T>) -> Self {
        PullRequestStore { table }
    }

    /// Creates the backing table if absent.
    pub async fn init(&self) -> Result<()> {
        self.table.create_table_if_absent(PULL_REQUEST_TABLE).await?;
        Ok(())
    }

    /// Writes the record, replacing any previous one for the same number.
    #[instrument(skip(self, pr), fields(pr = %pr.number, state = pr.state.name()))]
    pub async fn save(&self, pr: &PullRequest) -> Result<()> {
        let entity = TableEntity::new(PARTITION, row_key(pr.number), json!({ RECORD_PROPERTY: pr }));
        self.table.upsert(PULL_REQUEST_TABLE, entity).await?;
        debug!("Persisted pull request");
        Ok(())
    }

    /// Deletes a record. Absent records are ignored.
    #[instrument(skip(self))]
    pub async fn remove(&self, pr: PrNumber) -> Result<()> {
        self.table
            .delete(PULL_REQUEST_TABLE, PARTITION, &row_key(pr))
            .await?;
        debug!("Removed pull request record");
        Ok(())
    }

    /// Every tracked pull request, ordered by number.
    pub async fn list_all(&self) -> Result<Vec<PullRequest>> {
        self.table
            .query_partition(PULL_REQUEST_TABLE, PARTITION)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Tracked pull requests targeting `branch`, ordered by number.
    pub async fn list_branch(&self, branch: &str) -> Result<Vec<PullRequest>> {
        let mut prs = self.list_all().await?;
        prs.retain(|pr| pr.target_branch == branch);
        Ok(prs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{FileTable, MemoryTable};
    use crate::types::{BugId, LandingState};
    use tempfile::tempdir;

    fn record(number: u64, target: &str) -> PullRequest {
        PullRequest::new(
            PrNumber(number),
            format!("Bug {number} - change"),
            format!("branch{number}"),
            target,
            BugId(number * 10),
        )
    }

    #[tokio::test]
    async fn save_replace_remove() {
        let store = PullRequestStore::new(Arc::new(MemoryTable::new()));
        store.init().await.unwrap();

        let mut pr = record(1, "master");
        store.save(&pr).await.unwrap();
        pr.state = LandingState::AwaitingReview;
        store.save(&pr).await.unwrap();

        assert_eq!(store.list_all().await.unwrap(), vec![pr]);

        store.remove(PrNumber(1)).await.unwrap();
        store.remove(PrNumber(1)).await.unwrap();
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_branch_filters_by_target() {
        let store = PullRequestStore::new(Arc::new(MemoryTable::new()));
        store.init().await.unwrap();

        for pr in [record(12, "master"), record(3, "v2.2"), record(7, "master")] {
            store.save(&pr).await.unwrap();
        }

        let numbers: Vec<_> = store
            .list_branch("master")
            .await
            .unwrap()
            .into_iter()
            .map(|pr| pr.number)
            .collect();
        assert_eq!(numbers, vec![PrNumber(7), PrNumber(12)]);
    }

    #[tokio::test]
    async fn survives_restart_on_disk() {
        let dir = tempdir().unwrap();
        let mut pr = record(4, "master");
        pr.state = LandingState::Failed;

        {
            let store = PullRequestStore::new(Arc::new(FileTable::new(dir.path())));
            store.init().await.unwrap();
            store.save(&pr).await.unwrap();
        }

        let store = PullRequestStore::new(Arc::new(FileTable::new(dir.path())));
        store.init().await.unwrap();
        assert_eq!(store.list_branch("master").await.unwrap(), vec![pr]);
    }

    #[test]
    fn row_keys_sort_numerically() {
        assert!(row_key(PrNumber(9)) < row_key(PrNumber(10)));
        assert_eq!(row_key(PrNumber(u64::MAX)).len(), 20);
    }
}
