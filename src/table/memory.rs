//! In-process table storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{Lookup, Result, TableEntity, TableError, TableStore};

type Rows = BTreeMap<(String, String), TableEntity>;

/// A [`TableStore`] held entirely in memory.
///
/// `set_unavailable(true)` makes every operation fail with
/// [`TableError::Unavailable`] until cleared.
#[derive(Debug, Default)]
pub struct MemoryTable {
    tables: Mutex<HashMap<String, Rows>>,
    unavailable: AtomicBool,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of entities in a table, or `None` if it was never created.
    pub fn len(&self, table: &str) -> Option<usize> {
        self.lock().get(table).map(|rows| rows.len())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Rows>> {
        // A panic while holding the lock cannot leave a row half-written.
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(TableError::Unavailable("memory table offline".to_string()))
        } else {
            Ok(())
        }
    }

    fn with_table<T>(&self, table: &str, f: impl FnOnce(&mut Rows) -> T) -> Result<T> {
        self.check_available()?;
        let mut tables = self.lock();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| TableError::TableNotFound(table.to_string()))?;
        Ok(f(rows))
    }
}

impl TableStore for MemoryTable {
    async fn create_table_if_absent(&self, table: &str) -> Result<()> {
        self.check_available()?;
        self.lock().entry(table.to_string()).or_default();
        Ok(())
    }

    async fn upsert(&self, table: &str, entity: TableEntity) -> Result<()> {
        self.with_table(table, |rows| {
            rows.insert(
                (entity.partition_key.clone(), entity.row_key.clone()),
                entity,
            );
        })
    }

    async fn get(&self, table: &str, partition_key: &str, row_key: &str) -> Result<Lookup<TableEntity>> {
        self.with_table(table, |rows| {
            match rows.get(&(partition_key.to_string(), row_key.to_string())) {
                Some(entity) => Lookup::Found(entity.clone()),
                None => Lookup::NotFound,
            }
        })
    }

    async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> Result<()> {
        self.with_table(table, |rows| {
            rows.remove(&(partition_key.to_string(), row_key.to_string()));
        })
    }

    async fn query_partition(&self, table: &str, partition_key: &str) -> Result<Vec<TableEntity>> {
        self.with_table(table, |rows| {
            rows.iter()
                .filter(|((p, _), _)| p == partition_key)
                .map(|(_, entity)| entity.clone())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn behaves_like_a_table() {
        let table = MemoryTable::new();
        assert!(matches!(
            table.get("t", "p", "r").await,
            Err(TableError::TableNotFound(_))
        ));

        table.create_table_if_absent("t").await.unwrap();
        table
            .upsert("t", TableEntity::new("p", "r", json!(1)))
            .await
            .unwrap();
        table
            .upsert("t", TableEntity::new("p", "r", json!(2)))
            .await
            .unwrap();
        assert_eq!(table.len("t"), Some(1));
        assert_eq!(
            table.get("t", "p", "r").await.unwrap(),
            Lookup::Found(TableEntity::new("p", "r", json!(2)))
        );

        table.delete("t", "p", "r").await.unwrap();
        table.delete("t", "p", "r").await.unwrap();
        assert_eq!(table.get("t", "p", "r").await.unwrap(), Lookup::NotFound);
    }

    #[tokio::test]
    async fn unavailable_fails_every_operation() {
        let table = MemoryTable::new();
        table.create_table_if_absent("t").await.unwrap();
        table.set_unavailable(true);

        assert!(matches!(
            table.get("t", "p", "r").await,
            Err(TableError::Unavailable(_))
        ));
        assert!(matches!(
            table.upsert("t", TableEntity::new("p", "r", json!(null))).await,
            Err(TableError::Unavailable(_))
        ));

        table.set_unavailable(false);
        assert_eq!(table.get("t", "p", "r").await.unwrap(), Lookup::NotFound);
    }
}
