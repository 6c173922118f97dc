//! On-disk table storage.
//!
//! # Layout
//!
//! ```text
//! <root>/<table>/<hex(partition_key)>/<hex(row_key)>.json
//! ```
//!
//! Keys are hex-encoded so that arbitrary strings (branch names containing
//! `/`, for example) map to flat, portable file names.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::trace;

use super::fsync::{fsync_dir, remove_durable, write_atomic};
use super::{Lookup, Result, TableEntity, TableError, TableStore};

const ENTITY_EXTENSION: &str = "json";

/// A [`TableStore`] backed by a directory tree.
#[derive(Debug, Clone)]
pub struct FileTable {
    root: PathBuf,
}

impl FileTable {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FileTable { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table_dir(&self, table: &str) -> PathBuf {
        self.root.join(table)
    }

    fn partition_dir(&self, table: &str, partition_key: &str) -> PathBuf {
        self.table_dir(table).join(hex::encode(partition_key))
    }

    fn entity_path(&self, table: &str, partition_key: &str, row_key: &str) -> PathBuf {
        self.partition_dir(table, partition_key)
            .join(format!("{}.{}", hex::encode(row_key), ENTITY_EXTENSION))
    }

    fn require_table(&self, table: &str) -> Result<()> {
        if self.table_dir(table).is_dir() {
            Ok(())
        } else {
            Err(TableError::TableNotFound(table.to_string()))
        }
    }
}

fn read_entity(path: &Path) -> Result<Lookup<TableEntity>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Lookup::Found(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Lookup::NotFound),
        Err(e) => Err(e.into()),
    }
}

impl TableStore for FileTable {
    async fn create_table_if_absent(&self, table: &str) -> Result<()> {
        let dir = self.table_dir(table);
        if !dir.is_dir() {
            fs::create_dir_all(&dir)?;
            fsync_dir(&self.root)?;
            trace!(table, path = %dir.display(), "Created table directory");
        }
        Ok(())
    }

    async fn upsert(&self, table: &str, entity: TableEntity) -> Result<()> {
        self.require_table(table)?;

        let partition_dir = self.partition_dir(table, &entity.partition_key);
        if !partition_dir.is_dir() {
            fs::create_dir_all(&partition_dir)?;
            fsync_dir(&self.table_dir(table))?;
        }

        let path = self.entity_path(table, &entity.partition_key, &entity.row_key);
        let bytes = serde_json::to_vec_pretty(&entity)?;
        write_atomic(&path, &bytes)?;
        Ok(())
    }

    async fn get(&self, table: &str, partition_key: &str, row_key: &str) -> Result<Lookup<TableEntity>> {
        self.require_table(table)?;
        read_entity(&self.entity_path(table, partition_key, row_key))
    }

    async fn delete(&self, table: &str, partition_key: &str, row_key: &str) -> Result<()> {
        self.require_table(table)?;
        remove_durable(&self.entity_path(table, partition_key, row_key))?;
        Ok(())
    }

    async fn query_partition(&self, table: &str, partition_key: &str) -> Result<Vec<TableEntity>> {
        self.require_table(table)?;

        let dir = self.partition_dir(table, partition_key);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entities = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTITY_EXTENSION) {
                continue;
            }
            if let Lookup::Found(entity) = read_entity(&path)? {
                entities.push(entity);
            }
        }

        entities.sort_by(|a, b| a.row_key.cmp(&b.row_key));
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    async fn table_in(dir: &Path) -> FileTable {
        let table = FileTable::new(dir);
        table.create_table_if_absent("things").await.unwrap();
        table
    }

    #[tokio::test]
    async fn operations_require_created_table() {
        let dir = tempdir().unwrap();
        let table = FileTable::new(dir.path());

        let err = table.get("missing", "p", "r").await.unwrap_err();
        assert!(matches!(err, TableError::TableNotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn create_table_is_idempotent() {
        let dir = tempdir().unwrap();
        let table = table_in(dir.path()).await;
        table
            .upsert("things", TableEntity::new("p", "r", json!({"n": 1})))
            .await
            .unwrap();

        table.create_table_if_absent("things").await.unwrap();

        assert!(table.get("things", "p", "r").await.unwrap().is_found());
    }

    #[tokio::test]
    async fn upsert_replaces_and_get_reads_back() {
        let dir = tempdir().unwrap();
        let table = table_in(dir.path()).await;

        table
            .upsert("things", TableEntity::new("p", "r", json!({"n": 1})))
            .await
            .unwrap();
        table
            .upsert("things", TableEntity::new("p", "r", json!({"n": 2})))
            .await
            .unwrap();

        let found = table.get("things", "p", "r").await.unwrap();
        assert_eq!(found, Lookup::Found(TableEntity::new("p", "r", json!({"n": 2}))));
        assert_eq!(table.query_partition("things", "p").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_entity_is_not_found() {
        let dir = tempdir().unwrap();
        let table = table_in(dir.path()).await;

        assert_eq!(table.get("things", "p", "r").await.unwrap(), Lookup::NotFound);
    }

    #[tokio::test]
    async fn delete_is_forced() {
        let dir = tempdir().unwrap();
        let table = table_in(dir.path()).await;

        table.delete("things", "p", "r").await.unwrap();

        table
            .upsert("things", TableEntity::new("p", "r", json!(null)))
            .await
            .unwrap();
        table.delete("things", "p", "r").await.unwrap();
        assert_eq!(table.get("things", "p", "r").await.unwrap(), Lookup::NotFound);
    }

    #[tokio::test]
    async fn keys_with_slashes_are_stored_flat() {
        let dir = tempdir().unwrap();
        let table = table_in(dir.path()).await;

        table
            .upsert("things", TableEntity::new("p", "release/v2.2", json!({})))
            .await
            .unwrap();

        let rows = table.query_partition("things", "p").await.unwrap();
        assert_eq!(rows[0].row_key, "release/v2.2");
    }

    #[tokio::test]
    async fn query_partition_is_sorted_and_scoped() {
        let dir = tempdir().unwrap();
        let table = table_in(dir.path()).await;

        for row in ["b", "a", "c"] {
            table
                .upsert("things", TableEntity::new("p", row, json!({})))
                .await
                .unwrap();
        }
        table
            .upsert("things", TableEntity::new("other", "z", json!({})))
            .await
            .unwrap();

        let rows: Vec<_> = table
            .query_partition("things", "p")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.row_key)
            .collect();
        assert_eq!(rows, vec!["a", "b", "c"]);
        assert!(table.query_partition("things", "empty").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn data_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let table = table_in(dir.path()).await;
            table
                .upsert("things", TableEntity::new("p", "r", json!({"kept": true})))
                .await
                .unwrap();
        }

        let reopened = FileTable::new(dir.path());
        let found = reopened.get("things", "p", "r").await.unwrap().into_option().unwrap();
        assert_eq!(found.properties, json!({"kept": true}));
    }
}
