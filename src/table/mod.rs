//! Key-value table storage.
//!
//! Entities are addressed by `(table, partition_key, row_key)` and carry an
//! arbitrary JSON property bag. The interface mirrors a cloud table service:
//! tables must be created before use, writes are insert-or-replace, deletes
//! are forced (no concurrency tag), and reads distinguish a missing entity
//! from a failed read.
//!
//! Two implementations are provided:
//! - [`FileTable`]: one JSON file per entity with atomic replace
//! - [`MemoryTable`]: in-process, with failure injection for tests

mod file;
mod fsync;
mod memory;

use std::future::Future;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use file::FileTable;
pub use memory::MemoryTable;

/// Errors from table operations.
#[derive(Debug, Error)]
pub enum TableError {
    /// The table was never created.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// IO error from the backing storage.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A stored entity could not be decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The table service could not be reached.
    #[error("table service unavailable: {0}")]
    Unavailable(String),
}

/// Result type for table operations.
pub type Result<T> = std::result::Result<T, TableError>;

/// A stored entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableEntity {
    pub partition_key: String,
    pub row_key: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

impl TableEntity {
    pub fn new(
        partition_key: impl Into<String>,
        row_key: impl Into<String>,
        properties: serde_json::Value,
    ) -> Self {
        TableEntity {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            properties,
        }
    }
}

/// Outcome of a point read.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
}

impl<T> Lookup<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::NotFound => None,
        }
    }
}

/// A partitioned key-value table service.
pub trait TableStore: Send + Sync {
    /// Creates the table if it does not exist. Idempotent.
    fn create_table_if_absent(&self, table: &str) -> impl Future<Output = Result<()>> + Send;

    /// Inserts the entity, replacing any existing one with the same keys.
    fn upsert(&self, table: &str, entity: TableEntity) -> impl Future<Output = Result<()>> + Send;

    /// Reads a single entity.
    fn get(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> impl Future<Output = Result<Lookup<TableEntity>>> + Send;

    /// Deletes an entity. Deleting an absent entity succeeds.
    fn delete(
        &self,
        table: &str,
        partition_key: &str,
        row_key: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Returns every entity in a partition, ordered by row key.
    fn query_partition(
        &self,
        table: &str,
        partition_key: &str,
    ) -> impl Future<Output = Result<Vec<TableEntity>>> + Send;
}
