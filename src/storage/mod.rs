//! Persistence for upload batches and their equipment records.
//!
//! Handlers and services only see the [`Repository`] trait. Two backends
//! implement it: [`postgres::PgRepository`] for deployments and
//! [`memory::MemoryRepository`] for local runs and tests.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::aggregate::Aggregates;
use crate::models::{EquipmentRecord, NewEquipment, RecordFilter, UploadBatch};

#[cfg(test)]
pub mod broken;
pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PgRepository;

// ---

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StorageError::NotFound("row not found".to_string()),
            other => StorageError::Database(other.to_string()),
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

pub type SharedRepository = Arc<dyn Repository>;

/// Storage operations for batches and records.
///
/// Implementations must make [`Repository::create_batch_with_records`]
/// atomic: readers observe either the batch with all of its records, or
/// nothing at all.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Store a batch snapshot and all of its rows as one unit.
    ///
    /// Record ids are allocated in `rows` order, so listing a batch's records
    /// by ascending id returns them in CSV order.
    async fn create_batch_with_records(
        &self,
        aggregates: &Aggregates,
        rows: &[NewEquipment],
    ) -> StorageResult<UploadBatch>;

    async fn get_batch(&self, id: i64) -> StorageResult<UploadBatch>;

    /// Batches ordered by upload time, ties broken by id in the same direction.
    async fn list_batches(
        &self,
        limit: usize,
        most_recent_first: bool,
    ) -> StorageResult<Vec<UploadBatch>>;

    /// Records matching `filter`, in ascending id order.
    async fn list_records(&self, filter: &RecordFilter) -> StorageResult<Vec<EquipmentRecord>>;

    /// Remove a batch and, by cascade, all of its records.
    // No route removes uploads; kept as the batch lifecycle operation.
    #[allow(dead_code)]
    async fn delete_batch(&self, id: i64) -> StorageResult<()>;

    async fn health_check(&self) -> StorageResult<()>;
}

fn batch_not_found(id: i64) -> StorageError {
    StorageError::NotFound(format!("upload {id}"))
}
