//! Test-only repository whose writes and health check always fail.

use async_trait::async_trait;

use super::{batch_not_found, Repository, StorageError, StorageResult};
use crate::aggregate::Aggregates;
use crate::models::{EquipmentRecord, NewEquipment, RecordFilter, UploadBatch};

/// Behaves like a backend that lost its connection: reads come back empty,
/// commits and the health check fail.
pub struct BrokenRepository;

#[async_trait]
impl Repository for BrokenRepository {
    async fn create_batch_with_records(
        &self,
        _aggregates: &Aggregates,
        _rows: &[NewEquipment],
    ) -> StorageResult<UploadBatch> {
        Err(StorageError::Database("connection reset".to_string()))
    }

    async fn get_batch(&self, id: i64) -> StorageResult<UploadBatch> {
        Err(batch_not_found(id))
    }

    async fn list_batches(&self, _: usize, _: bool) -> StorageResult<Vec<UploadBatch>> {
        Ok(Vec::new())
    }

    async fn list_records(&self, _: &RecordFilter) -> StorageResult<Vec<EquipmentRecord>> {
        Ok(Vec::new())
    }

    async fn delete_batch(&self, id: i64) -> StorageResult<()> {
        Err(batch_not_found(id))
    }

    async fn health_check(&self) -> StorageResult<()> {
        Err(StorageError::Database("down".to_string()))
    }
}
