use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{batch_not_found, Repository, StorageResult};
use crate::aggregate::Aggregates;
use crate::models::{EquipmentRecord, NewEquipment, RecordFilter, UploadBatch};

#[derive(Debug, Default)]
struct Tables {
    batches: BTreeMap<i64, UploadBatch>,
    records: BTreeMap<i64, EquipmentRecord>,
    /// batch id -> record ids, ascending
    by_batch: BTreeMap<i64, Vec<i64>>,
}

/// In-process repository.
///
/// Ids are reserved and records built before the write lock is taken; the
/// batch and its records are then inserted under one write lock, so readers
/// never see a partially created batch and are only blocked for the inserts.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
    next_batch_id: AtomicI64,
    next_record_id: AtomicI64,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn create_batch_with_records(
        &self,
        aggregates: &Aggregates,
        rows: &[NewEquipment],
    ) -> StorageResult<UploadBatch> {
        let batch_id = self.next_batch_id.fetch_add(1, Ordering::Relaxed) + 1;
        // Contiguous range, so ascending ids follow `rows` order
        let first_record_id =
            self.next_record_id.fetch_add(rows.len() as i64, Ordering::Relaxed) + 1;

        let records: Vec<EquipmentRecord> = rows
            .iter()
            .zip(first_record_id..)
            .map(|(row, id)| row.clone().into_record(id, batch_id))
            .collect();
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();

        let type_distribution = aggregates.distribution_map();

        let mut t = self.tables.write().await;
        let batch = UploadBatch {
            id: batch_id,
            uploaded_at: Utc::now(),
            total_equipment: aggregates.count,
            avg_flowrate: aggregates.avg_flowrate,
            avg_pressure: aggregates.avg_pressure,
            avg_temperature: aggregates.avg_temperature,
            type_distribution,
        };
        t.records.extend(records.into_iter().map(|r| (r.id, r)));
        t.by_batch.insert(batch_id, ids);
        t.batches.insert(batch_id, batch.clone());

        Ok(batch)
    }

    async fn get_batch(&self, id: i64) -> StorageResult<UploadBatch> {
        self.tables
            .read()
            .await
            .batches
            .get(&id)
            .cloned()
            .ok_or_else(|| batch_not_found(id))
    }

    async fn list_batches(
        &self,
        limit: usize,
        most_recent_first: bool,
    ) -> StorageResult<Vec<UploadBatch>> {
        let t = self.tables.read().await;
        let mut batches: Vec<UploadBatch> = t.batches.values().cloned().collect();
        batches.sort_by(|a, b| (a.uploaded_at, a.id).cmp(&(b.uploaded_at, b.id)));
        if most_recent_first {
            batches.reverse();
        }
        batches.truncate(limit);
        Ok(batches)
    }

    async fn list_records(&self, filter: &RecordFilter) -> StorageResult<Vec<EquipmentRecord>> {
        let t = self.tables.read().await;
        let records = match filter.batch_id {
            Some(batch_id) => t
                .by_batch
                .get(&batch_id)
                .into_iter()
                .flatten()
                .filter_map(|id| t.records.get(id))
                .filter(|r| filter.matches(r))
                .cloned()
                .collect(),
            None => t
                .records
                .values()
                .filter(|r| filter.matches(r))
                .cloned()
                .collect(),
        };
        Ok(records)
    }

    async fn delete_batch(&self, id: i64) -> StorageResult<()> {
        let mut t = self.tables.write().await;
        if t.batches.remove(&id).is_none() {
            return Err(batch_not_found(id));
        }
        let record_ids = t.by_batch.remove(&id).unwrap_or_default();
        for record_id in record_ids {
            t.records.remove(&record_id);
        }
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
