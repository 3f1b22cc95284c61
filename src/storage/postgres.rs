//! PostgreSQL repository backed by an sqlx pool.
//!
//! Tables are created by [`crate::schema::create_schema`]. Batch creation runs
//! in a single transaction holding a transaction-scoped advisory lock, so
//! concurrent uploads are serialized and a failed insert rolls everything back.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, PgPool};
use tracing::debug;

use super::{batch_not_found, Repository, StorageError, StorageResult};
use crate::aggregate::Aggregates;
use crate::models::{EquipmentRecord, NewEquipment, RecordFilter, UploadBatch};

/// Advisory lock key guarding batch creation.
const BATCH_CREATE_LOCK: i64 = 0x4551_5550; // "EQUP"

// ---

pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BatchRow {
    id: i64,
    uploaded_at: DateTime<Utc>,
    total_equipment: i64,
    avg_flowrate: f64,
    avg_pressure: f64,
    avg_temperature: f64,
    type_distribution: Json<BTreeMap<String, i64>>,
}

impl From<BatchRow> for UploadBatch {
    fn from(row: BatchRow) -> Self {
        UploadBatch {
            id: row.id,
            uploaded_at: row.uploaded_at,
            total_equipment: row.total_equipment,
            avg_flowrate: row.avg_flowrate,
            avg_pressure: row.avg_pressure,
            avg_temperature: row.avg_temperature,
            type_distribution: row.type_distribution.0,
        }
    }
}

const BATCH_COLUMNS: &str = "id, uploaded_at, total_equipment, avg_flowrate, avg_pressure, \
                             avg_temperature, type_distribution";

#[async_trait]
impl Repository for PgRepository {
    async fn create_batch_with_records(
        &self,
        aggregates: &Aggregates,
        rows: &[NewEquipment],
    ) -> StorageResult<UploadBatch> {
        // ---
        // Dropping `tx` on any early return rolls the whole batch back.
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(BATCH_CREATE_LOCK)
            .execute(&mut *tx)
            .await?;

        let batch: BatchRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO upload_batches (
                total_equipment, avg_flowrate, avg_pressure,
                avg_temperature, type_distribution
            ) VALUES ($1, $2, $3, $4, $5)
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(aggregates.count)
        .bind(aggregates.avg_flowrate)
        .bind(aggregates.avg_pressure)
        .bind(aggregates.avg_temperature)
        .bind(Json(aggregates.distribution_map()))
        .fetch_one(&mut *tx)
        .await?;

        // One statement for all rows; ORDINALITY keeps ids in CSV order
        let mut names = Vec::with_capacity(rows.len());
        let mut types = Vec::with_capacity(rows.len());
        let mut flowrates = Vec::with_capacity(rows.len());
        let mut pressures = Vec::with_capacity(rows.len());
        let mut temperatures = Vec::with_capacity(rows.len());
        for row in rows {
            names.push(row.name.as_str());
            types.push(row.equipment_type.as_str());
            flowrates.push(row.flowrate);
            pressures.push(row.pressure);
            temperatures.push(row.temperature);
        }

        sqlx::query(
            r#"
            INSERT INTO equipment_records (
                batch_id, name, equipment_type,
                flowrate, pressure, temperature
            )
            SELECT $1, u.name, u.equipment_type, u.flowrate, u.pressure, u.temperature
            FROM UNNEST($2::TEXT[], $3::TEXT[], $4::FLOAT8[], $5::FLOAT8[], $6::FLOAT8[])
                WITH ORDINALITY
                AS u (name, equipment_type, flowrate, pressure, temperature, ord)
            ORDER BY u.ord
            "#,
        )
        .bind(batch.id)
        .bind(names)
        .bind(types)
        .bind(flowrates)
        .bind(pressures)
        .bind(temperatures)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Committed upload {} with {} records", batch.id, rows.len());

        Ok(batch.into())
    }

    async fn get_batch(&self, id: i64) -> StorageResult<UploadBatch> {
        // ---
        let row: Option<BatchRow> = sqlx::query_as(&format!(
            "SELECT {BATCH_COLUMNS} FROM upload_batches WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UploadBatch::from).ok_or_else(|| batch_not_found(id))
    }

    async fn list_batches(
        &self,
        limit: usize,
        most_recent_first: bool,
    ) -> StorageResult<Vec<UploadBatch>> {
        // ---
        let direction = if most_recent_first { "DESC" } else { "ASC" };
        let limit = i64::try_from(limit)
            .map_err(|_| StorageError::Database(format!("limit out of range: {limit}")))?;

        let rows: Vec<BatchRow> = sqlx::query_as(&format!(
            "SELECT {BATCH_COLUMNS} FROM upload_batches \
             ORDER BY uploaded_at {direction}, id {direction} LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(UploadBatch::from).collect())
    }

    async fn list_records(&self, filter: &RecordFilter) -> StorageResult<Vec<EquipmentRecord>> {
        // ---
        let records = sqlx::query_as::<_, EquipmentRecord>(
            r#"
            SELECT id, batch_id, name, equipment_type, flowrate, pressure, temperature
            FROM equipment_records
            WHERE ($1::BIGINT IS NULL OR batch_id = $1)
              AND ($2::TEXT IS NULL OR equipment_type = $2)
            ORDER BY id
            "#,
        )
        .bind(filter.batch_id)
        .bind(filter.equipment_type.as_deref())
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn delete_batch(&self, id: i64) -> StorageResult<()> {
        // ---
        // equipment_records rows go with it (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM upload_batches WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(batch_not_found(id));
        }
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
