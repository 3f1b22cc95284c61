//! Database schema management for `chemflow-equipment`.
//!
//! Ensures required tables and indexes exist before serving requests.
//! Applied once on startup from `main.rs`, only when PostgreSQL storage is
//! configured.

use anyhow::Result;
use sqlx::PgPool;

// ---

/// Create the database schema if missing (idempotent).
///
/// `upload_batches` holds one row per CSV upload with its snapshot
/// statistics; `equipment_records` holds the rows, deleted together with
/// their batch.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS upload_batches (
            id                BIGSERIAL PRIMARY KEY,
            uploaded_at       TIMESTAMPTZ      NOT NULL DEFAULT now(),
            total_equipment   BIGINT           NOT NULL,
            avg_flowrate      DOUBLE PRECISION NOT NULL,
            avg_pressure      DOUBLE PRECISION NOT NULL,
            avg_temperature   DOUBLE PRECISION NOT NULL,
            type_distribution JSONB            NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS equipment_records (
            id             BIGSERIAL PRIMARY KEY,
            batch_id       BIGINT           NOT NULL
                           REFERENCES upload_batches (id) ON DELETE CASCADE,
            name           TEXT             NOT NULL,
            equipment_type TEXT             NOT NULL,
            flowrate       DOUBLE PRECISION NOT NULL,
            pressure       DOUBLE PRECISION NOT NULL,
            temperature    DOUBLE PRECISION NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // History is read newest first
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_upload_batches_uploaded_at
            ON upload_batches (uploaded_at DESC, id DESC);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_equipment_records_batch_id
            ON equipment_records (batch_id, id);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_equipment_records_type
            ON equipment_records (equipment_type);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}
