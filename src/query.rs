//! Read-side operations: live summaries, record filters and upload history.
//!
//! Summaries are always recomputed from the current records with
//! [`aggregate`]; only [`history`] reports the snapshot stored on each batch.
//! For a batch whose records were never touched after ingestion the two agree.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::aggregate::{aggregate, TypeCount};
use crate::error::AppError;
use crate::models::{EquipmentRecord, RecordFilter, UploadBatch};
use crate::storage::Repository;

/// Number of batches returned by the history endpoints.
pub const HISTORY_LIMIT: usize = 5;

const HISTORY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

// ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub total_equipment: i64,
    pub avg_flowrate: f64,
    pub avg_pressure: f64,
    pub avg_temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub summary: SummaryStats,
    pub type_distribution: Vec<TypeCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub uploaded_at: String,
    pub total_equipment: i64,
    pub avg_flowrate: f64,
    pub avg_pressure: f64,
    pub avg_temperature: f64,
    pub type_distribution: BTreeMap<String, i64>,
}

impl From<UploadBatch> for HistoryEntry {
    fn from(batch: UploadBatch) -> Self {
        HistoryEntry {
            id: batch.id,
            uploaded_at: batch.uploaded_at.format(HISTORY_TIME_FORMAT).to_string(),
            total_equipment: batch.total_equipment,
            avg_flowrate: batch.avg_flowrate,
            avg_pressure: batch.avg_pressure,
            avg_temperature: batch.avg_temperature,
            type_distribution: batch.type_distribution,
        }
    }
}

/// Live statistics over one batch, or over every record when `batch_id` is `None`.
///
/// An explicit but unknown `batch_id` is a [`AppError::NotFound`].
pub async fn summary(repo: &dyn Repository, batch_id: Option<i64>) -> Result<Summary, AppError> {
    // ---
    if let Some(id) = batch_id {
        repo.get_batch(id).await?;
    }

    let records = repo
        .list_records(&RecordFilter {
            batch_id,
            equipment_type: None,
        })
        .await?;
    let agg = aggregate(&records);
    debug!("Summary over {} records (upload {:?})", agg.count, batch_id);

    Ok(Summary {
        summary: SummaryStats {
            total_equipment: agg.count,
            avg_flowrate: agg.avg_flowrate,
            avg_pressure: agg.avg_pressure,
            avg_temperature: agg.avg_temperature,
        },
        type_distribution: agg.distribution,
    })
}

/// Records matching the optional batch and type, in ascending id order.
pub async fn filter(
    repo: &dyn Repository,
    batch_id: Option<i64>,
    equipment_type: Option<String>,
) -> Result<Vec<EquipmentRecord>, AppError> {
    // ---
    let records = repo
        .list_records(&RecordFilter {
            batch_id,
            equipment_type,
        })
        .await?;
    Ok(records)
}

/// All records of one existing batch.
pub async fn records_for_batch(
    repo: &dyn Repository,
    batch_id: i64,
) -> Result<Vec<EquipmentRecord>, AppError> {
    // ---
    repo.get_batch(batch_id).await?;
    filter(repo, Some(batch_id), None).await
}

/// The most recent uploads, newest first, with their snapshot statistics.
pub async fn history(repo: &dyn Repository, limit: usize) -> Result<Vec<HistoryEntry>, AppError> {
    // ---
    let batches = repo.list_batches(limit, true).await?;
    Ok(batches.into_iter().map(HistoryEntry::from).collect())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::ingest::ingest_csv;
    use crate::storage::MemoryRepository;

    const HEADER: &str = "Equipment Name,Type,Flowrate,Pressure,Temperature\n";

    async fn upload(repo: &MemoryRepository, rows: &[(&str, &str, f64, f64, f64)]) -> UploadBatch {
        // ---
        let mut csv = HEADER.to_string();
        for (name, t, f, p, temp) in rows {
            csv.push_str(&format!("{name},{t},{f},{p},{temp}\n"));
        }
        ingest_csv(repo, Some(csv.as_bytes())).await.unwrap()
    }

    #[tokio::test]
    async fn test_summary_three_row_scenario() {
        // ---
        let repo = MemoryRepository::new();
        let batch = upload(
            &repo,
            &[
                ("P1", "A", 10.0, 1.0, 1.0),
                ("P2", "A", 20.0, 1.0, 1.0),
                ("V1", "B", 30.0, 1.0, 1.0),
            ],
        )
        .await;

        let s = summary(&repo, Some(batch.id)).await.unwrap();
        assert_eq!(s.summary.total_equipment, 3);
        assert!((s.summary.avg_flowrate - 20.0).abs() < 1e-6);

        let counts: BTreeMap<_, _> = s
            .type_distribution
            .iter()
            .map(|tc| (tc.equipment_type.as_str(), tc.count))
            .collect();
        assert_eq!(counts, BTreeMap::from([("A", 2), ("B", 1)]));
    }

    #[tokio::test]
    async fn test_live_summary_matches_snapshot() {
        // ---
        let repo = MemoryRepository::new();
        let batch = upload(
            &repo,
            &[
                ("R1", "Reactor", 0.1, 7.3, 301.15),
                ("R2", "Reactor", 0.2, 7.7, 299.85),
                ("C1", "Condenser", 0.3, 1.1, 280.4),
                ("M1", "Mixer", 12.9, 2.05, 295.0),
            ],
        )
        .await;

        let s = summary(&repo, Some(batch.id)).await.unwrap();
        assert_eq!(s.summary.total_equipment, batch.total_equipment);
        assert_eq!(s.summary.avg_flowrate, batch.avg_flowrate);
        assert_eq!(s.summary.avg_pressure, batch.avg_pressure);
        assert_eq!(s.summary.avg_temperature, batch.avg_temperature);

        let live: BTreeMap<String, i64> = s
            .type_distribution
            .into_iter()
            .map(|tc| (tc.equipment_type, tc.count))
            .collect();
        assert_eq!(live, batch.type_distribution);
    }

    #[tokio::test]
    async fn test_summary_is_idempotent() {
        // ---
        let repo = MemoryRepository::new();
        let batch = upload(&repo, &[("A", "X", 1.0, 2.0, 3.0), ("B", "Y", 4.0, 5.0, 6.0)]).await;

        let first = summary(&repo, Some(batch.id)).await.unwrap();
        let second = summary(&repo, Some(batch.id)).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_summary_without_batch_covers_everything() {
        // ---
        let repo = MemoryRepository::new();
        upload(&repo, &[("A", "X", 10.0, 0.0, 0.0)]).await;
        upload(&repo, &[("B", "X", 30.0, 0.0, 0.0), ("C", "Z", 50.0, 0.0, 0.0)]).await;

        let s = summary(&repo, None).await.unwrap();
        assert_eq!(s.summary.total_equipment, 3);
        assert!((s.summary.avg_flowrate - 30.0).abs() < 1e-6);
        assert_eq!(s.type_distribution[0].equipment_type, "X");
        assert_eq!(s.type_distribution[0].count, 2);
    }

    #[tokio::test]
    async fn test_summary_empty_and_unknown() {
        // ---
        let repo = MemoryRepository::new();

        let s = summary(&repo, None).await.unwrap();
        assert_eq!(s.summary.total_equipment, 0);
        assert_eq!(s.summary.avg_pressure, 0.0);
        assert!(s.type_distribution.is_empty());

        assert!(matches!(
            summary(&repo, Some(99)).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_filter_subset_properties() {
        // ---
        let repo = MemoryRepository::new();
        let a = upload(
            &repo,
            &[
                ("P1", "Pump", 1.0, 1.0, 1.0),
                ("V1", "Valve", 2.0, 2.0, 2.0),
                ("P2", "Pump", 3.0, 3.0, 3.0),
            ],
        )
        .await;
        let b = upload(&repo, &[("P3", "Pump", 4.0, 4.0, 4.0)]).await;

        let whole = filter(&repo, Some(a.id), None).await.unwrap();
        let pumps = filter(&repo, Some(a.id), Some("Pump".to_string())).await.unwrap();

        assert_eq!(whole, records_for_batch(&repo, a.id).await.unwrap());
        assert_eq!(whole.len(), 3);
        assert_eq!(pumps.len(), 2);
        assert!(pumps.iter().all(|r| whole.contains(r)));
        assert!(whole.iter().all(|r| r.batch_id != b.id));

        let names: Vec<_> = pumps.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["P1", "P2"]);

        assert!(filter(&repo, Some(b.id + 10), None).await.unwrap().is_empty());
        assert!(filter(&repo, None, Some("Mixer".to_string()))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_records_for_unknown_batch() {
        // ---
        let repo = MemoryRepository::new();
        assert!(matches!(
            records_for_batch(&repo, 1).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_history_limit_and_order() {
        // ---
        let repo = MemoryRepository::new();
        let mut last = 0;
        for i in 0..8 {
            last = upload(&repo, &[("E", "T", i as f64, 0.0, 0.0)]).await.id;
        }

        let entries = history(&repo, HISTORY_LIMIT).await.unwrap();
        assert_eq!(entries.len(), HISTORY_LIMIT);
        assert_eq!(entries[0].id, last);
        assert!(entries.windows(2).all(|w| w[0].id > w[1].id));
        assert!(entries.windows(2).all(|w| w[0].uploaded_at >= w[1].uploaded_at));

        // "YYYY-MM-DD HH:MM"
        assert_eq!(entries[0].uploaded_at.len(), 16);
        assert_eq!(entries[0].type_distribution["T"], 1);
    }
}
