//! PDF report for one upload.
//!
//! Statistics in the report are recomputed from the batch's current records,
//! the same way [`crate::query::summary`] does, rather than read from the
//! ingestion snapshot.

use tracing::debug;

use crate::aggregate::{aggregate, Aggregates};
use crate::error::AppError;
use crate::models::{EquipmentRecord, RecordFilter, UploadBatch};
use crate::storage::Repository;

pub mod layout;
pub mod pdf;

use layout::{layout, page_count, Font, Line};

pub const CONTENT_TYPE: &str = "application/pdf";

const TITLE: &str = "Chemical Equipment Report";

// ---

/// A rendered report ready to be sent as an attachment.
#[derive(Debug, Clone)]
pub struct Report {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub pages: usize,
}

/// Render the report for `batch_id`.
///
/// Fails with [`AppError::NotFound`] before any rendering if the batch is unknown.
pub async fn render_report(repo: &dyn Repository, batch_id: i64) -> Result<Report, AppError> {
    // ---
    let batch = repo.get_batch(batch_id).await?;
    let records = repo.list_records(&RecordFilter::batch(batch_id)).await?;
    let live = aggregate(&records);

    let placements = layout(&document_lines(&batch, &live, &records));
    let pages = page_count(&placements);
    debug!(
        "Report for upload {}: {} records on {} pages",
        batch.id,
        records.len(),
        pages
    );

    Ok(Report {
        filename: report_filename(batch.id),
        bytes: pdf::render(&placements),
        pages,
    })
}

pub fn report_filename(batch_id: i64) -> String {
    format!("report_upload_{batch_id}.pdf")
}

/// Report content in reading order.
fn document_lines(
    batch: &UploadBatch,
    live: &Aggregates,
    records: &[EquipmentRecord],
) -> Vec<Line> {
    // ---
    let mut lines = vec![
        Line::new(TITLE, Font::Bold, 16.0, 30.0),
        Line::new(format!("Upload ID: {}", batch.id), Font::Regular, 11.0, 20.0),
        Line::new(
            format!("Uploaded At: {}", batch.uploaded_at.format("%Y-%m-%d %H:%M:%S UTC")),
            Font::Regular,
            11.0,
            30.0,
        ),
        Line::new("Summary", Font::Bold, 12.0, 20.0),
        Line::new(format!("Total Equipment: {}", live.count), Font::Regular, 11.0, 15.0),
        Line::new(
            format!("Avg Flowrate: {:.2}", live.avg_flowrate),
            Font::Regular,
            11.0,
            15.0,
        ),
        Line::new(
            format!("Avg Pressure: {:.2}", live.avg_pressure),
            Font::Regular,
            11.0,
            15.0,
        ),
        Line::new(
            format!("Avg Temperature: {:.2}", live.avg_temperature),
            Font::Regular,
            11.0,
            30.0,
        ),
        Line::new("Equipment Type Distribution", Font::Bold, 12.0, 20.0),
    ];

    for tc in &live.distribution {
        lines.push(Line::new(
            format!("{} : {}", tc.equipment_type, tc.count),
            Font::Regular,
            11.0,
            15.0,
        ));
    }
    lines.push(Line::spacer(20.0));

    lines.push(Line::new("Equipment List", Font::Bold, 12.0, 20.0));
    for r in records {
        lines.push(Line::new(
            format!(
                "{} | {} | F:{} | P:{} | T:{}",
                r.name,
                r.equipment_type,
                format_reading(r.flowrate),
                format_reading(r.pressure),
                format_reading(r.temperature)
            ),
            Font::Regular,
            10.0,
            12.0,
        ));
    }

    lines
}

/// Shortest round-trip form, keeping one decimal for whole numbers (`10.0`).
fn format_reading(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        format!("{v}")
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::ingest::ingest_csv;
    use crate::storage::MemoryRepository;

    fn csv(rows: usize) -> String {
        // ---
        let mut csv = "Equipment Name,Type,Flowrate,Pressure,Temperature\n".to_string();
        for i in 0..rows {
            csv.push_str(&format!("Pump-{i},Pump,{},2.5,{}\n", 10 + i, 80 + i));
        }
        csv
    }

    fn contains(haystack: &[u8], needle: &str) -> bool {
        haystack
            .windows(needle.len())
            .any(|w| w == needle.as_bytes())
    }

    #[tokio::test]
    async fn test_report_contents() {
        // ---
        let repo = MemoryRepository::new();
        let batch = ingest_csv(&repo, Some(csv(3).as_bytes())).await.unwrap();

        let report = render_report(&repo, batch.id).await.unwrap();
        assert_eq!(report.filename, format!("report_upload_{}.pdf", batch.id));
        assert_eq!(report.pages, 1);
        assert!(report.bytes.starts_with(b"%PDF-"));

        for needle in [
            "(Chemical Equipment Report)",
            "(Summary)",
            "(Total Equipment: 3)",
            "(Avg Flowrate: 11.00)",
            "(Avg Pressure: 2.50)",
            "(Avg Temperature: 81.00)",
            "(Equipment Type Distribution)",
            "(Pump : 3)",
            "(Equipment List)",
            "(Pump-0 | Pump | F:10.0 | P:2.5 | T:80.0)",
        ] {
            assert!(contains(&report.bytes, needle), "missing {needle}");
        }
    }

    #[tokio::test]
    async fn test_report_paginates_long_lists() {
        // ---
        let repo = MemoryRepository::new();
        let batch = ingest_csv(&repo, Some(csv(100).as_bytes())).await.unwrap();
        let report = render_report(&repo, batch.id).await.unwrap();

        // 41 list lines fit below the header on page one, 62 per page after that
        assert_eq!(report.pages, 2);
        assert!(contains(&report.bytes, "/Count 2"));
    }

    #[tokio::test]
    async fn test_report_is_reproducible() {
        // ---
        let repo = MemoryRepository::new();
        let batch = ingest_csv(&repo, Some(csv(150).as_bytes())).await.unwrap();

        let first = render_report(&repo, batch.id).await.unwrap();
        let second = render_report(&repo, batch.id).await.unwrap();
        assert_eq!(first.bytes, second.bytes);
    }

    #[tokio::test]
    async fn test_unknown_batch_is_not_found() {
        // ---
        let repo = MemoryRepository::new();
        assert!(matches!(
            render_report(&repo, 7).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_format_reading() {
        // ---
        assert_eq!(format_reading(10.0), "10.0");
        assert_eq!(format_reading(12.5), "12.5");
        assert_eq!(format_reading(-3.0), "-3.0");
        assert_eq!(format_reading(0.1), "0.1");
    }
}
