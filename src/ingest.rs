//! CSV ingestion: parse, validate, aggregate and commit one upload.
//!
//! Every upload walks the [`IngestPhase`] state machine:
//!
//! ```text
//! RECEIVED -> VALIDATING -> VALID   -> PERSISTING -> COMMITTED
//!                        \-> INVALID -> REJECTED     \-> REJECTED
//! ```
//!
//! All validation happens before anything is written. The batch and its rows
//! are then handed to [`Repository::create_batch_with_records`] in one call,
//! which is atomic, so a rejected or failed upload leaves no trace.

use std::fmt;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{debug, error, info, warn};

use crate::aggregate::aggregate;
use crate::error::AppError;
use crate::models::{NewEquipment, UploadBatch};
use crate::storage::Repository;

/// Required header names, in canonical spelling.
pub const COL_NAME: &str = "Equipment Name";
pub const COL_TYPE: &str = "Type";
pub const COL_FLOWRATE: &str = "Flowrate";
pub const COL_PRESSURE: &str = "Pressure";
pub const COL_TEMPERATURE: &str = "Temperature";

const REQUIRED_COLUMNS: [&str; 5] = [
    COL_NAME,
    COL_TYPE,
    COL_FLOWRATE,
    COL_PRESSURE,
    COL_TEMPERATURE,
];

// ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestPhase {
    Received,
    Validating,
    Valid,
    Invalid,
    Persisting,
    Committed,
    Rejected,
}

impl IngestPhase {
    // ---
    pub fn can_advance_to(self, next: IngestPhase) -> bool {
        // ---
        use IngestPhase::*;
        matches!(
            (self, next),
            (Received, Validating)
                | (Validating, Valid)
                | (Validating, Invalid)
                | (Valid, Persisting)
                | (Invalid, Rejected)
                | (Persisting, Committed)
                | (Persisting, Rejected)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, IngestPhase::Committed | IngestPhase::Rejected)
    }
}

impl fmt::Display for IngestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestPhase::Received => "RECEIVED",
            IngestPhase::Validating => "VALIDATING",
            IngestPhase::Valid => "VALID",
            IngestPhase::Invalid => "INVALID",
            IngestPhase::Persisting => "PERSISTING",
            IngestPhase::Committed => "COMMITTED",
            IngestPhase::Rejected => "REJECTED",
        };
        f.write_str(name)
    }
}

/// Tracks the phase of a single upload call.
struct Ingestion {
    phase: IngestPhase,
}

impl Ingestion {
    fn new() -> Self {
        debug!("Ingestion phase: {}", IngestPhase::Received);
        Self {
            phase: IngestPhase::Received,
        }
    }

    fn advance(&mut self, next: IngestPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal ingestion transition {} -> {}",
            self.phase,
            next
        );
        debug!("Ingestion phase: {} -> {}", self.phase, next);
        self.phase = next;
        if next.is_terminal() {
            debug!("Ingestion finished: {}", next);
        }
    }

    fn reject(&mut self, err: &AppError) {
        if self.phase == IngestPhase::Validating {
            self.advance(IngestPhase::Invalid);
        }
        self.advance(IngestPhase::Rejected);
        warn!("Upload rejected: {}", err);
    }
}

/// Ingest one uploaded CSV file and return the committed batch.
///
/// `file` is `None` when the request carried no file part.
pub async fn ingest_csv(
    repo: &dyn Repository,
    file: Option<&[u8]>,
) -> Result<UploadBatch, AppError> {
    // ---
    let mut run = Ingestion::new();
    run.advance(IngestPhase::Validating);

    let parsed = file
        .ok_or_else(|| AppError::Validation("missing file".to_string()))
        .and_then(parse_csv);

    let rows = match parsed {
        Ok(rows) => rows,
        Err(err) => {
            run.reject(&err);
            return Err(err);
        }
    };
    run.advance(IngestPhase::Valid);

    let aggregates = aggregate(&rows);
    debug!(
        "Parsed {} rows across {} equipment types",
        aggregates.count,
        aggregates.distribution.len()
    );

    run.advance(IngestPhase::Persisting);
    match repo.create_batch_with_records(&aggregates, &rows).await {
        Ok(batch) => {
            run.advance(IngestPhase::Committed);
            info!(
                "Upload {} committed with {} records",
                batch.id, batch.total_equipment
            );
            Ok(batch)
        }
        Err(e) => {
            error!("Failed to persist upload: {}", e);
            let err = AppError::from(e);
            run.reject(&err);
            Err(err)
        }
    }
}

/// Parse and validate CSV bytes into typed rows.
///
/// Header names are matched ignoring case, surrounding whitespace and
/// repeated inner whitespace. Column order and extra columns do not matter.
pub fn parse_csv(data: &[u8]) -> Result<Vec<NewEquipment>, AppError> {
    // ---
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(data);

    let headers = reader
        .headers()
        .map_err(|e| AppError::Validation(format!("malformed CSV: {e}")))?
        .clone();

    let columns = locate_columns(&headers)?;
    let [name_ix, type_ix, flow_ix, pressure_ix, temp_ix] = columns;

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result.map_err(|e| AppError::Validation(format!("malformed CSV: {e}")))?;
        let line = record.position().map_or(i as u64 + 2, |p| p.line());

        let cell = |ix: usize| {
            record.get(ix).ok_or_else(|| {
                AppError::Validation(format!(
                    "malformed row at line {line}: expected at least {} fields, found {}",
                    ix + 1,
                    record.len()
                ))
            })
        };
        let number = |ix: usize, column: &str| -> Result<f64, AppError> {
            cell(ix)?
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    AppError::Validation(format!("non-numeric value: {column} at line {line}"))
                })
        };

        rows.push(NewEquipment {
            name: cell(name_ix)?.to_string(),
            equipment_type: cell(type_ix)?.to_string(),
            flowrate: number(flow_ix, COL_FLOWRATE)?,
            pressure: number(pressure_ix, COL_PRESSURE)?,
            temperature: number(temp_ix, COL_TEMPERATURE)?,
        });
    }

    Ok(rows)
}

fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Index of each required column, in `REQUIRED_COLUMNS` order.
fn locate_columns(headers: &StringRecord) -> Result<[usize; 5], AppError> {
    // ---
    let normalized: Vec<String> = headers.iter().map(normalize_header).collect();

    let mut found = [0usize; 5];
    for (slot, wanted) in REQUIRED_COLUMNS.iter().enumerate() {
        let key = normalize_header(wanted);
        found[slot] = normalized
            .iter()
            .position(|h| *h == key)
            .ok_or_else(|| AppError::Validation(format!("missing column: {wanted}")))?;
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::RecordFilter;
    use crate::storage::broken::BrokenRepository;
    use crate::storage::MemoryRepository;
    use std::sync::Arc;

    const SAMPLE: &str = "Equipment Name,Type,Flowrate,Pressure,Temperature\n\
                          Pump-1,A,10,5.0,100\n\
                          Pump-2,A,20,6.0,110\n\
                          Valve-1,B,30,7.0,120\n";

    fn validation_message(err: AppError) -> String {
        // ---
        match err {
            AppError::Validation(msg) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_sample() {
        // ---
        let rows = parse_csv(SAMPLE.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name, "Pump-1");
        assert_eq!(rows[2].equipment_type, "B");
        assert_eq!(rows[1].flowrate, 20.0);
        assert_eq!(rows[2].pressure, 7.0);
    }

    #[test]
    fn test_headers_are_case_and_whitespace_insensitive() {
        // ---
        let csv = "  temperature , PRESSURE,equipment   name ,flowrate,  type\n\
                   90, 1.5 ,Mixer-9, 4.25 ,Mixer\n";
        let rows = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(
            rows,
            vec![NewEquipment {
                name: "Mixer-9".to_string(),
                equipment_type: "Mixer".to_string(),
                flowrate: 4.25,
                pressure: 1.5,
                temperature: 90.0,
            }]
        );
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        // ---
        let csv = "Id,Equipment Name,Type,Flowrate,Pressure,Temperature,Notes\n\
                   7,HX-1,HeatExchanger,1,2,3,spare\n";
        let rows = parse_csv(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].name, "HX-1");
        assert_eq!(rows[0].temperature, 3.0);
    }

    #[test]
    fn test_missing_column() {
        // ---
        let csv = "Equipment Name,Type,Flowrate,Temperature\nP,A,1,2\n";
        let msg = validation_message(parse_csv(csv.as_bytes()).unwrap_err());
        assert_eq!(msg, "missing column: Pressure");
    }

    #[test]
    fn test_empty_file_is_missing_columns() {
        // ---
        let msg = validation_message(parse_csv(b"").unwrap_err());
        assert_eq!(msg, "missing column: Equipment Name");
    }

    #[test]
    fn test_non_numeric_value() {
        // ---
        let csv = "Equipment Name,Type,Flowrate,Pressure,Temperature\n\
                   P1,A,1,2,3\n\
                   P2,A,fast,2,3\n";
        let msg = validation_message(parse_csv(csv.as_bytes()).unwrap_err());
        assert!(msg.starts_with("non-numeric value"), "{msg}");
        assert!(msg.contains("Flowrate"));
        assert!(msg.contains("line 3"));
    }

    #[test]
    fn test_non_finite_and_blank_numbers_rejected() {
        // ---
        for bad in ["NaN", "inf", ""] {
            let csv = format!("Equipment Name,Type,Flowrate,Pressure,Temperature\nP,A,1,{bad},3\n");
            let msg = validation_message(parse_csv(csv.as_bytes()).unwrap_err());
            assert!(msg.starts_with("non-numeric value"), "{bad}: {msg}");
        }
    }

    #[test]
    fn test_short_row_is_malformed() {
        // ---
        let csv = "Equipment Name,Type,Flowrate,Pressure,Temperature\nP,A,1\n";
        let msg = validation_message(parse_csv(csv.as_bytes()).unwrap_err());
        assert!(msg.starts_with("malformed row at line 2"), "{msg}");
    }

    #[test]
    fn test_header_only_file_has_no_rows() {
        // ---
        let rows = parse_csv(b"Equipment Name,Type,Flowrate,Pressure,Temperature\n").unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_phase_transitions() {
        // ---
        use IngestPhase::*;
        assert!(Received.can_advance_to(Validating));
        assert!(Validating.can_advance_to(Invalid));
        assert!(Invalid.can_advance_to(Rejected));
        assert!(Persisting.can_advance_to(Committed));
        assert!(!Validating.can_advance_to(Persisting));
        assert!(!Committed.can_advance_to(Persisting));
        assert!(!Rejected.can_advance_to(Validating));

        assert!(Committed.is_terminal());
        assert!(Rejected.is_terminal());
        assert!(!Persisting.is_terminal());
        assert_eq!(Persisting.to_string(), "PERSISTING");
    }

    #[tokio::test]
    async fn test_ingest_commits_snapshot() {
        // ---
        let repo = MemoryRepository::new();
        let batch = ingest_csv(&repo, Some(SAMPLE.as_bytes())).await.unwrap();

        assert_eq!(batch.total_equipment, 3);
        assert!((batch.avg_flowrate - 20.0).abs() < 1e-6);
        assert!((batch.avg_pressure - 6.0).abs() < 1e-6);
        assert!((batch.avg_temperature - 110.0).abs() < 1e-6);
        assert_eq!(batch.type_distribution["A"], 2);
        assert_eq!(batch.type_distribution["B"], 1);
        assert_eq!(
            batch.type_distribution.values().sum::<i64>(),
            batch.total_equipment
        );

        let records = repo.list_records(&RecordFilter::batch(batch.id)).await.unwrap();
        assert_eq!(records.len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_upload_persists_nothing() {
        // ---
        let repo = MemoryRepository::new();

        let err = ingest_csv(&repo, None).await.unwrap_err();
        assert_eq!(validation_message(err), "missing file");

        let bad = "Equipment Name,Type,Flowrate,Pressure,Temperature\nP,A,1,2,3\nQ,B,x,2,3\n";
        assert!(ingest_csv(&repo, Some(bad.as_bytes())).await.is_err());

        assert!(repo.list_batches(10, true).await.unwrap().is_empty());
        assert!(repo
            .list_records(&RecordFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_internal_error() {
        // ---
        let err = ingest_csv(&BrokenRepository, Some(SAMPLE.as_bytes()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_uploads_do_not_mix() {
        // ---
        let repo = Arc::new(MemoryRepository::new());

        let header = "Equipment Name,Type,Flowrate,Pressure,Temperature\n".to_string();
        let csv_a: String = std::iter::once(header.clone())
            .chain((0..200).map(|i| format!("A-{i},Alpha,{i},1,1\n")))
            .collect();
        let csv_b: String = std::iter::once(header)
            .chain((0..200).map(|i| format!("B-{i},Beta,{i},2,2\n")))
            .collect();

        let (ra, rb) = (repo.clone(), repo.clone());
        let a = tokio::spawn(async move { ingest_csv(ra.as_ref(), Some(csv_a.as_bytes())).await });
        let b = tokio::spawn(async move { ingest_csv(rb.as_ref(), Some(csv_b.as_bytes())).await });

        let batch_a = a.await.unwrap().unwrap();
        let batch_b = b.await.unwrap().unwrap();
        assert_ne!(batch_a.id, batch_b.id);

        let rows_a = repo.list_records(&RecordFilter::batch(batch_a.id)).await.unwrap();
        let rows_b = repo.list_records(&RecordFilter::batch(batch_b.id)).await.unwrap();
        assert_eq!(rows_a.len(), 200);
        assert_eq!(rows_b.len(), 200);
        assert!(rows_a.iter().all(|r| r.equipment_type == "Alpha"));
        assert!(rows_b.iter().all(|r| r.equipment_type == "Beta"));
    }
}
