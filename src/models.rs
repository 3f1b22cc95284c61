//! Data models for equipment uploads.
//!
//! An [`UploadBatch`] is one CSV submission together with the aggregate
//! statistics computed when it was ingested. Its [`EquipmentRecord`]s are the
//! individual rows. Both are created together and never updated afterwards.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---

/// One CSV submission and its ingestion-time snapshot statistics.
///
/// The averages and `type_distribution` are computed once at ingestion and
/// are not kept in sync with later changes to the batch's records. Live
/// statistics come from [`crate::aggregate::aggregate`] instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadBatch {
    // ---
    pub id: i64,
    pub uploaded_at: DateTime<Utc>,
    pub total_equipment: i64,
    pub avg_flowrate: f64,
    pub avg_pressure: f64,
    pub avg_temperature: f64,
    pub type_distribution: BTreeMap<String, i64>,
}

/// One persisted equipment reading, owned by exactly one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct EquipmentRecord {
    // ---
    pub id: i64,
    #[serde(rename = "upload_id")]
    pub batch_id: i64,
    #[serde(rename = "equipment_name")]
    pub name: String,
    pub equipment_type: String,
    pub flowrate: f64,
    pub pressure: f64,
    pub temperature: f64,
}

/// A validated CSV row that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEquipment {
    // ---
    pub name: String,
    pub equipment_type: String,
    pub flowrate: f64,
    pub pressure: f64,
    pub temperature: f64,
}

impl NewEquipment {
    // ---
    pub fn into_record(self, id: i64, batch_id: i64) -> EquipmentRecord {
        // ---
        EquipmentRecord {
            id,
            batch_id,
            name: self.name,
            equipment_type: self.equipment_type,
            flowrate: self.flowrate,
            pressure: self.pressure,
            temperature: self.temperature,
        }
    }
}

/// Record selection used by `Repository::list_records`.
///
/// `None` fields do not constrain the result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub batch_id: Option<i64>,
    pub equipment_type: Option<String>,
}

impl RecordFilter {
    // ---
    pub fn batch(batch_id: i64) -> Self {
        Self {
            batch_id: Some(batch_id),
            equipment_type: None,
        }
    }

    pub fn matches(&self, record: &EquipmentRecord) -> bool {
        // ---
        self.batch_id.map_or(true, |id| record.batch_id == id)
            && self
                .equipment_type
                .as_ref()
                .map_or(true, |t| &record.equipment_type == t)
    }
}
