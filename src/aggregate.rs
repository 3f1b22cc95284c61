//! Aggregate statistics over equipment readings.
//!
//! [`aggregate`] is the only place statistics are computed. Ingestion uses it
//! to build a batch snapshot and the query/report paths use it to recompute
//! live values, so an untouched batch always reproduces its own snapshot.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::models::{EquipmentRecord, NewEquipment};

// ---

/// Anything that carries the fields needed for aggregation.
pub trait Reading {
    fn equipment_type(&self) -> &str;
    fn flowrate(&self) -> f64;
    fn pressure(&self) -> f64;
    fn temperature(&self) -> f64;
}

impl Reading for NewEquipment {
    fn equipment_type(&self) -> &str {
        &self.equipment_type
    }
    fn flowrate(&self) -> f64 {
        self.flowrate
    }
    fn pressure(&self) -> f64 {
        self.pressure
    }
    fn temperature(&self) -> f64 {
        self.temperature
    }
}

impl Reading for EquipmentRecord {
    fn equipment_type(&self) -> &str {
        &self.equipment_type
    }
    fn flowrate(&self) -> f64 {
        self.flowrate
    }
    fn pressure(&self) -> f64 {
        self.pressure
    }
    fn temperature(&self) -> f64 {
        self.temperature
    }
}

/// Count of readings for one equipment type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeCount {
    pub equipment_type: String,
    pub count: i64,
}

/// Result of [`aggregate`].
///
/// `distribution` is ordered by the first appearance of each type in the input.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aggregates {
    pub count: i64,
    pub avg_flowrate: f64,
    pub avg_pressure: f64,
    pub avg_temperature: f64,
    pub distribution: Vec<TypeCount>,
}

impl Aggregates {
    /// Distribution as a type → count map, the shape stored on a batch.
    pub fn distribution_map(&self) -> BTreeMap<String, i64> {
        // ---
        self.distribution
            .iter()
            .map(|tc| (tc.equipment_type.clone(), tc.count))
            .collect()
    }
}

/// Compute count, means and type distribution in a single pass.
///
/// Means over zero readings are `0.0`.
pub fn aggregate<'a, R, I>(readings: I) -> Aggregates
where
    R: Reading + 'a,
    I: IntoIterator<Item = &'a R>,
{
    // ---
    let mut count: i64 = 0;
    let mut sum_flowrate = 0.0;
    let mut sum_pressure = 0.0;
    let mut sum_temperature = 0.0;

    let mut distribution: Vec<TypeCount> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();

    for r in readings {
        count += 1;
        sum_flowrate += r.flowrate();
        sum_pressure += r.pressure();
        sum_temperature += r.temperature();

        match slots.get(r.equipment_type()) {
            Some(&slot) => distribution[slot].count += 1,
            None => {
                slots.insert(r.equipment_type(), distribution.len());
                distribution.push(TypeCount {
                    equipment_type: r.equipment_type().to_string(),
                    count: 1,
                });
            }
        }
    }

    let mean = |sum: f64| if count == 0 { 0.0 } else { sum / count as f64 };

    Aggregates {
        count,
        avg_flowrate: mean(sum_flowrate),
        avg_pressure: mean(sum_pressure),
        avg_temperature: mean(sum_temperature),
        distribution,
    }
}
