//! Per-variable field statistics for the dataset manifest
//!
//! Computed over every numeric observation of a variable in the whole row set,
//! not per region. The manifest's `time_range` is what consumers use to decide
//! whether a variable exists at a granularity.

use super::dataset::{time_range, Envelope};
use super::rows::{RowSet, TIME_COLUMN};
use super::time_axis::TimeAxis;
use super::value::Cell;
use serde::{Deserialize, Serialize};

/// Inferred numeric type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Integer,
    Float,
    Unknown,
}

/// Descriptive statistics of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(with = "time_range")]
    pub time_range: Option<Envelope>,
    pub missing: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sd: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl FieldInfo {
    /// True when the field has at least one numeric observation
    pub fn has_data(&self) -> bool {
        self.time_range.is_some()
    }
}

/// Build the field list: the time field first, then one entry per variable
pub fn build_field_info(rows: &RowSet, axis: &TimeAxis) -> Vec<FieldInfo> {
    let mut fields = Vec::with_capacity(rows.variables.len() + 1);
    fields.push(FieldInfo {
        name: TIME_COLUMN.to_string(),
        field_type: FieldType::Integer,
        time_range: (!axis.is_empty()).then(|| Envelope::new(0, axis.len() - 1)),
        missing: 0,
        mean: None,
        sd: None,
        min: None,
        max: None,
    });

    for (idx, name) in rows.variables.iter().enumerate() {
        let mut numbers = Vec::new();
        let mut missing = 0usize;
        let mut envelope: Option<Envelope> = None;

        for row in rows.rows.iter().filter(|r| !r.has_reserved_id()) {
            match Cell::parse(row.value(idx)) {
                Cell::Number(v) => {
                    numbers.push(v);
                    if let Some(offset) = axis.offset_of_raw(&row.time) {
                        envelope = Some(Envelope::extend(envelope, offset));
                    }
                }
                Cell::Text(_) | Cell::Missing => missing += 1,
            }
        }

        fields.push(describe(name, &numbers, missing, envelope));
    }

    fields
}

fn describe(name: &str, numbers: &[f64], missing: usize, envelope: Option<Envelope>) -> FieldInfo {
    let field_type = if numbers.is_empty() {
        FieldType::Unknown
    } else if numbers.iter().any(|v| v.fract() != 0.0) {
        FieldType::Float
    } else {
        FieldType::Integer
    };

    let (mean, sd, min, max) = if numbers.is_empty() {
        (None, None, None, None)
    } else {
        let n = numbers.len() as f64;
        let mean = numbers.iter().sum::<f64>() / n;
        let sd = if numbers.len() > 1 {
            let ss: f64 = numbers.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (n - 1.0)).sqrt()
        } else {
            0.0
        };
        let min = numbers.iter().copied().fold(f64::INFINITY, f64::min);
        let max = numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (Some(mean), Some(sd), Some(min), Some(max))
    };

    FieldInfo {
        name: name.to_string(),
        field_type,
        time_range: envelope,
        missing,
        mean,
        sd,
        min,
        max,
    }
}
