//! Observation values and their storage forms
//!
//! A `Cell` is one observation after missing-marker normalization. A
//! `StoredValue` is what a region record keeps under a compact id: a single
//! cell when the variable envelope spans one offset, otherwise a dense series
//! aligned to the envelope.

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire token for "no observation at this position"
pub const MISSING_SENTINEL: &str = "NA";

/// Raw tokens that normalize to the missing sentinel
const MISSING_MARKERS: [&str; 4] = ["", "NA", "na", "null"];

/// One observation: numeric, categorical text, or missing
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl Cell {
    /// Normalize a raw field into a cell
    ///
    /// Missing markers become `Missing`, finite numbers become `Number`, and
    /// anything else is kept verbatim as `Text`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if MISSING_MARKERS.contains(&raw) {
            return Cell::Missing;
        }
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Cell::Number(v),
            _ => Cell::Text(raw.to_string()),
        }
    }

    pub fn is_present(&self) -> bool {
        !matches!(self, Cell::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Render for delimited export (missing → empty field)
    pub fn to_field(&self) -> String {
        match self {
            Cell::Number(v) => v.to_string(),
            Cell::Text(s) => s.clone(),
            Cell::Missing => String::new(),
        }
    }
}

impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Whole numbers go out as integers to keep the payload small
            Cell::Number(v) if v.fract() == 0.0 && v.abs() < 9.0e15 => {
                serializer.serialize_i64(*v as i64)
            }
            Cell::Number(v) => serializer.serialize_f64(*v),
            Cell::Text(s) => serializer.serialize_str(s),
            Cell::Missing => serializer.serialize_str(MISSING_SENTINEL),
        }
    }
}

impl<'de> Deserialize<'de> for Cell {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CellVisitor;

        impl<'de> Visitor<'de> for CellVisitor {
            type Value = Cell;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a number, a string, or null")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Cell, E> {
                Ok(Cell::Number(v as f64))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Cell, E> {
                Ok(Cell::Number(v as f64))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Cell, E> {
                Ok(Cell::Number(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Cell, E> {
                if v == MISSING_SENTINEL {
                    Ok(Cell::Missing)
                } else {
                    Ok(Cell::Text(v.to_string()))
                }
            }

            fn visit_unit<E: de::Error>(self) -> Result<Cell, E> {
                Ok(Cell::Missing)
            }
        }

        deserializer.deserialize_any(CellVisitor)
    }
}

/// Storage form of one variable inside a region record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredValue {
    /// Dense series aligned to the variable envelope
    Series(Vec<Cell>),
    /// Single observation (envelope width 1)
    Scalar(Cell),
}

impl StoredValue {
    /// Number of time positions this value covers
    pub fn len(&self) -> usize {
        match self {
            StoredValue::Series(cells) => cells.len(),
            StoredValue::Scalar(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cell at a position relative to the envelope start
    pub fn get(&self, index: usize) -> Option<&Cell> {
        match self {
            StoredValue::Series(cells) => cells.get(index),
            StoredValue::Scalar(cell) if index == 0 => Some(cell),
            StoredValue::Scalar(_) => None,
        }
    }

    /// Cells in envelope order (a scalar yields one cell)
    pub fn cells(&self) -> std::slice::Iter<'_, Cell> {
        match self {
            StoredValue::Series(cells) => cells.iter(),
            StoredValue::Scalar(cell) => std::slice::from_ref(cell).iter(),
        }
    }

    /// Final position of the series, or the scalar itself
    pub fn last(&self) -> Option<&Cell> {
        self.cells().last()
    }
}
