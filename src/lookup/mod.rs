//! Build-time compaction and read-time queries over panel data
//!
//! This module handles:
//! - Reading long-format rows (`rows`)
//! - Building the shared time axis (`time_axis`)
//! - Compacting rows into sparse per-region records (`compactor`, `codes`, `value`)
//! - Field statistics for the manifest (`field_stats`)
//! - Point, series and summary queries (`query`)
//! - Dashboard properties and their embedded defaults (`properties`)

pub mod codes;
pub mod compactor;
pub mod dataset;
pub mod error;
pub mod field_stats;
pub mod properties;
pub mod query;
pub mod rows;
pub mod time_axis;
pub mod value;

pub use codes::{CodeRegistry, CompactId};
pub use compactor::build_lookup;
pub use dataset::{DatasetLookup, DatasetMeta, Envelope, RegionRecord, VariableDescriptor};
pub use error::{LookupError, Result};
pub use field_stats::{build_field_info, FieldInfo, FieldType};
pub use query::{summary, value_at_time, VariableSummary};
pub use rows::{RawRow, RowSet};
pub use time_axis::TimeAxis;
pub use value::{Cell, StoredValue};
