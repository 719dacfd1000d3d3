//! Sparse lookup compaction
//!
//! Turns a long-format row set into a `DatasetLookup`:
//! 1. Builds the time axis from observed labels
//! 2. Finds each variable's envelope (min/max offset with any present value, across all regions)
//! 3. Assigns compact ids through the code registry
//! 4. Stores each region's values as a scalar (envelope width 1) or a dense series
//!
//! A compact id is written into a region record only when that region has at
//! least one present value for the variable.

use super::codes::CodeRegistry;
use super::dataset::{
    DatasetLookup, DatasetMeta, Envelope, RegionRecord, VariableDescriptor, META_KEY,
};
use super::rows::{strip_quotes, RawRow, RowSet};
use super::time_axis::TimeAxis;
use super::value::{Cell, StoredValue};
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// Gap ranges included in the non-contiguous axis warning
const MAX_LOGGED_GAPS: usize = 3;

/// A row with its time label already resolved against the axis
struct PlacedRow<'a> {
    offset: usize,
    row: &'a RawRow,
}

/// Compact a row set into a lookup, allocating new ids in `registry`
pub fn build_lookup(rows: &RowSet, registry: &mut CodeRegistry) -> DatasetLookup {
    // `_meta` is the metadata key of the artifact, never a region
    let source: Vec<&RawRow> = rows.rows.iter().filter(|r| !r.has_reserved_id()).collect();
    if source.len() != rows.len() {
        tracing::warn!(
            "Skipped {} rows whose region id is the reserved key '{}'",
            rows.len() - source.len(),
            META_KEY
        );
    }

    let axis = TimeAxis::from_labels(source.iter().map(|r| r.time.as_str()));
    if !axis.is_contiguous() {
        let first: Vec<(i64, i64)> = axis.gap_ranges().take(MAX_LOGGED_GAPS).collect();
        tracing::warn!(
            "Time axis of {} labels is missing {} labels (first gaps {:?}); offsets follow observed labels only",
            axis.len(),
            axis.gap_count(),
            first
        );
    }

    // Rows whose time label is not on the axis contribute to no offset
    let placed: Vec<PlacedRow> = source
        .iter()
        .copied()
        .filter_map(|row| axis.offset_of_raw(&row.time).map(|offset| PlacedRow { offset, row }))
        .collect();

    let envelopes = variable_envelopes(&placed, rows.variables.len());
    let codes = registry.assign_all(&rows.variables);

    let mut variables = IndexMap::with_capacity(rows.variables.len());
    for (idx, name) in rows.variables.iter().enumerate() {
        variables.insert(
            name.clone(),
            VariableDescriptor {
                code: codes[idx],
                envelope: envelopes[idx],
            },
        );
    }

    let mut by_region: BTreeMap<String, Vec<&PlacedRow>> = BTreeMap::new();
    for row in &source {
        // Regions are registered even when none of their rows land on the axis
        by_region.entry(strip_quotes(&row.id).to_string()).or_default();
    }
    for placed_row in &placed {
        by_region
            .entry(strip_quotes(&placed_row.row.id).to_string())
            .or_default()
            .push(placed_row);
    }

    let mut regions = BTreeMap::new();
    for (region_id, region_rows) in by_region {
        let mut record = RegionRecord::new();
        for (idx, descriptor) in variables.values().enumerate() {
            let Some(envelope) = descriptor.envelope else {
                continue;
            };
            if let Some(stored) = region_value(&region_rows, idx, envelope) {
                record.insert(descriptor.code, stored);
            }
        }
        regions.insert(region_id, record);
    }

    tracing::debug!(
        "Compacted {} rows into {} regions over {} time points",
        rows.len(),
        regions.len(),
        axis.len()
    );

    DatasetLookup {
        meta: DatasetMeta {
            time: axis,
            variables,
        },
        regions,
    }
}

/// Envelope per variable index, `None` when the variable is never present
fn variable_envelopes(placed: &[PlacedRow], n_variables: usize) -> Vec<Option<Envelope>> {
    let mut envelopes = vec![None; n_variables];
    for placed_row in placed {
        for (idx, envelope) in envelopes.iter_mut().enumerate() {
            if Cell::parse(placed_row.row.value(idx)).is_present() {
                *envelope = Some(Envelope::extend(*envelope, placed_row.offset));
            }
        }
    }
    envelopes
}

/// Storage for one region/variable pair, `None` when the region has no present value
///
/// Duplicate (region, time) rows: a present value replaces a missing one, and
/// among present values the later row wins.
fn region_value(rows: &[&PlacedRow], idx: usize, envelope: Envelope) -> Option<StoredValue> {
    let mut cells = vec![Cell::Missing; envelope.width()];
    for placed_row in rows {
        let Some(pos) = envelope.index_of(placed_row.offset) else {
            continue;
        };
        let cell = Cell::parse(placed_row.row.value(idx));
        if cell.is_present() {
            cells[pos] = cell;
        }
    }

    if !cells.iter().any(Cell::is_present) {
        return None;
    }

    if envelope.width() == 1 {
        cells.pop().map(StoredValue::Scalar)
    } else {
        Some(StoredValue::Series(cells))
    }
}
