//! Read-only queries over a compacted lookup
//!
//! Every function here degrades to `None` or an empty result instead of
//! failing: unknown variables, empty envelopes, offsets outside the envelope
//! and non-numeric cells all read as "no value".

use super::codes::CompactId;
use super::dataset::{DatasetLookup, RegionRecord};
use super::value::{Cell, StoredValue};
use serde::Serialize;
use std::collections::BTreeMap;

/// Optional region filter (region id → keep?)
pub type RegionFilter<'a> = Option<&'a dyn Fn(&str) -> bool>;

/// Cross-region summary of one variable at one time offset
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableSummary {
    pub n: usize,
    pub missing: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower_fence: f64,
    pub upper_fence: f64,
}

/// Numeric value of a region's variable at an axis offset
///
/// `range_start` is the variable's envelope start. A scalar is treated as a
/// one-element series at `range_start`.
pub fn value_at_time(
    record: &RegionRecord,
    code: CompactId,
    offset: usize,
    range_start: usize,
) -> Option<f64> {
    let stored = record.get(&code)?;
    let index = offset.checked_sub(range_start)?;
    stored.get(index).and_then(Cell::as_number)
}

/// Every per-time value of a region's variable, in envelope order
pub fn all_values<'a>(
    record: &'a RegionRecord,
    code: CompactId,
) -> impl Iterator<Item = Option<f64>> + 'a {
    record
        .get(&code)
        .into_iter()
        .flat_map(StoredValue::cells)
        .map(Cell::as_number)
}

/// Time label paired with value over the variable envelope, for one region
pub fn series(dataset: &DatasetLookup, region: &str, variable: &str) -> Vec<(i64, Option<f64>)> {
    let Some(descriptor) = dataset.variable(variable) else {
        return Vec::new();
    };
    let (Some(envelope), Some(record)) = (descriptor.envelope, dataset.region(region)) else {
        return Vec::new();
    };
    if !record.contains_key(&descriptor.code) {
        return Vec::new();
    }
    (envelope.start..=envelope.end)
        .filter_map(|offset| {
            let label = dataset.time().label(offset)?;
            Some((
                label,
                value_at_time(record, descriptor.code, offset, envelope.start),
            ))
        })
        .collect()
}

/// Value for a region and variable at a time label (searched on the axis)
pub fn value_at_label(
    dataset: &DatasetLookup,
    region: &str,
    variable: &str,
    time_label: i64,
) -> Option<f64> {
    let descriptor = dataset.variable(variable)?;
    let envelope = descriptor.envelope?;
    let offset = dataset.time().offset(time_label)?;
    value_at_time(dataset.region(region)?, descriptor.code, offset, envelope.start)
}

/// Region → value for every region with a numeric value at the offset
pub fn region_values(
    dataset: &DatasetLookup,
    variable: &str,
    offset: usize,
    filter: RegionFilter<'_>,
) -> BTreeMap<String, f64> {
    let Some(descriptor) = dataset.variable(variable) else {
        return BTreeMap::new();
    };
    let Some(envelope) = descriptor.envelope else {
        return BTreeMap::new();
    };
    dataset
        .regions
        .iter()
        .filter(|(id, _)| filter.map_or(true, |f| f(id.as_str())))
        .filter_map(|(id, record)| {
            value_at_time(record, descriptor.code, offset, envelope.start)
                .map(|v| (id.clone(), v))
        })
        .collect()
}

/// Ascending values at the offset (input to rank coloring)
pub fn sorted_values(
    dataset: &DatasetLookup,
    variable: &str,
    offset: usize,
    filter: RegionFilter<'_>,
) -> Vec<f64> {
    let mut values: Vec<f64> = region_values(dataset, variable, offset, filter)
        .into_values()
        .collect();
    values.sort_by(f64::total_cmp);
    values
}

/// Summary of a variable at an offset across (optionally filtered) regions
///
/// Returns `None` for an unknown variable, an empty envelope, an offset outside
/// the envelope, or when no region has a value.
pub fn summary(
    dataset: &DatasetLookup,
    variable: &str,
    offset: usize,
    filter: RegionFilter<'_>,
) -> Option<VariableSummary> {
    let descriptor = dataset.variable(variable)?;
    let envelope = descriptor.envelope?;
    if !envelope.contains(offset) {
        return None;
    }

    let mut values = Vec::new();
    let mut missing = 0;
    for (id, record) in &dataset.regions {
        if let Some(f) = filter {
            if !f(id) {
                continue;
            }
        }
        match value_at_time(record, descriptor.code, offset, envelope.start) {
            Some(v) => values.push(v),
            None => missing += 1,
        }
    }

    summarize(&mut values, missing)
}

/// Summary statistics over raw values (sorted in place)
pub fn summarize(values: &mut [f64], missing: usize) -> Option<VariableSummary> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);

    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let median = if n % 2 == 0 {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    } else {
        values[n / 2]
    };
    let q1 = quantile(values, 0.25);
    let q3 = quantile(values, 0.75);
    let iqr = q3 - q1;
    let min = values[0];
    let max = values[n - 1];

    Some(VariableSummary {
        n,
        missing,
        min,
        max,
        mean,
        median,
        q1,
        q3,
        iqr,
        lower_fence: min.max(q1 - 1.5 * iqr),
        upper_fence: max.min(q3 + 1.5 * iqr),
    })
}

/// Linear-interpolation quantile of ascending values
fn quantile(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let idx = (n - 1) as f64 * p;
            let lo = idx.floor() as usize;
            let hi = idx.ceil() as usize;
            if lo == hi {
                sorted[lo]
            } else {
                let frac = idx - lo as f64;
                sorted[lo] * (1.0 - frac) + sorted[hi] * frac
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::codes::CodeRegistry;
    use crate::lookup::compactor::build_lookup;
    use crate::lookup::rows::{RawRow, RowSet};

    fn rows(items: &[(&str, &str, &str)]) -> RowSet {
        RowSet::new(
            vec!["x".to_string()],
            items
                .iter()
                .map(|(id, time, v)| RawRow {
                    id: id.to_string(),
                    time: time.to_string(),
                    values: vec![v.to_string()],
                })
                .collect(),
        )
    }

    fn eight_regions() -> DatasetLookup {
        let ids = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let values = ["1", "2", "3", "4", "5", "6", "7", "8"];
        let mut items: Vec<(&str, &str, &str)> = ids
            .iter()
            .zip(values.iter())
            .map(|(id, v)| (*id, "2020", *v))
            .collect();
        items.push(("a", "2021", "10"));
        items.push(("z", "2021", "NA"));
        build_lookup(&rows(&items), &mut CodeRegistry::new())
    }

    #[test]
    fn test_summary_one_to_eight() {
        let lookup = eight_regions();
        let s = summary(&lookup, "x", 0, None).unwrap();
        assert_eq!(s.n, 8);
        assert_eq!(s.missing, 1); // region z
        assert_eq!(s.min, 1.0);
        assert_eq!(s.max, 8.0);
        assert_eq!(s.mean, 4.5);
        assert_eq!(s.median, 4.5);
        assert!((s.q1 - 2.75).abs() < 1e-12);
        assert!((s.q3 - 6.25).abs() < 1e-12);
        assert!((s.iqr - 3.5).abs() < 1e-12);
        assert_eq!(s.lower_fence, 1.0);
        assert_eq!(s.upper_fence, 8.0);
    }

    #[test]
    fn test_summary_single_value() {
        let s = summarize(&mut [3.25], 0).unwrap();
        assert_eq!(s.min, 3.25);
        assert_eq!(s.max, 3.25);
        assert_eq!(s.mean, 3.25);
        assert_eq!(s.median, 3.25);
        assert_eq!(s.q1, 3.25);
        assert_eq!(s.q3, 3.25);
    }

    #[test]
    fn test_summary_absent_cases() {
        let lookup = eight_regions();
        assert!(summary(&lookup, "unknown", 0, None).is_none());
        assert!(summary(&lookup, "x", 5, None).is_none());
        let nobody = |_: &str| false;
        assert!(summary(&lookup, "x", 0, Some(&nobody)).is_none());
    }

    #[test]
    fn test_summary_filtered() {
        let lookup = eight_regions();
        let early = |id: &str| id < "c" || id == "z";
        let s = summary(&lookup, "x", 1, Some(&early)).unwrap();
        // offset 1 (2021): only a has a value; b and z lack one
        assert_eq!(s.n, 1);
        assert_eq!(s.missing, 2);
        assert_eq!(s.median, 10.0);
    }

    #[test]
    fn test_region_values_and_sorted() {
        let lookup = eight_regions();
        let at_2021 = region_values(&lookup, "x", 1, None);
        assert_eq!(at_2021.len(), 1);
        assert_eq!(at_2021.get("a"), Some(&10.0));
        assert!(!at_2021.contains_key("z"));

        let sorted = sorted_values(&lookup, "x", 0, None);
        assert_eq!(sorted, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_scalar_and_series_agree() {
        let code = CompactId::new(2);
        let mut scalar = RegionRecord::new();
        scalar.insert(code, StoredValue::Scalar(Cell::Number(4.0)));
        let mut series = RegionRecord::new();
        series.insert(code, StoredValue::Series(vec![Cell::Number(4.0)]));

        for offset in 0..4 {
            assert_eq!(
                value_at_time(&scalar, code, offset, 2),
                value_at_time(&series, code, offset, 2)
            );
        }
        assert_eq!(value_at_time(&scalar, code, 2, 2), Some(4.0));
        assert_eq!(value_at_time(&scalar, code, 3, 2), None);
    }

    #[test]
    fn test_non_numeric_reads_as_none() {
        let code = CompactId::new(3);
        let mut record = RegionRecord::new();
        record.insert(
            code,
            StoredValue::Series(vec![
                Cell::Text("rural".to_string()),
                Cell::Missing,
                Cell::Number(1.0),
            ]),
        );
        assert_eq!(value_at_time(&record, code, 0, 0), None);
        assert_eq!(value_at_time(&record, code, 1, 0), None);
        assert_eq!(value_at_time(&record, code, 2, 0), Some(1.0));
        assert_eq!(
            all_values(&record, code).collect::<Vec<_>>(),
            vec![None, None, Some(1.0)]
        );
        assert_eq!(all_values(&record, CompactId::new(9)).count(), 0);
    }

    #[test]
    fn test_series_and_label_lookup() {
        let lookup = build_lookup(
            &rows(&[("a", "2009", "1"), ("a", "2013", "3"), ("b", "2011", "2")]),
            &mut CodeRegistry::new(),
        );
        assert_eq!(
            series(&lookup, "a", "x"),
            vec![(2009, Some(1.0)), (2011, None), (2013, Some(3.0))]
        );
        assert!(series(&lookup, "missing", "x").is_empty());
        assert_eq!(value_at_label(&lookup, "a", "x", 2013), Some(3.0));
        assert_eq!(value_at_label(&lookup, "a", "x", 2012), None);
    }
}
