//! Time axis built from observed time labels
//!
//! The axis holds only labels that actually occur in the rows, so it can have
//! gaps. Offsets are always found by searching the axis; subtracting the first
//! label would silently misalign data after a missing year.

use serde::{Deserialize, Serialize};

/// Sorted, deduplicated integer time labels shared by all variables of a dataset
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeAxis {
    #[serde(rename = "value")]
    values: Vec<i64>,
    name: String,
}

impl TimeAxis {
    /// Build from raw labels, skipping anything that does not parse as an integer
    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut values: Vec<i64> = labels.into_iter().filter_map(parse_label).collect();
        values.sort_unstable();
        values.dedup();
        Self::from_sorted(values)
    }

    fn from_sorted(values: Vec<i64>) -> Self {
        TimeAxis {
            values,
            name: "time".to_string(),
        }
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Index of a label in the axis, `None` when the label was never observed
    pub fn offset(&self, label: i64) -> Option<usize> {
        self.values.binary_search(&label).ok()
    }

    /// Offset of a raw label string
    pub fn offset_of_raw(&self, raw: &str) -> Option<usize> {
        parse_label(raw).and_then(|t| self.offset(t))
    }

    /// Label at an offset
    pub fn label(&self, offset: usize) -> Option<i64> {
        self.values.get(offset).copied()
    }

    /// True when consecutive labels differ by exactly one
    pub fn is_contiguous(&self) -> bool {
        self.values
            .windows(2)
            .all(|w| w[1].checked_sub(w[0]) == Some(1))
    }

    /// Inclusive ranges of labels inside the axis span that were never observed
    pub fn gap_ranges(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.values
            .windows(2)
            .filter(|w| w[1].checked_sub(w[0]) != Some(1))
            .map(|w| (w[0] + 1, w[1] - 1))
    }

    /// Number of unobserved labels inside the axis span
    pub fn gap_count(&self) -> u128 {
        self.values
            .windows(2)
            .map(|w| (i128::from(w[1]) - i128::from(w[0]) - 1) as u128)
            .sum()
    }
}

/// Parse a time label: integer text, optionally quoted
pub fn parse_label(raw: &str) -> Option<i64> {
    raw.trim().trim_matches('"').parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_unique() {
        let axis = TimeAxis::from_labels(["2012", "2010", "2011", "2010", "\"2012\""]);
        assert_eq!(axis.values(), &[2010, 2011, 2012]);
        assert!(axis.is_contiguous());
    }

    #[test]
    fn test_unparseable_labels_skipped() {
        let axis = TimeAxis::from_labels(["2015", "n/a", "", "2016.5", "2016"]);
        assert_eq!(axis.values(), &[2015, 2016]);
    }

    #[test]
    fn test_offset_searches_axis_with_gap() {
        let axis = TimeAxis::from_labels(["2009", "2010", "2013"]);
        assert!(!axis.is_contiguous());
        assert_eq!(axis.gap_ranges().collect::<Vec<_>>(), vec![(2011, 2012)]);
        assert_eq!(axis.gap_count(), 2);
        assert_eq!(axis.offset(2009), Some(0));
        assert_eq!(axis.offset(2010), Some(1));
        // Subtracting 2009 would give 4 here
        assert_eq!(axis.offset(2013), Some(2));
        assert_eq!(axis.offset(2011), None);
        assert_eq!(axis.label(2), Some(2013));
        assert_eq!(axis.label(3), None);
    }

    #[test]
    fn test_far_apart_labels() {
        // One year of epoch seconds
        let axis = TimeAxis::from_labels(["1577836800", "1609459200"]);
        assert!(!axis.is_contiguous());
        assert_eq!(axis.gap_count(), 31_622_399);
        assert_eq!(
            axis.gap_ranges().collect::<Vec<_>>(),
            vec![(1577836801, 1609459199)]
        );
    }

    #[test]
    fn test_extreme_labels() {
        let min = i64::MIN.to_string();
        let max = i64::MAX.to_string();
        let axis = TimeAxis::from_labels([min.as_str(), max.as_str()]);
        assert_eq!(axis.values(), &[i64::MIN, i64::MAX]);
        assert!(!axis.is_contiguous());
        assert_eq!(axis.gap_count(), u64::MAX as u128 - 1);
        assert_eq!(
            axis.gap_ranges().next(),
            Some((i64::MIN + 1, i64::MAX - 1))
        );

        let adjacent = TimeAxis::from_labels(["9223372036854775806", max.as_str()]);
        assert!(adjacent.is_contiguous());
        assert_eq!(adjacent.gap_count(), 0);
    }

    #[test]
    fn test_wire_format() {
        let axis = TimeAxis::from_labels(["2020", "2021"]);
        let json = serde_json::to_string(&axis).unwrap();
        assert_eq!(json, r#"{"value":[2020,2021],"name":"time"}"#);
    }
}
