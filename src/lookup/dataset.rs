//! Compacted dataset lookup and its JSON artifact layout
//!
//! On disk the lookup is a single JSON object: the reserved `_meta` key holds
//! the time axis and the variable descriptors, every other key is a region id
//! mapping compact ids to stored values.

use super::codes::CompactId;
use super::error::{LookupError, Result};
use super::time_axis::TimeAxis;
use super::value::StoredValue;
use indexmap::IndexMap;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Reserved top-level key for dataset metadata
pub const META_KEY: &str = "_meta";

/// Inclusive offset range in which a variable has any observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub start: usize,
    pub end: usize,
}

impl Envelope {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Envelope { start, end }
    }

    pub fn width(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset <= self.end
    }

    /// Position inside a stored series for an axis offset
    pub fn index_of(&self, offset: usize) -> Option<usize> {
        self.contains(offset).then(|| offset - self.start)
    }

    /// Grow to include an offset
    pub fn extend(envelope: Option<Envelope>, offset: usize) -> Envelope {
        match envelope {
            Some(e) => Envelope::new(e.start.min(offset), e.end.max(offset)),
            None => Envelope::new(offset, offset),
        }
    }
}

/// Serde adapter for `Option<Envelope>` as `[start, end]` / `[-1, -1]`
pub mod time_range {
    use super::Envelope;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn to_pair(envelope: &Option<Envelope>) -> [i64; 2] {
        match envelope {
            Some(e) => [e.start as i64, e.end as i64],
            None => [-1, -1],
        }
    }

    pub fn from_pair(pair: [i64; 2]) -> Option<Envelope> {
        match pair {
            [s, e] if s >= 0 && e >= s => Some(Envelope::new(s as usize, e as usize)),
            _ => None,
        }
    }

    pub fn serialize<S: Serializer>(
        envelope: &Option<Envelope>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        to_pair(envelope).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Envelope>, D::Error> {
        let pair = <[i64; 2]>::deserialize(deserializer)?;
        Ok(from_pair(pair))
    }
}

/// Per-variable storage descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub code: CompactId,
    /// `None` means no observation at any offset
    #[serde(rename = "time_range", with = "time_range")]
    pub envelope: Option<Envelope>,
}

/// Dataset-level metadata stored under `_meta`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub time: TimeAxis,
    pub variables: IndexMap<String, VariableDescriptor>,
}

/// Compact id → stored value for one region
pub type RegionRecord = IndexMap<CompactId, StoredValue>;

/// The compacted lookup for one spatial granularity
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DatasetLookup {
    pub meta: DatasetMeta,
    pub regions: BTreeMap<String, RegionRecord>,
}

impl DatasetLookup {
    pub fn variable(&self, name: &str) -> Option<&VariableDescriptor> {
        self.meta.variables.get(name)
    }

    pub fn region(&self, id: &str) -> Option<&RegionRecord> {
        self.regions.get(id)
    }

    pub fn time(&self) -> &TimeAxis {
        &self.meta.time
    }

    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.meta.variables.keys().map(|k| k.as_str())
    }

    /// Stored value for a region and variable name
    pub fn stored(&self, region: &str, variable: &str) -> Option<&StoredValue> {
        let code = self.variable(variable)?.code;
        self.region(region)?.get(&code)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| LookupError::io(path.display().to_string(), e))?;
        Self::from_json_str(&text)
    }
}

impl Serialize for DatasetLookup {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.regions.len() + 1))?;
        map.serialize_entry(META_KEY, &self.meta)?;
        for (id, record) in &self.regions {
            map.serialize_entry(id, record)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for DatasetLookup {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct LookupVisitor;

        impl<'de> Visitor<'de> for LookupVisitor {
            type Value = DatasetLookup;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a lookup object with a `_meta` entry")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<DatasetLookup, A::Error> {
                let mut meta = None;
                let mut regions = BTreeMap::new();
                while let Some(key) = access.next_key::<String>()? {
                    if key == META_KEY {
                        meta = Some(access.next_value::<DatasetMeta>()?);
                    } else {
                        let record = access.next_value::<RegionRecord>()?;
                        regions.insert(key, record);
                    }
                }
                let meta = meta.ok_or_else(|| de::Error::missing_field(META_KEY))?;
                Ok(DatasetLookup { meta, regions })
            }
        }

        deserializer.deserialize_map(LookupVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::value::Cell;

    const SAMPLE: &str = r#"{
        "_meta": {
            "time": { "value": [2019, 2020, 2021], "name": "time" },
            "variables": {
                "rate": { "code": "X2", "time_range": [0, 2] },
                "snapshot": { "code": "X3", "time_range": [2, 2] },
                "empty": { "code": "X4", "time_range": [-1, -1] }
            }
        },
        "51001": { "X2": [1.5, "NA", 2], "X3": 7 },
        "51003": { "X3": "rural" }
    }"#;

    #[test]
    fn test_parse_artifact() {
        let lookup = DatasetLookup::from_json_str(SAMPLE).unwrap();
        assert_eq!(lookup.time().values(), &[2019, 2020, 2021]);
        assert_eq!(lookup.regions.len(), 2);

        let rate = lookup.variable("rate").unwrap();
        assert_eq!(rate.code.to_string(), "X2");
        assert_eq!(rate.envelope, Some(Envelope::new(0, 2)));
        assert_eq!(lookup.variable("empty").unwrap().envelope, None);

        assert_eq!(
            lookup.stored("51003", "snapshot"),
            Some(&StoredValue::Scalar(Cell::Text("rural".to_string())))
        );
        assert_eq!(lookup.stored("51003", "rate"), None);
    }

    #[test]
    fn test_meta_written_first_and_reparsed() {
        let lookup = DatasetLookup::from_json_str(SAMPLE).unwrap();
        let json = lookup.to_json_string().unwrap();
        assert!(json.starts_with(r#"{"_meta":{"time":{"value":[2019,2020,2021]"#));
        assert!(json.contains(r#""empty":{"code":"X4","time_range":[-1,-1]}"#));
        assert!(json.contains(r#""51001":{"X2":[1.5,"NA",2],"X3":7}"#));
        assert_eq!(DatasetLookup::from_json_str(&json).unwrap(), lookup);
    }

    #[test]
    fn test_missing_meta_rejected() {
        assert!(DatasetLookup::from_json_str(r#"{"51001": {}}"#).is_err());
    }

    #[test]
    fn test_envelope_helpers() {
        let e = Envelope::new(2, 4);
        assert_eq!(e.width(), 3);
        assert_eq!(e.index_of(3), Some(1));
        assert_eq!(e.index_of(5), None);
        assert_eq!(Envelope::extend(Some(e), 0), Envelope::new(0, 4));
        assert_eq!(Envelope::extend(None, 6), Envelope::new(6, 6));
    }
}
