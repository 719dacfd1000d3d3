//! datapackage.json: the manifest describing every built lookup
//!
//! Besides naming the resources, the manifest carries each variable's field
//! statistics. A field whose `time_range` starts at -1 has no data at that
//! granularity, which is what availability gating keys on.

use crate::lookup::field_stats::FieldInfo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Spatial granularity of a lookup, ordered coarse to fine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    District,
    County,
    Tract,
}

impl Granularity {
    pub const ALL: [Granularity; 3] = [Granularity::District, Granularity::County, Granularity::Tract];

    /// Fallback order when the current level lacks a variable: most granular first
    pub const PREFERENCE: [Granularity; 3] =
        [Granularity::Tract, Granularity::County, Granularity::District];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::District => "district",
            Granularity::County => "county",
            Granularity::Tract => "tract",
        }
    }

    pub fn display_label(&self) -> &'static str {
        match self {
            Granularity::District => "District",
            Granularity::County => "County",
            Granularity::Tract => "Census Tract",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "district" => Ok(Granularity::District),
            "county" => Ok(Granularity::County),
            "tract" => Ok(Granularity::Tract),
            other => Err(format!(
                "unknown granularity '{}', expected district, county or tract",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<FieldInfo>,
}

/// One built lookup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub name: String,
    pub schema: Schema,
    /// Size of the written lookup JSON
    #[serde(default)]
    pub bytes: u64,
    /// Source rows read
    #[serde(default)]
    pub rows: usize,
    /// Regions in the lookup
    #[serde(default)]
    pub entities: usize,
}

impl Resource {
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.schema.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub title: String,
    pub licence: String,
    pub resources: Vec<Resource>,
    /// Verbatim copy of measure_info.json (empty object when absent)
    #[serde(default = "empty_object")]
    pub measure_info: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Manifest {
    pub fn new(name: impl Into<String>, title: impl Into<String>, licence: impl Into<String>) -> Self {
        Manifest {
            name: name.into(),
            title: title.into(),
            licence: licence.into(),
            resources: Vec::new(),
            measure_info: empty_object(),
        }
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| r.name == name)
    }
}

/// Whether `variable` has data at `level`
///
/// With no manifest loaded yet every variable counts as available. A missing
/// resource or field counts as unavailable.
pub fn variable_available(manifest: Option<&Manifest>, variable: &str, level: Granularity) -> bool {
    let Some(manifest) = manifest else {
        return true;
    };
    manifest
        .resource(level.as_str())
        .and_then(|r| r.field(variable))
        .map(FieldInfo::has_data)
        .unwrap_or(false)
}

/// Availability of a variable at each granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AvailableLevels {
    pub district: bool,
    pub county: bool,
    pub tract: bool,
}

impl AvailableLevels {
    pub fn for_variable(manifest: Option<&Manifest>, variable: &str) -> Self {
        AvailableLevels {
            district: variable_available(manifest, variable, Granularity::District),
            county: variable_available(manifest, variable, Granularity::County),
            tract: variable_available(manifest, variable, Granularity::Tract),
        }
    }

    pub fn get(&self, level: Granularity) -> bool {
        match level {
            Granularity::District => self.district,
            Granularity::County => self.county,
            Granularity::Tract => self.tract,
        }
    }

    /// Keep `current` when it has data, otherwise the most granular level that does
    ///
    /// Returns `None` when no level has the variable.
    pub fn preferred(&self, current: Granularity) -> Option<Granularity> {
        if self.get(current) {
            return Some(current);
        }
        Granularity::PREFERENCE.into_iter().find(|level| self.get(*level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::dataset::Envelope;
    use crate::lookup::field_stats::FieldType;

    fn field(name: &str, envelope: Option<Envelope>) -> FieldInfo {
        FieldInfo {
            name: name.to_string(),
            field_type: FieldType::Float,
            time_range: envelope,
            missing: 0,
            mean: None,
            sd: None,
            min: None,
            max: None,
        }
    }

    fn manifest() -> Manifest {
        let mut m = Manifest::new("vdh_rural_health", "Title", "public");
        for (name, fields) in [
            (
                "district",
                vec![field("rate", Some(Envelope::new(0, 3))), field("tract_only", None)],
            ),
            (
                "county",
                vec![field("rate", Some(Envelope::new(1, 3))), field("tract_only", None)],
            ),
            ("tract", vec![field("tract_only", Some(Envelope::new(2, 2)))]),
        ] {
            m.resources.push(Resource {
                name: name.to_string(),
                schema: Schema { fields },
                bytes: 0,
                rows: 0,
                entities: 0,
            });
        }
        m
    }

    #[test]
    fn test_availability_gating() {
        let m = manifest();
        assert!(variable_available(Some(&m), "rate", Granularity::County));
        assert!(!variable_available(Some(&m), "rate", Granularity::Tract));
        assert!(!variable_available(Some(&m), "tract_only", Granularity::District));
        assert!(!variable_available(Some(&m), "unknown", Granularity::District));
        assert!(variable_available(None, "unknown", Granularity::District));
    }

    #[test]
    fn test_preferred_level() {
        let m = manifest();
        let rate = AvailableLevels::for_variable(Some(&m), "rate");
        assert_eq!(rate.preferred(Granularity::District), Some(Granularity::District));
        assert_eq!(rate.preferred(Granularity::Tract), Some(Granularity::County));

        let tract_only = AvailableLevels::for_variable(Some(&m), "tract_only");
        assert_eq!(tract_only.preferred(Granularity::County), Some(Granularity::Tract));

        let none = AvailableLevels::for_variable(Some(&m), "unknown");
        assert_eq!(none.preferred(Granularity::County), None);
    }

    #[test]
    fn test_manifest_json_shape() {
        let text = r#"{
            "name": "vdh_rural_health",
            "title": "T",
            "licence": "public",
            "resources": [{
                "name": "county",
                "schema": { "fields": [
                    { "name": "time", "type": "integer", "time_range": [0, 4], "missing": 0 },
                    { "name": "x", "type": "unknown", "time_range": [-1, -1], "missing": 9 }
                ]},
                "bytes": 120, "rows": 9, "entities": 3
            }]
        }"#;
        let m: Manifest = serde_json::from_str(text).unwrap();
        assert_eq!(m.measure_info, serde_json::json!({}));
        let county = m.resource("county").unwrap();
        assert_eq!(county.entities, 3);
        assert!(!county.field("x").unwrap().has_data());
        assert_eq!("Tract".parse::<Granularity>(), Ok(Granularity::Tract));
        assert!("block".parse::<Granularity>().is_err());
    }
}
