//! Dashboard property definitions with defaults from dashboard.json
//!
//! dashboard.json is embedded at compile time and is the single place where
//! defaults and enumerated values live. `PropertyReader` layers user-supplied
//! values (CLI flags, `--set key=value`) on top of those defaults.

use serde::Deserialize;
use std::collections::HashMap;

/// dashboard.json embedded at compile time
const DASHBOARD_JSON: &str = include_str!("../../dashboard.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PropertyKind {
    #[serde(rename = "StringProperty")]
    String,
    #[serde(rename = "EnumeratedProperty")]
    Enumerated,
    #[serde(rename = "BooleanProperty")]
    Boolean,
}

/// Property definition from dashboard.json
#[derive(Debug, Clone, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    pub kind: PropertyKind,
    #[serde(rename = "defaultValue", default)]
    pub default_value: String,
    #[serde(default)]
    pub description: String,
    /// For enumerated properties, the valid values
    #[serde(rename = "values", default)]
    pub valid_values: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct PropertyFile {
    properties: Vec<PropertyDef>,
}

/// Registry of every dashboard property, keyed by name
#[derive(Debug, Default)]
pub struct PropertyRegistry {
    properties: HashMap<String, PropertyDef>,
}

impl PropertyRegistry {
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let file: PropertyFile = serde_json::from_str(text)?;
        let properties = file
            .properties
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        Ok(Self { properties })
    }

    fn embedded() -> Self {
        Self::from_json(DASHBOARD_JSON).unwrap_or_else(|e| {
            tracing::error!("dashboard.json is invalid, no defaults available: {}", e);
            Self::default()
        })
    }

    pub fn get_default(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(|p| p.default_value.as_str())
    }

    pub fn get_property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(|k| k.as_str())
    }

    /// Check if a value is valid for an enumerated property
    pub fn is_valid_enum_value(&self, name: &str, value: &str) -> bool {
        self.properties
            .get(name)
            .and_then(|p| p.valid_values.as_ref())
            .map(|values| values.iter().any(|v| v.eq_ignore_ascii_case(value)))
            .unwrap_or(true)
    }
}

static REGISTRY: std::sync::OnceLock<PropertyRegistry> = std::sync::OnceLock::new();

/// Global property registry
pub fn registry() -> &'static PropertyRegistry {
    REGISTRY.get_or_init(PropertyRegistry::embedded)
}

/// Typed property reader: user value if set, else the dashboard.json default
#[derive(Debug, Clone, Default)]
pub struct PropertyReader {
    user_values: HashMap<String, String>,
}

impl PropertyReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `key=value` overrides; malformed entries and unknown keys are skipped
    pub fn from_overrides<I, S>(overrides: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut reader = Self::new();
        for entry in overrides {
            let entry = entry.as_ref();
            match entry.split_once('=') {
                Some((key, value)) => reader.set(key.trim(), value.trim()),
                None => tracing::warn!("Ignoring property override '{}', expected key=value", entry),
            }
        }
        reader
    }

    /// Set a user value; empty means "not set"
    pub fn set(&mut self, name: &str, value: &str) {
        if registry().get_property(name).is_none() {
            tracing::warn!("Unknown property '{}' ignored", name);
            return;
        }
        if value.is_empty() {
            self.user_values.remove(name);
        } else {
            self.user_values.insert(name.to_string(), value.to_string());
        }
    }

    pub fn get_string(&self, name: &str) -> String {
        if let Some(value) = self.user_values.get(name) {
            return value.clone();
        }
        registry().get_default(name).unwrap_or("").to_string()
    }

    pub fn get_optional_string(&self, name: &str) -> Option<String> {
        let value = self.get_string(name);
        (!value.is_empty()).then_some(value)
    }

    /// Enumerated property, lowercased; invalid user values fall back to the default
    pub fn get_enum(&self, name: &str) -> String {
        let reg = registry();
        let default = reg.get_default(name).unwrap_or("");

        if let Some(value) = self.user_values.get(name) {
            if reg.is_valid_enum_value(name, value) {
                return value.to_lowercase();
            }
            let valid_values = reg
                .get_property(name)
                .and_then(|p| p.valid_values.as_ref())
                .map(|v| v.join(", "))
                .unwrap_or_default();
            tracing::warn!(
                "Invalid value '{}' for property '{}'. Valid values: [{}]. Using default: '{}'",
                value,
                name,
                valid_values,
                default
            );
        }

        default.to_string()
    }

    pub fn get_bool(&self, name: &str) -> bool {
        let default = registry().get_default(name) == Some("true");
        match self.user_values.get(name).map(|v| v.to_lowercase()).as_deref() {
            Some("true") | Some("1") | Some("yes") => true,
            Some("false") | Some("0") | Some("no") => false,
            Some(other) => {
                tracing::warn!(
                    "Invalid boolean value '{}' for property '{}'. Using default: {}",
                    other,
                    name,
                    default
                );
                default
            }
            None => default,
        }
    }

    /// Non-negative integer property; unparseable values fall back to the default
    pub fn get_usize(&self, name: &str) -> usize {
        let default = registry()
            .get_default(name)
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(0);
        let value = self.get_string(name);
        match value.parse::<usize>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    "Invalid integer value '{}' for property '{}'. Using default: {}",
                    value,
                    name,
                    default
                );
                default
            }
        }
    }

    /// Comma separated `key=value` list, in declared order
    pub fn get_pairs(&self, name: &str) -> Vec<(String, String)> {
        self.get_string(name)
            .split(',')
            .filter_map(|item| {
                let item = item.trim();
                if item.is_empty() {
                    return None;
                }
                match item.split_once('=') {
                    Some((k, v)) if !k.trim().is_empty() && !v.trim().is_empty() => {
                        Some((k.trim().to_string(), v.trim().to_string()))
                    }
                    _ => {
                        tracing::warn!("Ignoring malformed entry '{}' in '{}'", item, name);
                        None
                    }
                }
            })
            .collect()
    }
}
