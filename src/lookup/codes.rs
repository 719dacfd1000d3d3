//! Compact variable identifiers and the persisted code registry
//!
//! Region records key their values by short ids (`X2`, `X3`, ...) instead of
//! variable names. The registry is written next to the artifacts and loaded on
//! the next build, so a variable keeps its id even when source column order
//! changes. `X1` is reserved for the time axis.

use super::error::{LookupError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// First number handed out to a variable
pub const FIRST_VARIABLE_CODE: u32 = 2;

/// Short storage key for one variable, rendered as `X<n>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompactId(u32);

impl CompactId {
    pub fn new(n: u32) -> Self {
        CompactId(n)
    }

    pub fn number(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for CompactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X{}", self.0)
    }
}

impl FromStr for CompactId {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self> {
        s.strip_prefix('X')
            .and_then(|n| n.parse::<u32>().ok())
            .filter(|n| *n >= FIRST_VARIABLE_CODE)
            .map(CompactId)
            .ok_or_else(|| LookupError::InvalidCode(s.to_string()))
    }
}

impl Serialize for CompactId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CompactId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Name → id mapping shared by every build that uses the same output directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CodeRegistry {
    codes: IndexMap<String, CompactId>,
}

impl CodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a registry file, or start empty if it does not exist yet
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No code registry at {}, starting fresh", path.display());
            return Ok(Self::new());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| LookupError::io(path.display().to_string(), e))?;
        let registry: CodeRegistry = serde_json::from_str(&text)?;
        tracing::debug!(
            "Loaded {} compact ids from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text).map_err(|e| LookupError::io(path.display().to_string(), e))
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<CompactId> {
        self.codes.get(name).copied()
    }

    /// Return the id for a variable, allocating the next free number if new
    pub fn assign(&mut self, name: &str) -> CompactId {
        if let Some(code) = self.codes.get(name) {
            return *code;
        }
        let next = self
            .codes
            .values()
            .map(|c| c.number() + 1)
            .max()
            .unwrap_or(FIRST_VARIABLE_CODE);
        let code = CompactId(next);
        self.codes.insert(name.to_string(), code);
        code
    }

    /// Assign ids for a declaration-ordered variable list
    pub fn assign_all<S: AsRef<str>>(&mut self, names: &[S]) -> Vec<CompactId> {
        names.iter().map(|n| self.assign(n.as_ref())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_id_roundtrip() {
        let code: CompactId = "X12".parse().unwrap();
        assert_eq!(code.number(), 12);
        assert_eq!(code.to_string(), "X12");
        assert!("X1".parse::<CompactId>().is_err());
        assert!("Y2".parse::<CompactId>().is_err());
        assert!("X".parse::<CompactId>().is_err());
    }

    #[test]
    fn test_fresh_registry_is_sequential() {
        let mut registry = CodeRegistry::new();
        let codes = registry.assign_all(&["a", "b", "c"]);
        let rendered: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
        assert_eq!(rendered, vec!["X2", "X3", "X4"]);
    }

    #[test]
    fn test_ids_stable_when_column_order_changes() {
        let mut registry = CodeRegistry::new();
        registry.assign_all(&["a", "b", "c"]);

        // Next build sees reordered columns plus a new one
        let codes = registry.assign_all(&["c", "new", "a"]);
        let rendered: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
        assert_eq!(rendered, vec!["X4", "X5", "X2"]);
        assert_eq!(registry.get("b").unwrap().to_string(), "X3");
    }

    #[test]
    fn test_registry_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codes.json");

        let missing = CodeRegistry::load_or_default(&path).unwrap();
        assert!(missing.is_empty());

        let mut registry = CodeRegistry::new();
        registry.assign_all(&["rate", "count"]);
        registry.save(&path).unwrap();

        let loaded = CodeRegistry::load_or_default(&path).unwrap();
        assert_eq!(loaded, registry);
        assert_eq!(loaded.get("count").unwrap().to_string(), "X3");
    }
}
