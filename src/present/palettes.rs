//! Palette registry for the map color scales
//!
//! Loads palettes from palettes.json (embedded at compile time) and provides
//! access by name.
//!
//! Palette types:
//! - `sequential`: ordered from low to high, used for rank coloring
//! - `diverging`: neutral midpoint, used for value coloring around a center

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

const PALETTES_JSON: &str = include_str!("../../palettes.json");

/// Palette used for value coloring, and the fallback for unknown names
pub const DEFAULT_VALUE_PALETTE: &str = "vik";

/// Palette used for rank coloring
pub const DEFAULT_RANK_PALETTE: &str = "lajolla";

static PALETTE_REGISTRY: OnceLock<PaletteRegistry> = OnceLock::new();

/// Global palette registry, parsed on first access
pub fn palette_registry() -> &'static PaletteRegistry {
    PALETTE_REGISTRY.get_or_init(|| {
        PaletteRegistry::from_json(PALETTES_JSON).unwrap_or_else(|e| {
            tracing::error!("Failed to load palettes.json: {}", e);
            PaletteRegistry::default()
        })
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaletteType {
    Sequential,
    Diverging,
}

/// A discrete palette: an ordered list of hex colors
#[derive(Debug, Clone, Deserialize)]
pub struct PaletteDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub palette_type: PaletteType,
    pub colors: Vec<String>,
}

impl PaletteDefinition {
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Hex color at an index, clamped to the last entry
    pub fn color(&self, index: usize) -> Option<&str> {
        let last = self.colors.len().checked_sub(1)?;
        self.colors.get(index.min(last)).map(|c| c.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaletteRegistry {
    /// Lowercase keys for case-insensitive lookup
    palettes: HashMap<String, PaletteDefinition>,
    names: Vec<String>,
}

impl PaletteRegistry {
    pub fn from_json(json: &str) -> Result<Self, String> {
        let definitions: Vec<PaletteDefinition> = serde_json::from_str(json)
            .map_err(|e| format!("Failed to parse palettes JSON: {}", e))?;

        let mut registry = Self::default();
        for def in definitions {
            if def.is_empty() {
                tracing::warn!("Palette '{}' has no colors, skipped", def.name);
                continue;
            }
            registry.names.push(def.name.clone());
            registry.palettes.insert(def.name.to_lowercase(), def);
        }

        tracing::debug!("Loaded {} palettes: {:?}", registry.names.len(), registry.names);
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&PaletteDefinition> {
        self.palettes.get(&name.to_lowercase())
    }

    /// Named palette, or the value palette when the name is unknown
    pub fn get_or_default(&self, name: &str) -> Option<&PaletteDefinition> {
        self.get(name).or_else(|| {
            tracing::warn!(
                "Unknown palette '{}', using '{}'",
                name,
                DEFAULT_VALUE_PALETTE
            );
            self.get(DEFAULT_VALUE_PALETTE)
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}
