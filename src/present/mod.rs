//! Presentation helpers over query results
//!
//! - Palette registry and value → color mapping (`palettes`, `colors`)
//! - Delimited re-pivot exports (`export`)
//! - Measure labels, categories and statements (`measure_info`)

pub mod colors;
pub mod export;
pub mod measure_info;
pub mod palettes;

pub use colors::{na_color, ColorCenter, ColorScale};
pub use export::{export_file_name, generate_export, Separator, TableFormat};
pub use measure_info::{group_by_category, MeasureRegistry, ResolvedVariable};
pub use palettes::{palette_registry, PaletteDefinition};
