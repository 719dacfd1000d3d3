//! Value → palette color mapping for choropleth shading
//!
//! Three modes share one discrete palette of N colors:
//! - linear from min to max
//! - centered on the median or mean (lower half of the palette below the
//!   center, upper half above)
//! - rank position among the observed values

use super::palettes::{palette_registry, PaletteDefinition, DEFAULT_RANK_PALETTE};
use crate::lookup::query::VariableSummary;

/// No-data color for the light theme
pub const NA_COLOR_LIGHT: &str = "#cccccc";

/// No-data color for the dark theme
pub const NA_COLOR_DARK: &str = "#555555";

/// Center of the value scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorCenter {
    None,
    #[default]
    Median,
    Mean,
}

impl ColorCenter {
    /// Parse from a validated property value; unknown strings mean `None`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "median" => Self::Median,
            "mean" => Self::Mean,
            _ => Self::None,
        }
    }
}

pub fn na_color(dark: bool) -> &'static str {
    if dark {
        NA_COLOR_DARK
    } else {
        NA_COLOR_LIGHT
    }
}

/// Palette index for a value on a linear or centered scale
pub fn value_index(value: f64, summary: &VariableSummary, steps: usize, center: ColorCenter) -> usize {
    if steps == 0 {
        return 0;
    }
    let (min, max) = (summary.min, summary.max);
    if min == max {
        return steps / 2;
    }

    let t = match center {
        ColorCenter::Median => centered(value, min, max, summary.median, steps),
        ColorCenter::Mean => centered(value, min, max, summary.mean, steps),
        ColorCenter::None => (value - min) / (max - min),
    };

    scaled_index(t, steps)
}

/// Palette index for a value by its position in ascending `sorted` values
///
/// A value not among `sorted` maps to the first color.
pub fn rank_index(value: f64, sorted: &[f64], steps: usize) -> usize {
    if steps == 0 {
        return 0;
    }
    let Some(rank) = sorted.iter().position(|v| *v == value) else {
        return 0;
    };
    let t = if sorted.len() > 1 {
        rank as f64 / (sorted.len() - 1) as f64
    } else {
        0.5
    };
    ((t * steps as f64).floor() as usize).min(steps - 1)
}

/// Position in [0, 1] on a scale split at `center`
fn centered(value: f64, min: f64, max: f64, center: f64, steps: usize) -> f64 {
    let last = (steps - 1) as f64;
    let mid = last / 2.0;
    if steps == 1 {
        return 0.0;
    }
    if value <= center {
        if center == min {
            return mid / last;
        }
        let t = (value - min) / (center - min);
        t * mid / last
    } else {
        if center == max {
            return mid / last;
        }
        let t = (value - center) / (max - center);
        (mid + t * mid) / last
    }
}

fn scaled_index(t: f64, steps: usize) -> usize {
    let idx = (t * steps as f64).floor();
    if idx.is_nan() || idx < 0.0 {
        0
    } else {
        (idx as usize).min(steps - 1)
    }
}

/// A configured scale for one variable at one time point
#[derive(Debug, Clone)]
pub struct ColorScale<'a> {
    palette: &'a PaletteDefinition,
    summary: VariableSummary,
    center: ColorCenter,
    /// Ascending observed values when coloring by rank
    ranks: Option<Vec<f64>>,
    dark: bool,
}

impl<'a> ColorScale<'a> {
    pub fn by_value(
        palette: &'a PaletteDefinition,
        summary: VariableSummary,
        center: ColorCenter,
        dark: bool,
    ) -> Self {
        ColorScale {
            palette,
            summary,
            center,
            ranks: None,
            dark,
        }
    }

    pub fn by_rank(
        palette: &'a PaletteDefinition,
        summary: VariableSummary,
        sorted: Vec<f64>,
        dark: bool,
    ) -> Self {
        ColorScale {
            palette,
            summary,
            center: ColorCenter::None,
            ranks: Some(sorted),
            dark,
        }
    }

    pub fn index(&self, value: f64) -> usize {
        let steps = self.palette.len();
        match &self.ranks {
            Some(sorted) => rank_index(value, sorted, steps),
            None => value_index(value, &self.summary, steps, self.center),
        }
    }

    /// Hex color for a value; `None` (or an empty palette) gives the no-data color
    pub fn color(&self, value: Option<f64>) -> &str {
        value
            .and_then(|v| self.palette.color(self.index(v)))
            .unwrap_or_else(|| na_color(self.dark))
    }

    pub fn palette(&self) -> &PaletteDefinition {
        self.palette
    }
}

/// Registry lookup for the rank palette, falling back like any other name
pub fn rank_palette() -> Option<&'static PaletteDefinition> {
    palette_registry().get_or_default(DEFAULT_RANK_PALETTE)
}
