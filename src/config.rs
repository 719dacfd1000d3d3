//! Build and view configuration from dashboard properties
//!
//! All default values come from dashboard.json through `PropertyReader`; no
//! fallbacks are hardcoded here. Enumerated values are validated by the reader
//! (invalid input logs a warning and uses the default).

use crate::lookup::properties::PropertyReader;
use crate::present::colors::ColorCenter;
use crate::present::export::{Separator, TableFormat};
use std::path::PathBuf;

/// One source table and the granularity it is published as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSource {
    /// Artifact name, e.g. `county` → `county.json`
    pub name: String,
    /// File name inside the data directory
    pub file: String,
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Code registry path (inside `output_dir` unless absolute)
    pub codes_path: PathBuf,
    /// Datasets in build order
    pub datasets: Vec<DatasetSource>,
    pub delimiter: u8,
    pub package_name: String,
    pub package_title: String,
    pub package_licence: String,
}

impl BuildConfig {
    pub fn from_properties(props: &PropertyReader) -> Self {
        let output_dir = PathBuf::from(props.get_string("output.dir"));
        let codes_path = output_dir.join(props.get_string("codes.file"));

        let datasets = props
            .get_pairs("datasets")
            .into_iter()
            .map(|(name, file)| DatasetSource { name, file })
            .collect();

        let delimiter = match props.get_enum("delimiter").as_str() {
            "tab" => b'\t',
            _ => b',',
        };

        Self {
            data_dir: PathBuf::from(props.get_string("data.dir")),
            output_dir,
            codes_path,
            datasets,
            delimiter,
            package_name: props.get_string("package.name"),
            package_title: props.get_string("package.title"),
            package_licence: props.get_string("package.licence"),
        }
    }

    pub fn measure_info_source(&self) -> PathBuf {
        self.data_dir.join("measure_info.json")
    }
}

#[derive(Debug, Clone)]
pub struct ViewConfig {
    /// HTTP(S) origin serving artifacts; `None` reads the output directory
    pub base_url: Option<String>,
    pub base_path: String,
    pub output_dir: PathBuf,
    pub export_prefix: String,
    pub table_format: TableFormat,
    pub separator: Separator,
    pub color_center: ColorCenter,
    pub color_by_rank: bool,
    pub value_palette: String,
    pub rank_palette: String,
    /// Decimal places for printed values and statements
    pub digits: usize,
    pub dark: bool,
}

impl ViewConfig {
    pub fn from_properties(props: &PropertyReader) -> Self {
        Self {
            base_url: props.get_optional_string("base.url"),
            base_path: props.get_string("base.path"),
            output_dir: PathBuf::from(props.get_string("output.dir")),
            export_prefix: props.get_string("export.prefix"),
            table_format: TableFormat::parse(&props.get_enum("export.table.format")),
            separator: Separator::parse(&props.get_enum("export.file.format")),
            color_center: ColorCenter::parse(&props.get_enum("color.center")),
            color_by_rank: props.get_bool("color.by.rank"),
            value_palette: props.get_string("color.palette"),
            rank_palette: props.get_string("rank.palette"),
            digits: props.get_usize("digits"),
            dark: props.get_enum("theme") == "dark",
        }
    }

    /// Palette for the current coloring mode
    pub fn palette_name(&self) -> &str {
        if self.color_by_rank {
            &self.rank_palette
        } else {
            &self.value_palette
        }
    }
}
