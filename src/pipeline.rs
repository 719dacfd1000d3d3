//! Build pipeline: source tables → lookup artifacts + manifest
//!
//! The pipeline:
//! 1. Checks the data directory and prepares the output directory
//! 2. Copies measure_info.json next to the artifacts
//! 3. Loads the compact id registry
//! 4. Builds, writes and describes each dataset (a failing dataset is logged
//!    and skipped, the others still build)
//! 5. Saves the registry and writes datapackage.json

use crate::artifacts::manifest::{Manifest, Resource, Schema};
use crate::config::{BuildConfig, DatasetSource};
use crate::lookup::codes::CodeRegistry;
use crate::lookup::compactor::build_lookup;
use crate::lookup::error::LookupError;
use crate::lookup::field_stats::build_field_info;
use crate::lookup::rows::RowSet;
use crate::memprof::Profile;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that stop the whole build
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Data directory not found: {0}")]
    DataDirMissing(PathBuf),

    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// A dataset that could not be built
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetFailure {
    pub name: String,
    pub message: String,
}

/// Outcome of a build run
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub manifest: Manifest,
    pub failures: Vec<DatasetFailure>,
    pub manifest_path: PathBuf,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

struct BuiltDataset {
    resource: Resource,
    path: PathBuf,
}

/// Run a full build
pub fn run_build(config: &BuildConfig) -> Result<BuildReport, BuildError> {
    let mut profile = Profile::start("run_build");

    if !config.data_dir.is_dir() {
        return Err(BuildError::DataDirMissing(config.data_dir.clone()));
    }
    create_dir(&config.output_dir)?;

    let measure_info = copy_measure_info(config)?;

    let mut registry = CodeRegistry::load_or_default(&config.codes_path)?;
    let known_codes = registry.len();

    let mut manifest = Manifest::new(
        config.package_name.clone(),
        config.package_title.clone(),
        config.package_licence.clone(),
    );
    manifest.measure_info = measure_info;

    let mut failures = Vec::new();
    for (i, source) in config.datasets.iter().enumerate() {
        tracing::info!(
            "[{}/{}] Building {} from {}",
            i + 1,
            config.datasets.len(),
            source.name,
            source.file
        );
        match build_dataset(config, source, &mut registry) {
            Ok(built) => {
                tracing::info!(
                    "  Wrote {} ({:.1} MB, {} rows, {} entities)",
                    built.path.display(),
                    built.resource.bytes as f64 / 1024.0 / 1024.0,
                    built.resource.rows,
                    built.resource.entities
                );
                manifest.resources.push(built.resource);
            }
            Err(e) => {
                tracing::error!("  Failed to build {}: {}", source.name, e);
                failures.push(DatasetFailure {
                    name: source.name.clone(),
                    message: e.to_string(),
                });
            }
        }
        profile.checkpoint(&format!("dataset {}", source.name));
    }

    if registry.len() != known_codes {
        tracing::info!(
            "Code registry: {} new ids ({} total)",
            registry.len() - known_codes,
            registry.len()
        );
    }
    registry.save(&config.codes_path)?;

    let manifest_path = config.output_dir.join("datapackage.json");
    let text = serde_json::to_string_pretty(&manifest).map_err(LookupError::from)?;
    write_file(&manifest_path, text.as_bytes())?;
    tracing::info!("Wrote {}", manifest_path.display());

    profile.checkpoint("datapackage written");
    tracing::info!(
        "Build finished in {:.2}s: {} built, {} failed",
        profile.total_secs(),
        manifest.resources.len(),
        failures.len()
    );

    Ok(BuildReport {
        manifest,
        failures,
        manifest_path,
    })
}

/// Copy measure_info.json into the output directory and return its content
///
/// A missing file yields an empty object.
fn copy_measure_info(config: &BuildConfig) -> Result<serde_json::Value, LookupError> {
    let source = config.measure_info_source();
    if !source.exists() {
        tracing::info!("No measure_info.json in {}", config.data_dir.display());
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }
    let text = std::fs::read_to_string(&source)
        .map_err(|e| LookupError::io(source.display().to_string(), e))?;
    let value: serde_json::Value = serde_json::from_str(&text)?;
    write_file(&config.output_dir.join("measure_info.json"), text.as_bytes())?;
    tracing::info!("Copied measure_info.json");
    Ok(value)
}

fn build_dataset(
    config: &BuildConfig,
    source: &DatasetSource,
    registry: &mut CodeRegistry,
) -> Result<BuiltDataset, LookupError> {
    let path = config.data_dir.join(&source.file);
    let rows = RowSet::from_path(&path, config.delimiter)?;
    tracing::debug!("  Parsed {} rows", rows.len());

    let lookup = build_lookup(&rows, registry);
    let fields = build_field_info(&rows, lookup.time());
    let json = lookup.to_json_string()?;

    let out_path = config.output_dir.join(format!("{}.json", source.name));
    write_file(&out_path, json.as_bytes())?;

    Ok(BuiltDataset {
        resource: Resource {
            name: source.name.clone(),
            schema: Schema { fields },
            bytes: json.len() as u64,
            rows: rows.len(),
            entities: lookup.regions.len(),
        },
        path: out_path,
    })
}

fn create_dir(path: &Path) -> Result<(), LookupError> {
    std::fs::create_dir_all(path).map_err(|e| LookupError::io(path.display().to_string(), e))
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), LookupError> {
    std::fs::write(path, contents).map_err(|e| LookupError::io(path.display().to_string(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::dataset::DatasetLookup;
    use crate::lookup::properties::PropertyReader;
    use std::fs;

    fn config_for(root: &Path) -> BuildConfig {
        let props = PropertyReader::from_overrides([
            format!("data.dir={}", root.join("data").display()),
            format!("output.dir={}", root.join("out").display()),
            "datasets=county=county.csv,tract=tract.csv".to_string(),
        ]);
        BuildConfig::from_properties(&props)
    }

    fn write_sources(root: &Path, county: &str) {
        let data = root.join("data");
        fs::create_dir_all(&data).unwrap();
        fs::write(data.join("county.csv"), county).unwrap();
        // No time column: this dataset fails on its own
        fs::write(data.join("tract.csv"), "ID,year,rate\n1,2020,3\n").unwrap();
        fs::write(
            data.join("measure_info.json"),
            r#"{"rate": {"category": "Health", "short_name": "Rate"}}"#,
        )
        .unwrap();
    }

    #[test]
    fn test_build_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(
            dir.path(),
            "ID,time,rate,empty\n51001,2020,1.5,NA\n51001,2021,2,\n51003,2021,4,\n",
        );
        let config = config_for(dir.path());

        let report = run_build(&config).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].name, "tract");

        let out = dir.path().join("out");
        assert!(out.join("measure_info.json").exists());
        assert!(out.join("codes.json").exists());
        assert!(!out.join("tract.json").exists());

        let lookup = DatasetLookup::read_from(&out.join("county.json")).unwrap();
        assert_eq!(lookup.regions.len(), 2);
        assert_eq!(lookup.variable("empty").unwrap().envelope, None);

        let written: Manifest =
            serde_json::from_str(&fs::read_to_string(&report.manifest_path).unwrap()).unwrap();
        assert_eq!(written, report.manifest);
        let county = written.resource("county").unwrap();
        assert_eq!(county.rows, 3);
        assert_eq!(county.entities, 2);
        assert_eq!(
            county.bytes,
            fs::metadata(out.join("county.json")).unwrap().len()
        );
        assert_eq!(county.schema.fields[0].name, "time");
        assert!(!county.field("empty").unwrap().has_data());
        assert_eq!(written.measure_info["rate"]["short_name"], "Rate");
    }

    #[test]
    fn test_codes_stable_across_builds() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path(), "ID,time,a,b\n1,2020,1,2\n");
        let config = config_for(dir.path());
        run_build(&config).unwrap();

        // Columns reordered and a new one added
        write_sources(dir.path(), "ID,time,c,b,a\n1,2020,3,2,1\n");
        run_build(&config).unwrap();

        let lookup = DatasetLookup::read_from(&dir.path().join("out/county.json")).unwrap();
        assert_eq!(lookup.variable("a").unwrap().code.to_string(), "X2");
        assert_eq!(lookup.variable("b").unwrap().code.to_string(), "X3");
        assert_eq!(lookup.variable("c").unwrap().code.to_string(), "X4");
    }

    #[test]
    fn test_missing_data_dir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path());
        assert!(matches!(
            run_build(&config),
            Err(BuildError::DataDirMissing(_))
        ));
    }
}
