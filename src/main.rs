//! Panel Lookup - command line entry point
//!
//! `build` compacts the source tables into lookup artifacts. The other
//! subcommands load artifacts (from the output directory or over HTTP) and
//! query them the way the dashboard does.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use panel_lookup::artifacts::{
    ArtifactLoader, AvailableLevels, DirSource, Granularity, HttpSource, Manifest,
};
use panel_lookup::config::{BuildConfig, ViewConfig};
use panel_lookup::lookup::properties::PropertyReader;
use panel_lookup::lookup::{query, DatasetLookup};
use panel_lookup::pipeline::run_build;
use panel_lookup::present::colors::ColorScale;
use panel_lookup::present::export::{export_file_name, generate_export, Separator, TableFormat};
use panel_lookup::present::measure_info::{group_by_category, MeasureRegistry};
use panel_lookup::present::palettes::palette_registry;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::filter::LevelFilter;

#[cfg(feature = "jemalloc")]
use tikv_jemallocator::Jemalloc;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Property override, repeatable (e.g. `--set theme=dark`)
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,

    /// Artifact directory (output.dir)
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// Serve artifacts from this HTTP(S) origin instead of the output directory (base.url)
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build lookup artifacts and datapackage.json from the source tables
    Build {
        /// Source table directory (data.dir)
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Cross-region summary of a variable at one year
    Summary(PointArgs),
    /// Value and color of every region at one year
    Colors(PointArgs),
    /// Time series of one region
    Series {
        #[arg(long)]
        dataset: Granularity,
        #[arg(long)]
        region: String,
        #[arg(long)]
        variable: String,
    },
    /// Re-pivot a lookup into delimited text
    Export {
        #[arg(long)]
        dataset: Granularity,
        /// Variables to include, all when omitted
        #[arg(long = "variable")]
        variables: Vec<String>,
        /// tall, wide or mixed (export.table.format)
        #[arg(long)]
        format: Option<String>,
        /// csv or tsv (export.file.format)
        #[arg(long)]
        separator: Option<String>,
        /// Write to this directory using the export file name instead of stdout
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Variables grouped by category, with per-level availability
    Variables {
        #[arg(long, default_value = "county")]
        dataset: Granularity,
    },
}

#[derive(Args, Debug)]
struct PointArgs {
    #[arg(long)]
    dataset: Granularity,
    #[arg(long)]
    variable: String,
    /// Time label; defaults to the last year of the axis
    #[arg(long)]
    year: Option<i64>,
    /// Only regions whose id starts with this prefix
    #[arg(long)]
    within: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init();

    let cli = Cli::parse();
    let mut props = PropertyReader::from_overrides(&cli.overrides);
    if let Some(dir) = &cli.output_dir {
        props.set("output.dir", &dir.display().to_string());
    }
    if let Some(url) = &cli.base_url {
        props.set("base.url", url);
    }

    match cli.command {
        Command::Build { data_dir } => {
            if let Some(dir) = data_dir {
                props.set("data.dir", &dir.display().to_string());
            }
            build(BuildConfig::from_properties(&props)).await
        }
        Command::Summary(args) => summary(&view(&props), args).await,
        Command::Colors(args) => colors(&view(&props), args).await,
        Command::Series {
            dataset,
            region,
            variable,
        } => series(&view(&props), dataset, &region, &variable).await,
        Command::Export {
            dataset,
            variables,
            format,
            separator,
            out_dir,
        } => {
            if let Some(format) = format {
                props.set("export.table.format", &format);
            }
            if let Some(separator) = separator {
                props.set("export.file.format", &separator);
            }
            export(&view(&props), dataset, &variables, out_dir).await
        }
        Command::Variables { dataset } => variables(&view(&props), dataset).await,
    }
}

fn view(props: &PropertyReader) -> ViewConfig {
    ViewConfig::from_properties(props)
}

async fn build(config: BuildConfig) -> Result<()> {
    tracing::info!(
        "Building {} from {} into {}",
        config.package_name,
        config.data_dir.display(),
        config.output_dir.display()
    );
    let report = tokio::task::spawn_blocking(move || run_build(&config))
        .await
        .context("build task panicked")??;

    if !report.is_success() {
        for failure in &report.failures {
            tracing::error!("{}: {}", failure.name, failure.message);
        }
        bail!(
            "{} of {} datasets failed",
            report.failures.len(),
            report.failures.len() + report.manifest.resources.len()
        );
    }
    Ok(())
}

fn loader(config: &ViewConfig) -> ArtifactLoader {
    match &config.base_url {
        Some(url) => ArtifactLoader::with_source(HttpSource::new(url, &config.base_path)),
        None => ArtifactLoader::with_source(DirSource::new(config.output_dir.clone())),
    }
}

async fn load_dataset(loader: &ArtifactLoader, level: Granularity) -> Result<Arc<DatasetLookup>> {
    loader
        .load_dataset(level.as_str())
        .await
        .with_context(|| format!("loading {} lookup", level))
}

/// Axis offset for `year`, or the last offset when not given
fn resolve_offset(lookup: &DatasetLookup, year: Option<i64>) -> Result<(i64, usize)> {
    let axis = lookup.time();
    match year {
        Some(year) => axis
            .offset(year)
            .map(|offset| (year, offset))
            .ok_or_else(|| anyhow!("year {} is not on the time axis {:?}", year, axis.values())),
        None => {
            let offset = axis
                .len()
                .checked_sub(1)
                .ok_or_else(|| anyhow!("lookup has an empty time axis"))?;
            let year = axis.label(offset).unwrap_or_default();
            Ok((year, offset))
        }
    }
}

fn prefix_filter(prefix: &Option<String>) -> impl Fn(&str) -> bool + '_ {
    move |id: &str| prefix.as_deref().map_or(true, |p| id.starts_with(p))
}

async fn summary(config: &ViewConfig, args: PointArgs) -> Result<()> {
    let loader = loader(config);
    let lookup = load_dataset(&loader, args.dataset).await?;
    let (year, offset) = resolve_offset(&lookup, args.year)?;
    let filter = prefix_filter(&args.within);

    match query::summary(&lookup, &args.variable, offset, Some(&filter)) {
        Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
        None => tracing::warn!("No values for '{}' in {}", args.variable, year),
    }
    Ok(())
}

async fn colors(config: &ViewConfig, args: PointArgs) -> Result<()> {
    let loader = loader(config);
    let lookup = load_dataset(&loader, args.dataset).await?;
    let (year, offset) = resolve_offset(&lookup, args.year)?;
    let filter = prefix_filter(&args.within);

    let Some(summary) = query::summary(&lookup, &args.variable, offset, Some(&filter)) else {
        tracing::warn!("No values for '{}' in {}", args.variable, year);
        return Ok(());
    };
    let palette = palette_registry()
        .get_or_default(config.palette_name())
        .ok_or_else(|| anyhow!("no palettes available"))?;
    let scale = if config.color_by_rank {
        let sorted = query::sorted_values(&lookup, &args.variable, offset, Some(&filter));
        ColorScale::by_rank(palette, summary, sorted, config.dark)
    } else {
        ColorScale::by_value(palette, summary, config.color_center, config.dark)
    };

    let values = query::region_values(&lookup, &args.variable, offset, Some(&filter));
    for id in lookup.regions.keys().filter(|id| filter(id.as_str())) {
        let value = values.get(id.as_str()).copied();
        let shown = value
            .map(|v| format!("{:.*}", config.digits, v))
            .unwrap_or_else(|| "NA".to_string());
        println!("{}\t{}\t{}", id, shown, scale.color(value));
    }
    Ok(())
}

async fn series(
    config: &ViewConfig,
    dataset: Granularity,
    region: &str,
    variable: &str,
) -> Result<()> {
    let loader = loader(config);
    let (lookup, measure_info) = tokio::try_join!(
        load_dataset(&loader, dataset),
        async { loader.load_measure_info().await.context("loading measure info") },
    )?;
    let registry = MeasureRegistry::from_value(&measure_info)?;

    let points = query::series(&lookup, region, variable);
    if points.is_empty() {
        tracing::warn!("No series for '{}' in region {}", variable, region);
        return Ok(());
    }
    for (label, value) in points {
        let shown = value
            .map(|v| format!("{:.*}", config.digits, v))
            .unwrap_or_else(|| "NA".to_string());
        match registry.statement(variable, region, value, config.digits) {
            Some(statement) => println!("{}\t{}\t{}", label, shown, statement),
            None => println!("{}\t{}", label, shown),
        }
    }
    Ok(())
}

async fn export(
    config: &ViewConfig,
    dataset: Granularity,
    variables: &[String],
    out_dir: Option<PathBuf>,
) -> Result<()> {
    let loader = loader(config);
    let lookup = load_dataset(&loader, dataset).await?;
    let format: TableFormat = config.table_format;
    let separator: Separator = config.separator;
    let body = generate_export(&lookup, variables, format, separator)?;

    match out_dir {
        Some(dir) => {
            let single = match variables {
                [one] => Some(one.as_str()),
                _ => None,
            };
            let path = dir.join(export_file_name(
                &config.export_prefix,
                dataset.as_str(),
                single,
                separator,
            ));
            tokio::fs::write(&path, body)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            tracing::info!("Wrote {} ({})", path.display(), separator.content_type());
        }
        None => print!("{}", body),
    }
    Ok(())
}

async fn variables(config: &ViewConfig, dataset: Granularity) -> Result<()> {
    let loader = loader(config);
    let (lookup, measure_info, manifest) = tokio::try_join!(
        load_dataset(&loader, dataset),
        async { loader.load_measure_info().await.context("loading measure info") },
        async { loader.load_manifest().await.context("loading datapackage") },
    )?;
    let registry = MeasureRegistry::from_value(&measure_info)?;
    let manifest: &Manifest = &manifest;

    let resolved = registry.resolve_variables(lookup.variable_names());
    for group in group_by_category(&resolved) {
        println!("{}", group.category);
        for v in group.variables {
            let levels = AvailableLevels::for_variable(Some(manifest), &v.name);
            let marks: Vec<&str> = Granularity::ALL
                .into_iter()
                .filter(|level| levels.get(*level))
                .map(|level| level.as_str())
                .collect();
            let suggestion = match levels.preferred(dataset) {
                Some(level) if level != dataset => format!(" (try {})", level),
                _ => String::new(),
            };
            println!("  {}\t{}\t[{}]{}", v.name, v.label, marks.join(","), suggestion);
        }
    }
    Ok(())
}
