//! Re-pivot a compacted lookup into delimited text for download
//!
//! Layouts:
//! - `Tall`: one row per region, time and variable
//! - `Wide`: one row per region, one column per variable and year
//! - `Mixed`: one row per region, one column per variable holding its latest value
//!
//! Missing values are written as empty fields.

use crate::lookup::dataset::DatasetLookup;
use crate::lookup::error::{LookupError, Result};
use crate::lookup::value::{Cell, StoredValue};
use csv::{Terminator, WriterBuilder};

/// Region id column header
pub const GEOID_COLUMN: &str = "geoid";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TableFormat {
    #[default]
    Tall,
    Wide,
    Mixed,
}

impl TableFormat {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "wide" => Self::Wide,
            "mixed" => Self::Mixed,
            _ => Self::Tall,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Separator {
    #[default]
    Comma,
    Tab,
}

impl Separator {
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "tsv" | "tab" => Self::Tab,
            _ => Self::Comma,
        }
    }

    pub fn byte(&self) -> u8 {
        match self {
            Separator::Comma => b',',
            Separator::Tab => b'\t',
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Separator::Comma => "csv",
            Separator::Tab => "tsv",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Separator::Comma => "text/csv",
            Separator::Tab => "text/tab-separated-values",
        }
    }
}

/// `<prefix>_<granularity>_<variable|all>.<ext>`
pub fn export_file_name(
    prefix: &str,
    granularity: &str,
    variable: Option<&str>,
    separator: Separator,
) -> String {
    let variable = variable.filter(|v| !v.is_empty()).unwrap_or("all");
    format!(
        "{}_{}_{}.{}",
        prefix,
        granularity,
        variable,
        separator.extension()
    )
}

/// Render the selected variables (all of them when `include` is empty)
pub fn generate_export(
    dataset: &DatasetLookup,
    include: &[String],
    format: TableFormat,
    separator: Separator,
) -> Result<String> {
    let variables: Vec<&str> = if include.is_empty() {
        dataset.variable_names().collect()
    } else {
        include.iter().map(|s| s.as_str()).collect()
    };

    let mut writer = WriterBuilder::new()
        .delimiter(separator.byte())
        .terminator(Terminator::Any(b'\n'))
        .flexible(false)
        .from_writer(Vec::new());

    match format {
        TableFormat::Tall => write_tall(&mut writer, dataset, &variables)?,
        TableFormat::Wide => write_wide(&mut writer, dataset, &variables)?,
        TableFormat::Mixed => write_mixed(&mut writer, dataset, &variables)?,
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| LookupError::io("export buffer", e.into_error()))?;
    String::from_utf8(bytes).map_err(|e| LookupError::Other(e.to_string()))
}

type Writer = csv::Writer<Vec<u8>>;

fn write_tall(writer: &mut Writer, dataset: &DatasetLookup, variables: &[&str]) -> Result<()> {
    writer.write_record([GEOID_COLUMN, "time", "variable", "value"])?;
    for (region_id, record) in &dataset.regions {
        for name in variables {
            let Some(descriptor) = dataset.variable(name) else {
                continue;
            };
            let (Some(envelope), Some(stored)) = (descriptor.envelope, record.get(&descriptor.code))
            else {
                continue;
            };
            for (i, cell) in stored.cells().enumerate() {
                let year = dataset
                    .time()
                    .label(envelope.start + i)
                    .map(|t| t.to_string())
                    .unwrap_or_default();
                let value = cell.to_field();
                writer.write_record([region_id.as_str(), year.as_str(), *name, value.as_str()])?;
            }
        }
    }
    Ok(())
}

fn write_wide(writer: &mut Writer, dataset: &DatasetLookup, variables: &[&str]) -> Result<()> {
    // (code, position within the stored series) per output column
    let mut columns = Vec::new();
    let mut header = vec![GEOID_COLUMN.to_string()];
    for name in variables {
        let Some(descriptor) = dataset.variable(name) else {
            continue;
        };
        let Some(envelope) = descriptor.envelope else {
            continue;
        };
        for offset in envelope.start..=envelope.end {
            let year = dataset
                .time()
                .label(offset)
                .map(|t| t.to_string())
                .unwrap_or_default();
            header.push(format!("{}_{}", name, year));
            columns.push((descriptor.code, offset - envelope.start));
        }
    }
    writer.write_record(&header)?;

    for (region_id, record) in &dataset.regions {
        let mut row = Vec::with_capacity(columns.len() + 1);
        row.push(region_id.clone());
        for (code, index) in &columns {
            let field = record
                .get(code)
                .and_then(|stored| stored.get(*index))
                .map(Cell::to_field)
                .unwrap_or_default();
            row.push(field);
        }
        writer.write_record(&row)?;
    }
    Ok(())
}

fn write_mixed(writer: &mut Writer, dataset: &DatasetLookup, variables: &[&str]) -> Result<()> {
    let mut header = vec![GEOID_COLUMN];
    header.extend(variables.iter().copied());
    writer.write_record(&header)?;

    for (region_id, record) in &dataset.regions {
        let mut row = Vec::with_capacity(variables.len() + 1);
        row.push(region_id.clone());
        for name in variables {
            let field = dataset
                .variable(name)
                .and_then(|d| record.get(&d.code))
                .and_then(StoredValue::last)
                .map(Cell::to_field)
                .unwrap_or_default();
            row.push(field);
        }
        writer.write_record(&row)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::codes::CodeRegistry;
    use crate::lookup::compactor::build_lookup;
    use crate::lookup::rows::RowSet;
    use std::collections::BTreeMap;

    fn sample() -> DatasetLookup {
        let text = "ID,time,rate,latest,kind\n\
                    51001,2019,1.5,,rural\n\
                    51001,2020,NA,,\n\
                    51001,2021,2,7,\n\
                    51003,2020,3,,\"a, b\"\n";
        let rows = RowSet::from_reader(text.as_bytes(), b',').unwrap();
        build_lookup(&rows, &mut CodeRegistry::new())
    }

    #[test]
    fn test_tall() {
        let out = generate_export(
            &sample(),
            &["rate".to_string(), "latest".to_string()],
            TableFormat::Tall,
            Separator::Comma,
        )
        .unwrap();
        assert_eq!(
            out,
            "geoid,time,variable,value\n\
             51001,2019,rate,1.5\n\
             51001,2020,rate,\n\
             51001,2021,rate,2\n\
             51001,2021,latest,7\n\
             51003,2019,rate,\n\
             51003,2020,rate,3\n\
             51003,2021,rate,\n"
        );
    }

    #[test]
    fn test_tall_reaggregates_stored_values() {
        let lookup = sample();
        let out = generate_export(&lookup, &[], TableFormat::Tall, Separator::Tab).unwrap();
        let rows = RowSet::from_reader(
            out.replace("geoid", "ID").replace("\tvariable\t", "\tname\t").as_bytes(),
            b'\t',
        )
        .unwrap();

        // (region, variable, time) → raw value, non-missing only
        let mut exported = BTreeMap::new();
        for row in &rows.rows {
            if !row.value(1).is_empty() {
                exported.insert(
                    (row.id.clone(), row.value(0).to_string(), row.time.clone()),
                    row.value(1).to_string(),
                );
            }
        }

        let mut stored = BTreeMap::new();
        for (region, record) in &lookup.regions {
            for (name, descriptor) in &lookup.meta.variables {
                let (Some(envelope), Some(value)) = (descriptor.envelope, record.get(&descriptor.code))
                else {
                    continue;
                };
                for (i, cell) in value.cells().enumerate() {
                    if cell.is_present() {
                        let year = lookup.time().label(envelope.start + i).unwrap();
                        stored.insert(
                            (region.clone(), name.clone(), year.to_string()),
                            cell.to_field(),
                        );
                    }
                }
            }
        }
        assert_eq!(exported, stored);
        assert_eq!(
            exported.get(&("51003".to_string(), "kind".to_string(), "2020".to_string())),
            Some(&"a, b".to_string())
        );
    }

    #[test]
    fn test_wide() {
        let out = generate_export(
            &sample(),
            &["rate".to_string(), "latest".to_string(), "nope".to_string()],
            TableFormat::Wide,
            Separator::Comma,
        )
        .unwrap();
        assert_eq!(
            out,
            "geoid,rate_2019,rate_2020,rate_2021,latest_2021\n\
             51001,1.5,,2,7\n\
             51003,,3,,\n"
        );
    }

    #[test]
    fn test_mixed_quotes_when_needed() {
        let out = generate_export(&sample(), &[], TableFormat::Mixed, Separator::Comma).unwrap();
        assert_eq!(
            out,
            "geoid,rate,latest,kind\n\
             51001,2,7,\n\
             51003,,,\"a, b\"\n"
        );
    }

    #[test]
    fn test_file_names() {
        assert_eq!(
            export_file_name("vdh", "county", Some("rate"), Separator::Comma),
            "vdh_county_rate.csv"
        );
        assert_eq!(
            export_file_name("vdh", "tract", None, Separator::Tab),
            "vdh_tract_all.tsv"
        );
        assert_eq!(Separator::Tab.content_type(), "text/tab-separated-values");
        assert_eq!(TableFormat::parse("WIDE"), TableFormat::Wide);
    }
}
