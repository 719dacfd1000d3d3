//! Long-format panel rows held in memory for one compaction pass
//!
//! The source is delimited text with an `ID` column, a `time` column and one
//! column per variable. Decompression happens upstream; this module only reads
//! already-decompressed text.

use super::dataset::META_KEY;
use super::error::{LookupError, Result};
use csv::{ReaderBuilder, Trim};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// Name of the region identifier column
pub const ID_COLUMN: &str = "ID";

/// Name of the time label column
pub const TIME_COLUMN: &str = "time";

/// One source row: region, raw time label, raw variable fields in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub id: String,
    pub time: String,
    pub values: Vec<String>,
}

impl RawRow {
    pub fn value(&self, variable_index: usize) -> &str {
        self.values
            .get(variable_index)
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// True when the region id collides with the artifact's metadata key
    pub fn has_reserved_id(&self) -> bool {
        strip_quotes(&self.id) == META_KEY
    }
}

/// All rows of one dataset plus the declared variable columns
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub variables: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RowSet {
    /// Build directly from parsed rows (rows supplied by an external parser)
    pub fn new(variables: Vec<String>, rows: Vec<RawRow>) -> Self {
        RowSet { variables, rows }
    }

    /// Read a delimited file from disk
    pub fn from_path(path: &Path, delimiter: u8) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| LookupError::io(path.display().to_string(), e))?;
        Self::from_reader(file, delimiter)
    }

    /// Read delimited text with a header row
    ///
    /// Stray quote characters around names and values are trimmed. Rows with
    /// fewer fields than the header are padded with empty (missing) fields.
    pub fn from_reader<R: Read>(reader: R, delimiter: u8) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| strip_quotes(h).to_string())
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(LookupError::EmptyHeader);
        }

        let mut seen = HashSet::new();
        for header in &headers {
            if !seen.insert(header.as_str()) {
                return Err(LookupError::DuplicateColumn(header.clone()));
            }
        }

        let id_idx = headers
            .iter()
            .position(|h| h == ID_COLUMN)
            .ok_or_else(|| LookupError::MissingColumn(ID_COLUMN.to_string()))?;
        let time_idx = headers
            .iter()
            .position(|h| h == TIME_COLUMN)
            .ok_or_else(|| LookupError::MissingColumn(TIME_COLUMN.to_string()))?;

        let variable_columns: Vec<usize> = (0..headers.len())
            .filter(|i| *i != id_idx && *i != time_idx)
            .collect();
        let variables: Vec<String> = variable_columns
            .iter()
            .map(|i| headers[*i].clone())
            .collect();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            // Skip blank lines
            if record.iter().all(|f| f.is_empty()) {
                continue;
            }
            let field = |i: usize| strip_quotes(record.get(i).unwrap_or("")).to_string();
            rows.push(RawRow {
                id: field(id_idx),
                time: field(time_idx),
                values: variable_columns.iter().map(|i| field(*i)).collect(),
            });
        }

        tracing::debug!(
            "Parsed {} rows with {} variable columns",
            rows.len(),
            variables.len()
        );

        Ok(RowSet { variables, rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Remove one layer of surrounding double quotes
pub fn strip_quotes(s: &str) -> &str {
    let s = s.strip_prefix('"').unwrap_or(s);
    s.strip_suffix('"').unwrap_or(s)
}
