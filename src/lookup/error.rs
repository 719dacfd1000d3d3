use thiserror::Error;

/// Errors raised while reading source rows or reading/writing lookup artifacts
#[derive(Debug, Error)]
pub enum LookupError {
    /// Source file missing or unreadable
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Delimited text could not be parsed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Artifact JSON could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Header row is empty or the source has no rows at all
    #[error("Source has an empty header row")]
    EmptyHeader,

    /// A required column (`ID` or `time`) is absent
    #[error("Source is missing required column '{0}'")]
    MissingColumn(String),

    /// The same column name appears twice after quote trimming
    #[error("Source declares column '{0}' more than once")]
    DuplicateColumn(String),

    /// A compact identifier did not match `X<n>`
    #[error("Invalid compact id '{0}'")]
    InvalidCode(String),

    /// A measure-info template could not be compiled into a name pattern
    #[error("Invalid measure template: {0}")]
    Pattern(#[from] regex::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl LookupError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        LookupError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Type alias for Results using LookupError
pub type Result<T> = std::result::Result<T, LookupError>;
