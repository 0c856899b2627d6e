//! Error types for the evaluation pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that can occur in the evaluation pipeline.
///
/// Only configuration and I/O problems are surfaced through this type.
/// Per-row failures (a backend call that errored, an embedding that came back
/// non-finite) are recorded in the output rows instead.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The prompt template file does not exist.
    #[error("Prompt file not found at '{0}'")]
    PromptNotFound(PathBuf),

    /// The question source (database or CSV file) does not exist.
    #[error("Question source not found at '{0}'")]
    SourceNotFound(PathBuf),

    /// A `--range` argument that could not be parsed or is out of order.
    #[error("Invalid range '{input}': {reason}")]
    InvalidRange { input: String, reason: String },

    /// A required column is absent from a tabular source.
    #[error("Column '{column}' not found in {source_name}")]
    MissingColumn { column: String, source_name: String },

    /// Tabular file error.
    #[error("CSV error: {0}")]
    Csv(String),

    /// Relational question store error.
    #[error("Database error: {0}")]
    Database(String),

    /// Inference backend error.
    #[error("Backend error: {0}")]
    Backend(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Embedding model error.
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EvalError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a missing column error.
    pub fn missing_column(column: impl Into<String>, source_name: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
            source_name: source_name.into(),
        }
    }

    /// Create an invalid range error.
    pub fn invalid_range(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRange {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

impl From<reqwest::Error> for EvalError {
    fn from(err: reqwest::Error) -> Self {
        EvalError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::Serialization(err.to_string())
    }
}

impl From<csv::Error> for EvalError {
    fn from(err: csv::Error) -> Self {
        EvalError::Csv(err.to_string())
    }
}

impl From<rusqlite::Error> for EvalError {
    fn from(err: rusqlite::Error) -> Self {
        EvalError::Database(err.to_string())
    }
}
