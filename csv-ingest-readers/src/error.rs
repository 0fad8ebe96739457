//! Error types for reading and ingesting CSV data

use csv_ingest_core::{DataType, StorageError};
use thiserror::Error;

/// Error type for CSV reading and ingestion
#[derive(Error, Debug)]
pub enum Error {
    /// Core library error
    #[error("Core error: {0}")]
    Core(#[from] csv_ingest_core::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV format error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Storage adapter error, propagated unchanged
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A row's field count does not match the header
    #[error("Malformed row {row} (line {line}): expected {expected} fields, found {found}")]
    MalformedRow {
        /// 1-based data row number
        row: u64,
        /// Line the record starts on
        line: u64,
        /// Expected field count
        expected: usize,
        /// Actual field count
        found: usize,
    },

    /// Re-ingestion into a table whose persisted schema is incompatible
    #[error("Schema conflict on column '{column}': table has {existing}, input has {incoming}")]
    SchemaConflict {
        /// Conflicting column
        column: String,
        /// Type in the persisted table
        existing: String,
        /// Type inferred from the input, or "missing"
        incoming: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Input has no header or rows to infer from
    #[error("Input is empty")]
    EmptyInput,
}

impl Error {
    /// Schema conflict between two column types
    pub fn type_conflict(column: &str, existing: DataType, incoming: DataType) -> Self {
        Error::SchemaConflict {
            column: column.to_string(),
            existing: existing.to_string(),
            incoming: incoming.to_string(),
        }
    }
}

/// Result type for CSV reading and ingestion
pub type Result<T> = std::result::Result<T, Error>;
