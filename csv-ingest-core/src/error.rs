//! Error types for schema handling and storage collaborators

use thiserror::Error;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for core schema operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Field lookup failed
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// Schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Row does not line up with the schema it is checked against
    #[error("Row has {found} values, schema has {expected} fields")]
    RowWidth {
        /// Number of fields in the schema
        expected: usize,
        /// Number of values in the row
        found: usize,
    },
}

/// Error raised by a storage adapter or query façade.
///
/// The ingestion pipeline propagates these unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The backing store could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// A constraint (key, not-null, type) was violated on write
    #[error("Constraint violation on table '{table}': {message}")]
    Constraint {
        /// Table being written
        table: String,
        /// Backend message
        message: String,
    },

    /// The named table does not exist
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// A read query failed
    #[error("Query failed: {0}")]
    Query(String),

    /// Catalog data could not be encoded or decoded
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Any other backend failure
    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Catalog(err.to_string())
    }
}
