//! CSV reading, type inference and ingestion
//!
//! This crate turns an arbitrary CSV stream into a typed table: it reads raw
//! rows, infers a [`TableSchema`] from a sample, checks it against any table
//! already persisted, coerces every row and hands batches to a
//! [`StorageAdapter`].
//!
//! ```no_run
//! use csv_ingest_readers::{CsvIngestor, IngestOptions, MemoryStorage};
//!
//! let ingestor = CsvIngestor::new(IngestOptions::default())?;
//! let mut storage = MemoryStorage::new();
//! let outcome = ingestor.ingest_path("orders", "orders.csv", &mut storage)?;
//! println!("{}", outcome.report);
//! # Ok::<(), csv_ingest_readers::Error>(())
//! ```

#![warn(missing_docs)]

mod error;

pub mod builder;
pub mod cell;
pub mod csv;
pub mod inference;
pub mod ingest;
pub mod normalizer;
pub mod options;

#[cfg(feature = "database")]
pub mod sqlite;

pub use builder::{sanitize_name, unique_names, IngestionPlan, SchemaBuilder};
pub use cell::CellParser;
pub use self::csv::{RawReader, RawRow};
pub use error::{Error, Result};
pub use inference::{ColumnProfile, ProfileBuilder, TypeInferencer};
pub use ingest::{
    quote_identifier, verify_queryable, CsvIngestor, IngestOutcome, SampleAnalysis, PREVIEW_ROWS,
};
pub use normalizer::{Normalizer, RowOutcome};
pub use options::{IngestOptions, KeyPolicy, MalformedRowPolicy, DEFAULT_TIMESTAMP_FORMATS};

#[cfg(feature = "database")]
pub use sqlite::SqliteStorage;

// Re-export core types
pub use csv_ingest_core::{
    DataType, Field, IngestReport, InferredType, MemoryStorage, NormalizedRow, QueryFacade,
    QueryResult, StorageAdapter, StorageError, TableHandle, TableSchema, Value,
};
