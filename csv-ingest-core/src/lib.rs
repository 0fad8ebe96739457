//! Core types for CSV structure inference and ingestion
//!
//! This crate holds the data model shared by the readers and the storage
//! adapters: semantic column types, table schemas, typed values, the
//! storage/query collaborator traits and the ingestion report.

#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod report;
pub mod schema;
pub mod storage;
pub mod value;

// Re-export key types for convenience
pub use error::{Error, Result, StorageError};
pub use memory::MemoryStorage;
pub use report::{CoercionError, CoercionFailure, IngestReport, RejectedRow};
pub use schema::{compare_schemas, DataType, Field, InferredType, SchemaComparison, TableSchema, TypeChange};
pub use storage::{QueryFacade, QueryResult, StorageAdapter, TableHandle};
pub use value::{NormalizedRow, Value};
