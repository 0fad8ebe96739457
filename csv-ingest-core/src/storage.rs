//! Storage and query collaborator traits
//!
//! The ingestion pipeline never owns a connection. Callers pass an adapter
//! into each call, and the adapter decides how tables are laid out, how
//! writers are serialized and what query language it speaks.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::schema::TableSchema;
use crate::value::{NormalizedRow, Value};

/// Handle to a table created or opened by a [`StorageAdapter`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHandle {
    /// Table name
    name: String,

    /// Schema of the stored table; inserted rows are aligned to it
    schema: TableSchema,
}

impl TableHandle {
    /// Create a new table handle
    pub fn new(name: &str, schema: TableSchema) -> Self {
        Self {
            name: name.to_string(),
            schema,
        }
    }

    /// Table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stored schema
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }
}

/// Table creation and row insertion
pub trait StorageAdapter {
    /// Schema persisted for `name`, or `None` if no such table exists
    fn existing_schema(&self, name: &str) -> Result<Option<TableSchema>, StorageError>;

    /// Create `name` with `schema`, or open it if it exists.
    ///
    /// When the table exists, columns of `schema` that it lacks are added.
    /// Existing columns are left untouched.
    fn create_or_get_table(&mut self, name: &str, schema: &TableSchema) -> Result<TableHandle, StorageError>;

    /// Append rows aligned to `table.schema()`, returning how many were stored
    fn insert_rows(&mut self, table: &TableHandle, rows: Vec<NormalizedRow>) -> Result<usize, StorageError>;

    /// Open a unit of work.
    ///
    /// Every `create_or_get_table` and `insert_rows` call up to the matching
    /// [`commit`](StorageAdapter::commit) or [`rollback`](StorageAdapter::rollback)
    /// becomes visible together or not at all. Units of work do not nest.
    fn begin(&mut self) -> Result<(), StorageError>;

    /// Make the open unit of work permanent
    fn commit(&mut self) -> Result<(), StorageError>;

    /// Discard the open unit of work, including tables and columns it created
    fn rollback(&mut self) -> Result<(), StorageError>;
}

/// Result of a read query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Output column names
    pub columns: Vec<String>,

    /// Rows of values, aligned to `columns`
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Number of rows returned
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Read-only query execution.
///
/// Query text is passed through untouched. Any safety policy belongs to the
/// implementation.
pub trait QueryFacade {
    /// Run a read query
    fn execute_read(&self, query: &str) -> Result<QueryResult, StorageError>;

    /// Run a read query and hand its rows to `sink` in chunks of at most
    /// `chunk_size` rows, returning the total row count.
    ///
    /// Every chunk carries the column names. An error from `sink` stops the
    /// query and is returned. The default runs [`execute_read`] and splits the
    /// result; implementations that can stream should override it.
    ///
    /// [`execute_read`]: QueryFacade::execute_read
    fn execute_read_chunked(
        &self,
        query: &str,
        chunk_size: usize,
        sink: &mut dyn FnMut(QueryResult) -> Result<(), StorageError>,
    ) -> Result<u64, StorageError> {
        if chunk_size == 0 {
            return Err(StorageError::Query("chunk_size must be positive".to_string()));
        }
        let result = self.execute_read(query)?;
        let total = result.rows.len() as u64;
        let mut rows = result.rows.into_iter().peekable();
        while rows.peek().is_some() {
            sink(QueryResult {
                columns: result.columns.clone(),
                rows: rows.by_ref().take(chunk_size).collect(),
            })?;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(QueryResult);

    impl QueryFacade for Fixed {
        fn execute_read(&self, _query: &str) -> Result<QueryResult, StorageError> {
            Ok(self.0.clone())
        }
    }

    fn numbers(n: i64) -> Fixed {
        Fixed(QueryResult {
            columns: vec!["n".to_string()],
            rows: (0..n).map(|i| vec![Value::Integer(i)]).collect(),
        })
    }

    #[test]
    fn default_chunking_splits_rows() {
        let mut sizes = Vec::new();
        let total = numbers(5)
            .execute_read_chunked("q", 2, &mut |chunk| {
                assert_eq!(chunk.columns, vec!["n"]);
                sizes.push(chunk.row_count());
                Ok(())
            })
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn empty_result_sends_no_chunks() {
        let mut calls = 0;
        let total = numbers(0)
            .execute_read_chunked("q", 10, &mut |_| {
                calls += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!((total, calls), (0, 0));
    }

    #[test]
    fn sink_errors_stop_the_read() {
        let mut calls = 0;
        let result = numbers(6).execute_read_chunked("q", 2, &mut |_| {
            calls += 1;
            Err(StorageError::Query("stop".into()))
        });
        assert_eq!(result, Err(StorageError::Query("stop".into())));
        assert_eq!(calls, 1);
    }

    #[test]
    fn zero_chunk_size_is_refused() {
        assert!(numbers(1).execute_read_chunked("q", 0, &mut |_| Ok(())).is_err());
    }
}
