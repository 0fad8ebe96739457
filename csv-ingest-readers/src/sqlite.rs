//! SQLite storage adapter and query facade
//!
//! Tables are created from the inferred schema and every table's schema is kept
//! as JSON in the `_csv_ingest_schemas` catalog, so re-ingestion compares
//! against exactly what was persisted. Table names are matched without regard
//! to case, as SQLite itself does. The adapter is synchronous and drives `sqlx`
//! on its own single-threaded runtime.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDateTime;
use csv_ingest_core::{
    DataType, Field, NormalizedRow, QueryFacade, QueryResult, StorageAdapter, StorageError,
    TableHandle, TableSchema, Value,
};
use futures::TryStreamExt;
use sqlx::error::ErrorKind;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions,
    SqliteRow, SqliteSynchronous,
};
use sqlx::{Column, Executor, Row, Sqlite, Transaction};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info, warn};

use crate::ingest::quote_identifier;

const CATALOG_TABLE: &str = "_csv_ingest_schemas";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// SQLite-backed [`StorageAdapter`] and [`QueryFacade`].
///
/// Writes go through one pool. Facade queries run on a second pool whose
/// connections have `query_only` set, so nothing sent through
/// [`QueryFacade`] can change the database.
pub struct SqliteStorage {
    pool: SqlitePool,
    read_pool: SqlitePool,
    unit: Option<Transaction<'static, Sqlite>>,
    runtime: Runtime,
}

impl SqliteStorage {
    /// Open (or create) a database file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool_options = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(5));
        Self::connect(options, pool_options)
    }

    /// Private in-memory database, dropped with the adapter
    pub fn in_memory() -> Result<Self, StorageError> {
        // Named shared-cache database, reachable from both pools
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection(format!("Failed to parse database URL: {}", e)))?;

        // The database lives as long as one connection stays open
        let pool_options = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
        Self::connect(options, pool_options)
    }

    fn connect(options: SqliteConnectOptions, pool_options: SqlitePoolOptions) -> Result<Self, StorageError> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StorageError::Connection(format!("Failed to start runtime: {}", e)))?;

        let pool = runtime
            .block_on(pool_options.clone().connect_with(options.clone()))
            .map_err(|e| StorageError::Connection(format!("Failed to connect: {}", e)))?;
        init_catalog(&runtime, &pool)?;

        let read_pool = runtime
            .block_on(pool_options.connect_with(options.pragma("query_only", "ON")))
            .map_err(|e| StorageError::Connection(format!("Failed to connect reader: {}", e)))?;

        Ok(Self {
            pool,
            read_pool,
            unit: None,
            runtime,
        })
    }

    /// Rows currently stored in `table`
    pub fn row_count(&self, table: &str) -> Result<u64, StorageError> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table));
        let count: i64 = self
            .runtime
            .block_on(sqlx::query_scalar(&sql).fetch_one(&self.read_pool))
            .map_err(|e| map_error(table, e))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Names of the tables recorded in the catalog
    pub fn table_names(&self) -> Result<Vec<String>, StorageError> {
        let sql = format!("SELECT table_name FROM {} ORDER BY table_name", CATALOG_TABLE);
        self.runtime
            .block_on(sqlx::query_scalar(&sql).fetch_all(&self.read_pool))
            .map_err(|e| StorageError::Catalog(e.to_string()))
    }
}

impl StorageAdapter for SqliteStorage {
    /// Committed schema for `name`.
    ///
    /// A table that exists in the database but not in the catalog is an error,
    /// since its layout is unknown.
    fn existing_schema(&self, name: &str) -> Result<Option<TableSchema>, StorageError> {
        self.runtime.block_on(async {
            let mut conn = self.read_pool.acquire().await.map_err(|e| map_error(name, e))?;
            load_schema(&mut conn, name).await
        })
    }

    fn create_or_get_table(&mut self, name: &str, schema: &TableSchema) -> Result<TableHandle, StorageError> {
        let Self { runtime, pool, unit, .. } = self;
        runtime.block_on(async {
            match unit.as_mut() {
                Some(tx) => create_or_extend(tx, name, schema).await,
                None => {
                    let mut tx = pool.begin().await.map_err(|e| map_error(name, e))?;
                    let handle = create_or_extend(&mut tx, name, schema).await?;
                    tx.commit().await.map_err(|e| map_error(name, e))?;
                    Ok::<_, StorageError>(handle)
                }
            }
        })
    }

    fn insert_rows(&mut self, table: &TableHandle, rows: Vec<NormalizedRow>) -> Result<usize, StorageError> {
        if rows.is_empty() {
            return Ok(0);
        }
        let schema = table.schema();
        for row in &rows {
            row.conforms_to(schema).map_err(|e| StorageError::Constraint {
                table: table.name().to_string(),
                message: format!("row {}: {}", row.row_number(), e),
            })?;
        }

        let sql = insert_sql(table.name(), schema);
        let count = rows.len();

        let Self { runtime, pool, unit, .. } = self;
        runtime.block_on(async {
            match unit.as_mut() {
                Some(tx) => insert_all(tx, table.name(), &sql, rows).await,
                None => {
                    let mut tx = pool.begin().await.map_err(|e| map_error(table.name(), e))?;
                    insert_all(&mut tx, table.name(), &sql, rows).await?;
                    tx.commit().await.map_err(|e| map_error(table.name(), e))
                }
            }
        })?;

        debug!(table = table.name(), rows = count, "Wrote SQLite batch");
        Ok(count)
    }

    fn begin(&mut self) -> Result<(), StorageError> {
        if self.unit.is_some() {
            return Err(StorageError::Backend("A unit of work is already open".to_string()));
        }
        let tx = self
            .runtime
            .block_on(self.pool.begin())
            .map_err(|e| map_error("", e))?;
        self.unit = Some(tx);
        debug!("Opened SQLite unit of work");
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        let tx = self
            .unit
            .take()
            .ok_or_else(|| StorageError::Backend("No unit of work to commit".to_string()))?;
        self.runtime.block_on(tx.commit()).map_err(|e| map_error("", e))?;
        debug!("Committed SQLite unit of work");
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        let tx = self
            .unit
            .take()
            .ok_or_else(|| StorageError::Backend("No unit of work to roll back".to_string()))?;
        self.runtime.block_on(tx.rollback()).map_err(|e| map_error("", e))?;
        debug!("Rolled back SQLite unit of work");
        Ok(())
    }
}

impl Drop for SqliteStorage {
    fn drop(&mut self) {
        if let Some(tx) = self.unit.take() {
            warn!("Rolling back unit of work left open");
            if let Err(e) = self.runtime.block_on(tx.rollback()) {
                warn!(error = %e, "Rollback failed");
            }
        }
    }
}

impl QueryFacade for SqliteStorage {
    fn execute_read(&self, query: &str) -> Result<QueryResult, StorageError> {
        self.runtime.block_on(async {
            let rows = sqlx::query(query)
                .fetch_all(&self.read_pool)
                .await
                .map_err(|e| map_error("", e))?;

            let columns = match rows.first() {
                Some(row) => column_names(row),
                None => self
                    .read_pool
                    .describe(query)
                    .await
                    .map_err(|e| map_error("", e))?
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect(),
            };

            let rows = rows.iter().map(read_row).collect();
            Ok::<_, StorageError>(QueryResult { columns, rows })
        })
    }

    /// Streams rows from SQLite; at most one chunk is held in memory
    fn execute_read_chunked(
        &self,
        query: &str,
        chunk_size: usize,
        sink: &mut dyn FnMut(QueryResult) -> Result<(), StorageError>,
    ) -> Result<u64, StorageError> {
        if chunk_size == 0 {
            return Err(StorageError::Query("chunk_size must be positive".to_string()));
        }

        self.runtime.block_on(async {
            let mut stream = sqlx::query(query).fetch(&self.read_pool);
            let mut chunk = QueryResult::default();
            let mut total: u64 = 0;

            while let Some(row) = stream.try_next().await.map_err(|e| map_error("", e))? {
                if chunk.columns.is_empty() {
                    chunk.columns = column_names(&row);
                }
                chunk.rows.push(read_row(&row));
                total += 1;

                if chunk.rows.len() == chunk_size {
                    let next = QueryResult {
                        columns: chunk.columns.clone(),
                        rows: Vec::new(),
                    };
                    sink(std::mem::replace(&mut chunk, next))?;
                }
            }
            if !chunk.rows.is_empty() {
                sink(chunk)?;
            }

            debug!(rows = total, chunk_size, "Streamed query");
            Ok::<_, StorageError>(total)
        })
    }
}

/// SQLite column type for a semantic type
pub fn column_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Integer | DataType::Boolean => "INTEGER",
        DataType::Float => "REAL",
        DataType::Timestamp | DataType::Text => "TEXT",
    }
}

fn init_catalog(runtime: &Runtime, pool: &SqlitePool) -> Result<(), StorageError> {
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (table_name TEXT PRIMARY KEY COLLATE NOCASE, schema_json TEXT NOT NULL)",
        CATALOG_TABLE
    );
    runtime
        .block_on(sqlx::query(&sql).execute(pool))
        .map_err(|e| StorageError::Catalog(format!("Failed to create catalog: {}", e)))?;
    Ok(())
}

async fn load_schema(conn: &mut SqliteConnection, name: &str) -> Result<Option<TableSchema>, StorageError> {
    let sql = format!(
        "SELECT schema_json FROM {} WHERE table_name = ? COLLATE NOCASE",
        CATALOG_TABLE
    );
    let json: Option<String> = sqlx::query_scalar(&sql)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| StorageError::Catalog(e.to_string()))?;
    if let Some(json) = json {
        return Ok(Some(TableSchema::from_json(&json)?));
    }

    let unmanaged: Option<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') AND name = ? COLLATE NOCASE",
    )
    .bind(name)
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| map_error(name, e))?;

    match unmanaged {
        Some(existing) => Err(StorageError::Catalog(format!(
            "Table '{}' exists but has no recorded schema",
            existing
        ))),
        None => Ok(None),
    }
}

async fn create_or_extend(
    conn: &mut SqliteConnection,
    name: &str,
    schema: &TableSchema,
) -> Result<TableHandle, StorageError> {
    let (stored, statements) = match load_schema(conn, name).await? {
        None => {
            info!(table = name, columns = schema.len(), "Creating SQLite table");
            (schema.clone(), vec![create_table_sql(name, schema)])
        }
        Some(existing) => {
            let extra: Vec<Field> = schema
                .fields()
                .iter()
                .filter(|f| !existing.contains(&f.name))
                .cloned()
                .collect();
            if extra.is_empty() {
                return Ok(TableHandle::new(name, existing));
            }

            info!(table = name, added = extra.len(), "Adding columns to SQLite table");
            let stored = existing
                .appended(&extra)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let statements = extra
                .iter()
                .map(|f| {
                    format!(
                        "ALTER TABLE {} ADD COLUMN {} {}",
                        quote_identifier(name),
                        quote_identifier(&f.name),
                        column_type(f.data_type)
                    )
                })
                .collect();
            (stored, statements)
        }
    };

    for statement in &statements {
        debug!(table = name, sql = %statement, "Applying DDL");
        sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_error(name, e))?;
    }

    let upsert = format!(
        "INSERT INTO {} (table_name, schema_json) VALUES (?, ?) \
         ON CONFLICT(table_name) DO UPDATE SET schema_json = excluded.schema_json",
        CATALOG_TABLE
    );
    sqlx::query(&upsert)
        .bind(name)
        .bind(stored.to_json()?)
        .execute(&mut *conn)
        .await
        .map_err(|e| StorageError::Catalog(e.to_string()))?;

    Ok(TableHandle::new(name, stored))
}

async fn insert_all(
    conn: &mut SqliteConnection,
    table: &str,
    sql: &str,
    rows: Vec<NormalizedRow>,
) -> Result<(), StorageError> {
    for row in rows {
        let mut query = sqlx::query(sql);
        for value in row.into_values() {
            query = match value {
                Value::Null => query.bind(Option::<String>::None),
                Value::Boolean(b) => query.bind(i64::from(b)),
                Value::Integer(i) => query.bind(i),
                Value::Float(f) => query.bind(f),
                Value::Timestamp(ts) => query.bind(ts.format(TIMESTAMP_FORMAT).to_string()),
                Value::Text(s) => query.bind(s),
            };
        }
        query.execute(&mut *conn).await.map_err(|e| map_error(table, e))?;
    }
    Ok(())
}

fn create_table_sql(name: &str, schema: &TableSchema) -> String {
    let columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| {
            let mut column = format!("{} {}", quote_identifier(&f.name), column_type(f.data_type));
            if !f.nullable {
                column.push_str(" NOT NULL");
            }
            if schema.primary_key() == Some(f.name.as_str()) {
                column.push_str(" PRIMARY KEY");
            }
            column
        })
        .collect();
    format!("CREATE TABLE {} ({})", quote_identifier(name), columns.join(", "))
}

fn insert_sql(name: &str, schema: &TableSchema) -> String {
    let columns: Vec<String> = schema.names().map(quote_identifier).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(name),
        columns.join(", "),
        placeholders
    )
}

fn column_names(row: &SqliteRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

fn read_row(row: &SqliteRow) -> Vec<Value> {
    (0..row.len()).map(|i| read_value(row, i)).collect()
}

fn read_value(row: &SqliteRow, index: usize) -> Value {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return v.map_or(Value::Null, Value::Integer);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return v.map_or(Value::Null, Value::Float);
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return v.map_or(Value::Null, Value::Text);
    }
    match row.try_get::<Option<Vec<u8>>, _>(index) {
        Ok(Some(bytes)) => Value::Text(String::from_utf8_lossy(&bytes).into_owned()),
        _ => Value::Null,
    }
}

/// Parse a timestamp as written by this adapter
pub fn parse_stored_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).ok()
}

fn map_error(table: &str, error: sqlx::Error) -> StorageError {
    match error {
        sqlx::Error::Database(db) => match db.kind() {
            ErrorKind::UniqueViolation
            | ErrorKind::ForeignKeyViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation => StorageError::Constraint {
                table: table.to_string(),
                message: db.message().to_string(),
            },
            _ if db.message().starts_with("no such table") => StorageError::TableNotFound(
                db.message().trim_start_matches("no such table: ").to_string(),
            ),
            _ => StorageError::Query(db.message().to_string()),
        },
        e @ (sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed) => {
            StorageError::Connection(e.to_string())
        }
        e => StorageError::Backend(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{verify_queryable, CsvIngestor};
    use crate::options::IngestOptions;
    use std::io::Cursor;

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            Field::new("id", DataType::Integer, false),
            Field::new("ok", DataType::Boolean, true),
            Field::new("score", DataType::Float, true),
            Field::new("at", DataType::Timestamp, true),
            Field::new("name", DataType::Text, true),
        ])
        .unwrap()
        .with_primary_key("id")
        .unwrap()
    }

    fn row(n: u64, id: i64) -> NormalizedRow {
        let at = NaiveDateTime::parse_from_str("2024-02-03 04:05:06", "%Y-%m-%d %H:%M:%S").unwrap();
        NormalizedRow::new(
            n,
            vec![
                Value::Integer(id),
                Value::Boolean(true),
                Value::Float(2.5),
                Value::Timestamp(at),
                Value::Null,
            ],
        )
    }

    #[test]
    fn create_insert_and_read_back() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        assert!(storage.existing_schema("t").unwrap().is_none());

        let handle = storage.create_or_get_table("t", &schema()).unwrap();
        assert_eq!(storage.insert_rows(&handle, vec![row(1, 1), row(2, 2)]).unwrap(), 2);
        assert_eq!(storage.row_count("t").unwrap(), 2);
        assert_eq!(storage.existing_schema("t").unwrap(), Some(schema()));
        assert_eq!(storage.table_names().unwrap(), vec!["t".to_string()]);

        let result = storage
            .execute_read(r#"SELECT "id", "ok", "score", "at", "name" FROM "t" ORDER BY "id""#)
            .unwrap();
        assert_eq!(result.columns, vec!["id", "ok", "score", "at", "name"]);
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.rows[0][0], Value::Integer(1));
        assert_eq!(result.rows[0][1], Value::Integer(1));
        assert_eq!(result.rows[0][2], Value::Float(2.5));
        assert_eq!(result.rows[0][3], Value::Text("2024-02-03 04:05:06".into()));
        assert_eq!(result.rows[0][4], Value::Null);
        assert!(parse_stored_timestamp("2024-02-03 04:05:06").is_some());
    }

    #[test]
    fn duplicate_key_is_a_constraint_error_and_rolls_back() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        let handle = storage.create_or_get_table("t", &schema()).unwrap();
        let result = storage.insert_rows(&handle, vec![row(1, 1), row(2, 1)]);
        assert!(matches!(result, Err(StorageError::Constraint { .. })));
        assert_eq!(storage.row_count("t").unwrap(), 0);
    }

    #[test]
    fn new_columns_are_added() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        let handle = storage.create_or_get_table("t", &schema()).unwrap();
        storage.insert_rows(&handle, vec![row(1, 1)]).unwrap();

        let wider = schema().appended(&[Field::new("extra", DataType::Text, false)]).unwrap();
        let handle = storage.create_or_get_table("t", &wider).unwrap();
        assert_eq!(handle.schema().len(), 6);
        assert!(handle.schema().field(5).nullable);

        let result = storage.execute_read(r#"SELECT "extra" FROM "t""#).unwrap();
        assert_eq!(result.rows, vec![vec![Value::Null]]);
    }

    fn ingest(storage: &mut SqliteStorage, table: &str, data: &str) -> crate::Result<crate::IngestOutcome> {
        CsvIngestor::new(IngestOptions::default())
            .unwrap()
            .ingest(table, Cursor::new(data.to_string()), storage)
    }

    #[test]
    fn write_queries_are_refused() {
        let storage = SqliteStorage::in_memory().unwrap();
        assert!(matches!(
            storage.execute_read("DROP TABLE _csv_ingest_schemas"),
            Err(StorageError::Query(_))
        ));
    }

    #[test]
    fn writes_hidden_behind_reads_are_refused() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        ingest(&mut storage, "t", "id\n5\n6\n").unwrap();

        assert!(storage.execute_read(r#"SELECT 1; DROP TABLE "t""#).is_err());
        assert!(storage.execute_read(r#"WITH x AS (SELECT 1) DELETE FROM "t""#).is_err());
        assert!(storage
            .execute_read_chunked(r#"SELECT 1; DELETE FROM "t""#, 10, &mut |_| Ok(()))
            .is_err());
        assert_eq!(storage.row_count("t").unwrap(), 2);
        assert_eq!(storage.table_names().unwrap(), vec!["t".to_string()]);
    }

    #[test]
    fn table_names_are_matched_without_case() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        let first = ingest(&mut storage, "t", "id\n5\n").unwrap();
        assert_eq!(storage.existing_schema("T").unwrap(), Some(first.schema.clone()));

        let result = ingest(&mut storage, "T", "id\n1.5\n");
        assert!(matches!(result, Err(crate::Error::SchemaConflict { ref column, .. }) if column == "id"));
        assert_eq!(storage.table_names().unwrap(), vec!["t".to_string()]);
        assert_eq!(storage.row_count("t").unwrap(), 1);

        let outcome = ingest(&mut storage, "T", "id,note\n7,x\n").unwrap();
        assert_eq!(outcome.schema.len(), 2);
        assert_eq!(storage.table_names().unwrap(), vec!["t".to_string()]);
        assert_eq!(storage.existing_schema("t").unwrap(), Some(outcome.schema));
        assert_eq!(storage.row_count("t").unwrap(), 2);
    }

    #[test]
    fn table_without_catalog_entry_is_refused() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage
            .runtime
            .block_on(sqlx::query(r#"CREATE TABLE "Loose" (x TEXT)"#).execute(&storage.pool))
            .unwrap();

        assert!(matches!(storage.existing_schema("loose"), Err(StorageError::Catalog(_))));
        let result = ingest(&mut storage, "loose", "x\nabc\n");
        assert!(matches!(result, Err(crate::Error::Storage(StorageError::Catalog(_)))));
        assert!(storage.table_names().unwrap().is_empty());
    }

    #[test]
    fn rollback_discards_tables_and_rows() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.begin().unwrap();
        assert!(matches!(storage.begin(), Err(StorageError::Backend(_))));
        let handle = storage.create_or_get_table("t", &schema()).unwrap();
        storage.insert_rows(&handle, vec![row(1, 1)]).unwrap();
        storage.rollback().unwrap();

        assert!(storage.existing_schema("t").unwrap().is_none());
        assert!(matches!(storage.row_count("t"), Err(StorageError::TableNotFound(_))));
        assert!(storage.commit().is_err());
    }

    #[test]
    fn failed_ingestion_leaves_no_rows() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        ingest(&mut storage, "t", "a,b\n10,20\n").unwrap();

        let options = IngestOptions::default().with_sample_size(1).with_batch_size(1);
        let result = CsvIngestor::new(options).unwrap().ingest(
            "t",
            Cursor::new("a,b,c\n30,40,x\n50,60,y\n70\n"),
            &mut storage,
        );
        assert!(matches!(result, Err(crate::Error::MalformedRow { row: 3, .. })));
        assert_eq!(storage.row_count("t").unwrap(), 1);
        assert_eq!(storage.existing_schema("t").unwrap().unwrap().len(), 2);
        assert!(storage.execute_read(r#"SELECT "c" FROM "t""#).is_err());
    }

    #[test]
    fn chunked_read_streams_rows() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        let handle = storage.create_or_get_table("t", &schema()).unwrap();
        let rows = (1..=5).map(|id| row(id as u64, id)).collect();
        storage.insert_rows(&handle, rows).unwrap();

        let mut chunks = Vec::new();
        let total = storage
            .execute_read_chunked(r#"SELECT "id" FROM "t" ORDER BY "id""#, 2, &mut |chunk| {
                chunks.push(chunk);
                Ok(())
            })
            .unwrap();

        assert_eq!(total, 5);
        assert_eq!(chunks.iter().map(QueryResult::row_count).collect::<Vec<_>>(), vec![2, 2, 1]);
        assert!(chunks.iter().all(|c| c.columns == vec!["id"]));
        assert_eq!(chunks[2].rows, vec![vec![Value::Integer(5)]]);
    }

    #[test]
    fn chunked_read_stops_on_sink_error() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        let handle = storage.create_or_get_table("t", &schema()).unwrap();
        storage.insert_rows(&handle, vec![row(1, 1), row(2, 2)]).unwrap();

        let mut calls = 0;
        let result = storage.execute_read_chunked(r#"SELECT "id" FROM "t""#, 1, &mut |_| {
            calls += 1;
            Err(StorageError::Query("enough".into()))
        });
        assert_eq!(result, Err(StorageError::Query("enough".into())));
        assert_eq!(calls, 1);
    }

    #[test]
    fn path_with_url_characters_opens_that_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("odd?name#with%20.db");
        {
            let mut storage = SqliteStorage::open(&db).unwrap();
            storage.create_or_get_table("t", &schema()).unwrap();
        }
        assert!(db.exists());
        let storage = SqliteStorage::open(&db).unwrap();
        assert_eq!(storage.existing_schema("t").unwrap(), Some(schema()));
    }

    #[test]
    fn empty_result_still_has_columns() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.create_or_get_table("t", &schema()).unwrap();
        let result = storage.execute_read(r#"SELECT "id", "name" FROM "t" LIMIT 0"#).unwrap();
        assert_eq!(result.columns, vec!["id", "name"]);
        assert_eq!(result.row_count(), 0);
    }

    #[test]
    fn unknown_table_is_not_queryable() {
        let storage = SqliteStorage::in_memory().unwrap();
        let result = verify_queryable(&storage, "nope", &schema());
        assert!(result.is_err());
    }

    #[test]
    fn pipeline_round_trip_through_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("ingest.db");
        let data = "id,flag,amount\n1,yes,1.5\n2,,2\n";
        let ingestor = CsvIngestor::new(IngestOptions::default().with_primary_key("id")).unwrap();

        {
            let mut storage = SqliteStorage::open(&db).unwrap();
            let outcome = ingestor.ingest("sales", Cursor::new(data), &mut storage).unwrap();
            assert_eq!(outcome.report.rows_inserted, 2);
            verify_queryable(&storage, "sales", &outcome.schema).unwrap();
        }

        let mut storage = SqliteStorage::open(&db).unwrap();
        let persisted = storage.existing_schema("sales").unwrap().unwrap();
        assert_eq!(persisted.primary_key(), Some("id"));
        assert_eq!(persisted.field(1).data_type, DataType::Boolean);

        let more = "id,flag,amount\n3,no,4.0\n";
        let outcome = ingestor.ingest("sales", Cursor::new(more), &mut storage).unwrap();
        assert_eq!(outcome.schema, persisted);
        assert_eq!(storage.row_count("sales").unwrap(), 3);
    }
}
