//! In-memory storage adapter

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crate::error::StorageError;
use crate::schema::TableSchema;
use crate::storage::{StorageAdapter, TableHandle};
use crate::value::{NormalizedRow, Value};

#[derive(Debug, Clone)]
struct MemoryTable {
    schema: TableSchema,
    rows: Vec<NormalizedRow>,
    keys: HashSet<String>,
}

/// A storage adapter that keeps tables in memory.
///
/// Each `insert_rows` call is all-or-nothing: the batch is checked against the
/// stored schema and the primary key before anything is appended. A unit of
/// work snapshots every table on `begin` and restores the snapshot on
/// `rollback`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    tables: BTreeMap<String, MemoryTable>,
    snapshot: Option<BTreeMap<String, MemoryTable>>,
}

impl MemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the stored tables, sorted
    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Rows stored in `name`, aligned to its schema
    pub fn rows(&self, name: &str) -> Option<&[NormalizedRow]> {
        self.tables.get(name).map(|t| t.rows.as_slice())
    }

    /// Number of rows stored in `name`
    pub fn row_count(&self, name: &str) -> usize {
        self.tables.get(name).map_or(0, |t| t.rows.len())
    }
}

impl StorageAdapter for MemoryStorage {
    fn existing_schema(&self, name: &str) -> Result<Option<TableSchema>, StorageError> {
        Ok(self.tables.get(name).map(|t| t.schema.clone()))
    }

    fn create_or_get_table(&mut self, name: &str, schema: &TableSchema) -> Result<TableHandle, StorageError> {
        if let Some(table) = self.tables.get_mut(name) {
            let extra: Vec<_> = schema
                .fields()
                .iter()
                .filter(|f| !table.schema.contains(&f.name))
                .cloned()
                .collect();

            if !extra.is_empty() {
                debug!(table = name, added = extra.len(), "Adding columns to in-memory table");
                table.schema = table
                    .schema
                    .appended(&extra)
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                for row in &mut table.rows {
                    for _ in &extra {
                        row.push(Value::Null);
                    }
                }
            }

            return Ok(TableHandle::new(name, table.schema.clone()));
        }

        debug!(table = name, columns = schema.len(), "Creating in-memory table");
        self.tables.insert(
            name.to_string(),
            MemoryTable {
                schema: schema.clone(),
                rows: Vec::new(),
                keys: HashSet::new(),
            },
        );
        Ok(TableHandle::new(name, schema.clone()))
    }

    fn insert_rows(&mut self, table: &TableHandle, rows: Vec<NormalizedRow>) -> Result<usize, StorageError> {
        let stored = self
            .tables
            .get_mut(table.name())
            .ok_or_else(|| StorageError::TableNotFound(table.name().to_string()))?;

        let key_index = match stored.schema.primary_key() {
            Some(key) => Some(
                stored
                    .schema
                    .index_of(key)
                    .map_err(|e| StorageError::Backend(e.to_string()))?,
            ),
            None => None,
        };

        let mut batch_keys = HashSet::new();
        for row in &rows {
            row.conforms_to(&stored.schema).map_err(|e| StorageError::Constraint {
                table: table.name().to_string(),
                message: format!("row {}: {}", row.row_number(), e),
            })?;

            if let Some(index) = key_index {
                let key = row.values()[index].to_string();
                if stored.keys.contains(&key) || !batch_keys.insert(key.clone()) {
                    return Err(StorageError::Constraint {
                        table: table.name().to_string(),
                        message: format!("row {}: duplicate primary key {}", row.row_number(), key),
                    });
                }
            }
        }

        let count = rows.len();
        stored.keys.extend(batch_keys);
        stored.rows.extend(rows);
        Ok(count)
    }

    fn begin(&mut self) -> Result<(), StorageError> {
        if self.snapshot.is_some() {
            return Err(StorageError::Backend("A unit of work is already open".to_string()));
        }
        self.snapshot = Some(self.tables.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or_else(|| StorageError::Backend("No unit of work to commit".to_string()))
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        let snapshot = self
            .snapshot
            .take()
            .ok_or_else(|| StorageError::Backend("No unit of work to roll back".to_string()))?;
        debug!(tables = snapshot.len(), "Restoring in-memory snapshot");
        self.tables = snapshot;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DataType, Field};

    fn id_schema() -> TableSchema {
        TableSchema::new(vec![Field::new("id", DataType::Integer, false)])
            .unwrap()
            .with_primary_key("id")
            .unwrap()
    }

    #[test]
    fn create_then_get() {
        let mut storage = MemoryStorage::new();
        assert_eq!(storage.existing_schema("t").unwrap(), None);

        let handle = storage.create_or_get_table("t", &id_schema()).unwrap();
        assert_eq!(handle.name(), "t");
        assert_eq!(storage.existing_schema("t").unwrap(), Some(id_schema()));

        let again = storage.create_or_get_table("t", &id_schema()).unwrap();
        assert_eq!(again.schema(), handle.schema());
        assert_eq!(storage.table_names(), vec!["t"]);
    }

    #[test]
    fn insert_and_extend() {
        let mut storage = MemoryStorage::new();
        let handle = storage.create_or_get_table("t", &id_schema()).unwrap();
        let inserted = storage
            .insert_rows(&handle, vec![NormalizedRow::new(1, vec![Value::Integer(1)])])
            .unwrap();
        assert_eq!(inserted, 1);

        let wider = id_schema()
            .appended(&[Field::new("name", DataType::Text, false)])
            .unwrap();
        let handle = storage.create_or_get_table("t", &wider).unwrap();
        assert_eq!(handle.schema().len(), 2);
        assert!(handle.schema().field(1).nullable);
        assert_eq!(
            storage.rows("t").unwrap()[0].values(),
            &[Value::Integer(1), Value::Null]
        );
    }

    #[test]
    fn duplicate_key_rejects_whole_batch() {
        let mut storage = MemoryStorage::new();
        let handle = storage.create_or_get_table("t", &id_schema()).unwrap();
        let err = storage
            .insert_rows(
                &handle,
                vec![
                    NormalizedRow::new(1, vec![Value::Integer(1)]),
                    NormalizedRow::new(2, vec![Value::Integer(1)]),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, StorageError::Constraint { .. }));
        assert_eq!(storage.row_count("t"), 0);
    }

    #[test]
    fn rollback_restores_tables_and_rows() {
        let mut storage = MemoryStorage::new();
        let handle = storage.create_or_get_table("t", &id_schema()).unwrap();
        storage
            .insert_rows(&handle, vec![NormalizedRow::new(1, vec![Value::Integer(1)])])
            .unwrap();

        storage.begin().unwrap();
        storage
            .insert_rows(&handle, vec![NormalizedRow::new(2, vec![Value::Integer(2)])])
            .unwrap();
        storage.create_or_get_table("u", &id_schema()).unwrap();
        storage.rollback().unwrap();

        assert_eq!(storage.table_names(), vec!["t"]);
        assert_eq!(storage.row_count("t"), 1);

        // The rolled-back key is free again
        storage.begin().unwrap();
        storage
            .insert_rows(&handle, vec![NormalizedRow::new(2, vec![Value::Integer(2)])])
            .unwrap();
        storage.commit().unwrap();
        assert_eq!(storage.row_count("t"), 2);
    }

    #[test]
    fn units_of_work_do_not_nest() {
        let mut storage = MemoryStorage::new();
        assert!(storage.commit().is_err());
        assert!(storage.rollback().is_err());
        storage.begin().unwrap();
        assert!(matches!(storage.begin(), Err(StorageError::Backend(_))));
    }

    #[test]
    fn missing_table() {
        let mut storage = MemoryStorage::new();
        let handle = TableHandle::new("ghost", id_schema());
        assert_eq!(
            storage.insert_rows(&handle, Vec::new()),
            Err(StorageError::TableNotFound("ghost".into()))
        );
    }
}
