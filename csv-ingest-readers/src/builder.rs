//! Schema construction and re-ingestion planning

use std::collections::HashSet;

use csv_ingest_core::{compare_schemas, Field, InferredType, NormalizedRow, TableSchema};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::options::{IngestOptions, KeyPolicy};

/// Turn a header into a column name made of `[a-z0-9_]`.
///
/// Headers that sanitize to nothing fall back to `col_<index>`.
pub fn sanitize_name(header: &str, index: usize) -> String {
    let mut name: String = header
        .chars()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' { c } else { '_' })
        .collect();

    if name.is_empty() {
        return format!("col_{}", index);
    }
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Sanitize every header and resolve collisions with `_2`, `_3`, ...
pub fn unique_names(headers: &[String]) -> Vec<String> {
    let mut taken = HashSet::with_capacity(headers.len());
    headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let base = sanitize_name(header, i);
            let mut name = base.clone();
            let mut suffix = 2;
            while taken.contains(&name) {
                name = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}

/// How rows of one input land in a table
#[derive(Debug, Clone)]
pub struct IngestionPlan {
    stored: TableSchema,
    effective: TableSchema,
    projection: Option<Vec<usize>>,
    added_columns: Vec<String>,
}

impl IngestionPlan {
    /// Plan for a table that does not exist yet
    pub fn create(schema: TableSchema) -> Self {
        Self {
            stored: schema.clone(),
            effective: schema,
            projection: None,
            added_columns: Vec::new(),
        }
    }

    /// Schema the table has after this ingestion
    pub fn stored(&self) -> &TableSchema {
        &self.stored
    }

    /// Schema rows are normalized against, in input column order
    pub fn effective(&self) -> &TableSchema {
        &self.effective
    }

    /// Stored-order position to effective-order position, when they differ
    pub fn projection(&self) -> Option<&[usize]> {
        self.projection.as_deref()
    }

    /// Columns this ingestion adds to an existing table
    pub fn added_columns(&self) -> &[String] {
        &self.added_columns
    }

    /// Reorder a normalized row into stored-schema order
    pub fn project(&self, row: NormalizedRow) -> Result<NormalizedRow> {
        match &self.projection {
            Some(indices) => Ok(row.project(indices)?),
            None => Ok(row),
        }
    }
}

/// Builds table schemas from inferred types
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    key_policy: KeyPolicy,
}

impl SchemaBuilder {
    /// Create a builder using the options' key policy
    pub fn new(options: &IngestOptions) -> Self {
        Self {
            key_policy: options.primary_key.clone(),
        }
    }

    /// Override the key policy
    pub fn with_key_policy(mut self, key_policy: KeyPolicy) -> Self {
        self.key_policy = key_policy;
        self
    }

    /// Build a schema from header names and one inferred type per column
    pub fn build(&self, headers: &[String], types: &[InferredType]) -> Result<TableSchema> {
        if headers.len() != types.len() {
            return Err(Error::Config(format!(
                "{} headers but {} inferred types",
                headers.len(),
                types.len()
            )));
        }

        let names = unique_names(headers);
        let fields = names
            .iter()
            .zip(types)
            .map(|(name, ty)| Field::new(name, ty.data_type, ty.nullable))
            .collect();
        let schema = TableSchema::new(fields)?;

        match &self.key_policy {
            KeyPolicy::None => Ok(schema),
            KeyPolicy::Column(key) => {
                let name = headers
                    .iter()
                    .position(|h| h == key)
                    .map(|i| names[i].as_str())
                    .or_else(|| names.iter().find(|n| *n == key).map(String::as_str))
                    .ok_or_else(|| Error::Config(format!("Primary key column '{}' not found", key)))?
                    .to_string();
                schema.with_primary_key(&name).map_err(|e| Error::Config(e.to_string()))
            }
        }
    }

    /// Plan ingestion of `incoming` into a table that may already exist.
    ///
    /// Every persisted column must be present with the same type. New columns
    /// are appended to the stored schema as nullable, and shared columns keep
    /// their persisted nullability.
    pub fn plan(&self, existing: Option<&TableSchema>, incoming: TableSchema) -> Result<IngestionPlan> {
        let Some(existing) = existing else {
            return Ok(IngestionPlan::create(incoming));
        };

        let comparison = compare_schemas(existing, &incoming);
        if let Some(change) = comparison.type_changes.first() {
            return Err(Error::type_conflict(&change.column, change.existing, change.incoming));
        }
        if let Some(missing) = comparison.missing_fields.first() {
            return Err(Error::SchemaConflict {
                column: missing.name.clone(),
                existing: missing.data_type.to_string(),
                incoming: "missing".to_string(),
            });
        }

        let stored = existing.appended(&comparison.new_fields)?;
        let effective = TableSchema::new(
            incoming
                .names()
                .map(|name| stored.field_by_name(name).cloned())
                .collect::<std::result::Result<Vec<_>, _>>()?,
        )?;

        let projection: Vec<usize> = stored
            .names()
            .map(|name| effective.index_of(name))
            .collect::<std::result::Result<_, _>>()?;
        let identity = projection.iter().enumerate().all(|(i, &p)| i == p);

        let added_columns: Vec<String> = comparison.new_fields.iter().map(|f| f.name.clone()).collect();
        if added_columns.is_empty() {
            debug!(columns = stored.len(), "Reusing existing schema");
        } else {
            info!(added = ?added_columns, "Extending existing schema");
        }

        Ok(IngestionPlan {
            stored,
            effective,
            projection: if identity { None } else { Some(projection) },
            added_columns,
        })
    }
}
