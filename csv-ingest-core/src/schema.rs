//! Schema definition for inferred CSV tables

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Semantic type of a column.
///
/// Variants are declared from most to least specific. That order is the
/// inference precedence: a column takes the first type in [`DataType::PRECEDENCE`]
/// that accepts every sampled value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    /// `true`/`false`/`1`/`0`/`yes`/`no`
    Boolean,

    /// 64-bit signed integer
    Integer,

    /// 64-bit floating point
    Float,

    /// Date-time normalized to UTC
    Timestamp,

    /// UTF-8 text, accepts anything
    Text,
}

impl DataType {
    /// All types, most specific first
    pub const PRECEDENCE: [DataType; 5] = [
        DataType::Boolean,
        DataType::Integer,
        DataType::Float,
        DataType::Timestamp,
        DataType::Text,
    ];

    /// Position in the precedence chain (0 is the most specific)
    pub fn rank(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Boolean => write!(f, "Boolean"),
            DataType::Integer => write!(f, "Integer"),
            DataType::Float => write!(f, "Float"),
            DataType::Timestamp => write!(f, "Timestamp"),
            DataType::Text => write!(f, "Text"),
        }
    }
}

/// A data type together with its nullability, as decided by inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InferredType {
    /// Semantic type
    pub data_type: DataType,

    /// Whether any sampled cell was missing
    pub nullable: bool,
}

impl InferredType {
    /// Create a new inferred type
    pub fn new(data_type: DataType, nullable: bool) -> Self {
        Self { data_type, nullable }
    }
}

impl fmt::Display for InferredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{} (nullable)", self.data_type)
        } else {
            write!(f, "{}", self.data_type)
        }
    }
}

/// A column in a table schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Sanitized column name
    pub name: String,

    /// Data type of the column
    pub data_type: DataType,

    /// Whether the column accepts nulls
    pub nullable: bool,
}

impl Field {
    /// Create a new field
    pub fn new(name: &str, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable,
        }
    }

    /// Get the name of this field
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the data type of this field
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Check if this field is nullable
    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// The inferred type this field was built from
    pub fn inferred_type(&self) -> InferredType {
        InferredType::new(self.data_type, self.nullable)
    }

    /// Copy of this field with a different nullability
    pub fn with_nullable(&self, nullable: bool) -> Self {
        Self {
            nullable,
            ..self.clone()
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}: {} (nullable)", self.name, self.data_type)
        } else {
            write!(f, "{}: {} (non-nullable)", self.name, self.data_type)
        }
    }
}

#[derive(Deserialize)]
struct RawTableSchema {
    fields: Vec<Field>,
    #[serde(default)]
    primary_key: Option<String>,
}

/// The persistent definition of an ingested table.
///
/// Field names are unique. Once built a schema is never mutated; operations
/// that change it return a new schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTableSchema")]
pub struct TableSchema {
    /// Fields in column order
    fields: Vec<Field>,

    /// Primary key column, if any
    primary_key: Option<String>,

    /// Field indices by name for faster lookup
    #[serde(skip)]
    field_indices: HashMap<String, usize>,
}

impl TryFrom<RawTableSchema> for TableSchema {
    type Error = Error;

    fn try_from(raw: RawTableSchema) -> Result<Self> {
        let schema = Self::new(raw.fields)?;
        match raw.primary_key {
            Some(key) => schema.with_primary_key(&key),
            None => Ok(schema),
        }
    }
}

impl TableSchema {
    /// Create a new schema with the given fields.
    ///
    /// Fails if a name is empty or appears twice.
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut field_indices = HashMap::with_capacity(fields.len());
        for (i, field) in fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(Error::InvalidArgument(format!("Field {} has an empty name", i)));
            }
            if field_indices.insert(field.name.clone(), i).is_some() {
                return Err(Error::InvalidArgument(format!(
                    "Duplicate field name: {}",
                    field.name
                )));
            }
        }

        Ok(Self {
            fields,
            primary_key: None,
            field_indices,
        })
    }

    /// Return this schema with `name` as its primary key.
    ///
    /// The key column must exist and be non-nullable.
    pub fn with_primary_key(mut self, name: &str) -> Result<Self> {
        let field = self.field_by_name(name)?;
        if field.nullable {
            return Err(Error::InvalidArgument(format!(
                "Primary key column '{}' is nullable",
                name
            )));
        }
        self.primary_key = Some(name.to_string());
        Ok(self)
    }

    /// Get all fields in this schema
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Get a field by index
    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    /// Get a field by name
    pub fn field_by_name(&self, name: &str) -> Result<&Field> {
        let index = self.index_of(name)?;
        Ok(&self.fields[index])
    }

    /// Get the index of a field by name
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.field_indices
            .get(name)
            .copied()
            .ok_or_else(|| Error::FieldNotFound(name.to_string()))
    }

    /// Whether a field with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.field_indices.contains_key(name)
    }

    /// Column names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Primary key column, if any
    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    /// Get the number of fields in this schema
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if this schema is empty
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Schema with `extra` appended as nullable columns.
    ///
    /// Existing fields and the primary key are kept as they are.
    pub fn appended(&self, extra: &[Field]) -> Result<Self> {
        let mut fields = self.fields.clone();
        fields.extend(extra.iter().map(|f| f.with_nullable(true)));
        let schema = Self::new(fields)?;
        match &self.primary_key {
            Some(key) => schema.with_primary_key(key),
            None => Ok(schema),
        }
    }

    /// Serialize this schema to JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize a schema from JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema: {} fields", self.fields.len())?;
        for field in &self.fields {
            if self.primary_key.as_deref() == Some(field.name.as_str()) {
                writeln!(f, "  {} [primary key]", field)?;
            } else {
                writeln!(f, "  {}", field)?;
            }
        }
        Ok(())
    }
}

/// A shared column whose type differs between two schemas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeChange {
    /// Column name
    pub column: String,
    /// Type in the persisted schema
    pub existing: DataType,
    /// Type in the incoming schema
    pub incoming: DataType,
}

/// Result of comparing a persisted schema with an incoming one
#[derive(Debug, Clone, Default)]
pub struct SchemaComparison {
    /// Fields present in the incoming schema but not in the persisted one
    pub new_fields: Vec<Field>,
    /// Fields present in the persisted schema but not in the incoming one
    pub missing_fields: Vec<Field>,
    /// Shared columns with different types
    pub type_changes: Vec<TypeChange>,
}

impl SchemaComparison {
    /// Identical column sets and types
    pub fn is_identical(&self) -> bool {
        self.new_fields.is_empty() && self.missing_fields.is_empty() && self.type_changes.is_empty()
    }

    /// Incoming columns are a superset of the persisted ones, with equal types
    pub fn is_compatible(&self) -> bool {
        self.missing_fields.is_empty() && self.type_changes.is_empty()
    }
}

/// Compare a persisted schema against an incoming one.
///
/// Nullability is not compared: the persisted nullability wins when rows are
/// normalized against an existing table.
pub fn compare_schemas(existing: &TableSchema, incoming: &TableSchema) -> SchemaComparison {
    let mut comparison = SchemaComparison::default();

    for field in existing.fields() {
        match incoming.field_by_name(&field.name) {
            Ok(other) if other.data_type != field.data_type => {
                comparison.type_changes.push(TypeChange {
                    column: field.name.clone(),
                    existing: field.data_type,
                    incoming: other.data_type,
                });
            }
            Ok(_) => {}
            Err(_) => comparison.missing_fields.push(field.clone()),
        }
    }

    comparison.new_fields = incoming
        .fields()
        .iter()
        .filter(|f| !existing.contains(&f.name))
        .cloned()
        .collect();

    comparison
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn schema(fields: &[(&str, DataType, bool)]) -> TableSchema {
        TableSchema::new(
            fields
                .iter()
                .map(|(name, ty, nullable)| Field::new(name, *ty, *nullable))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn precedence_is_total() {
        for pair in DataType::PRECEDENCE.windows(2) {
            assert!(pair[0] < pair[1]);
            assert_eq!(pair[0].rank() + 1, pair[1].rank());
        }
    }

    #[test_case(DataType::Boolean, "Boolean")]
    #[test_case(DataType::Timestamp, "Timestamp")]
    #[test_case(DataType::Text, "Text")]
    fn display_names(data_type: DataType, expected: &str) {
        assert_eq!(data_type.to_string(), expected);
    }

    #[test]
    fn duplicate_names_rejected() {
        let result = TableSchema::new(vec![
            Field::new("a", DataType::Integer, false),
            Field::new("a", DataType::Text, true),
        ]);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn primary_key_must_be_non_nullable() {
        let s = schema(&[("id", DataType::Integer, false), ("name", DataType::Text, true)]);
        assert_eq!(s.clone().with_primary_key("id").unwrap().primary_key(), Some("id"));
        assert!(s.clone().with_primary_key("name").is_err());
        assert!(matches!(s.with_primary_key("nope"), Err(Error::FieldNotFound(_))));
    }

    #[test]
    fn json_round_trip_rebuilds_lookup() {
        let s = schema(&[("id", DataType::Integer, false), ("at", DataType::Timestamp, true)])
            .with_primary_key("id")
            .unwrap();
        let back = TableSchema::from_json(&s.to_json().unwrap()).unwrap();
        assert_eq!(back, s);
        assert_eq!(back.index_of("at").unwrap(), 1);
    }

    #[test]
    fn json_with_duplicates_is_rejected() {
        let json = r#"{"fields":[
            {"name":"a","data_type":"Integer","nullable":false},
            {"name":"a","data_type":"Integer","nullable":false}]}"#;
        assert!(TableSchema::from_json(json).is_err());
    }

    #[test]
    fn compare_identical() {
        let a = schema(&[("id", DataType::Integer, false)]);
        let b = schema(&[("id", DataType::Integer, true)]);
        let cmp = compare_schemas(&a, &b);
        assert!(cmp.is_identical());
        assert!(cmp.is_compatible());
    }

    #[test]
    fn compare_superset_is_compatible() {
        let a = schema(&[("id", DataType::Integer, false)]);
        let b = schema(&[("extra", DataType::Text, false), ("id", DataType::Integer, false)]);
        let cmp = compare_schemas(&a, &b);
        assert!(cmp.is_compatible());
        assert!(!cmp.is_identical());
        assert_eq!(cmp.new_fields.len(), 1);
        assert_eq!(cmp.new_fields[0].name, "extra");
    }

    #[test]
    fn compare_reports_type_change_and_missing() {
        let a = schema(&[("id", DataType::Integer, false), ("gone", DataType::Text, true)]);
        let b = schema(&[("id", DataType::Text, false)]);
        let cmp = compare_schemas(&a, &b);
        assert!(!cmp.is_compatible());
        assert_eq!(
            cmp.type_changes,
            vec![TypeChange {
                column: "id".into(),
                existing: DataType::Integer,
                incoming: DataType::Text,
            }]
        );
        assert_eq!(cmp.missing_fields[0].name, "gone");
    }

    #[test]
    fn appended_fields_become_nullable() {
        let a = schema(&[("id", DataType::Integer, false)]).with_primary_key("id").unwrap();
        let merged = a.appended(&[Field::new("n", DataType::Float, false)]).unwrap();
        assert_eq!(merged.len(), 2);
        assert!(merged.field(1).nullable);
        assert!(!merged.field(0).nullable);
        assert_eq!(merged.primary_key(), Some("id"));
    }

    #[test]
    fn display_marks_key() {
        let s = schema(&[("id", DataType::Integer, false)]).with_primary_key("id").unwrap();
        let out = s.to_string();
        assert!(out.contains("id: Integer (non-nullable) [primary key]"));
    }
}
