//! Typed cell values and normalized rows

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{DataType, TableSchema};

/// A typed cell value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Missing value
    Null,
    /// Boolean value
    Boolean(bool),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Timestamp in UTC
    Timestamp(NaiveDateTime),
    /// Text value
    Text(String),
}

impl Value {
    /// Whether this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The data type of this value, `None` for nulls
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Integer(_) => Some(DataType::Integer),
            Value::Float(_) => Some(DataType::Float),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Text(_) => Some(DataType::Text),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A row of typed values aligned to a [`TableSchema`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRow {
    /// 1-based data row number in the source file
    row_number: u64,

    /// Values in schema order
    values: Vec<Value>,
}

impl NormalizedRow {
    /// Create a new row
    pub fn new(row_number: u64, values: Vec<Value>) -> Self {
        Self { row_number, values }
    }

    /// Source row number
    pub fn row_number(&self) -> u64 {
        self.row_number
    }

    /// Values in schema order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Take ownership of the values
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Append a value
    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the row has no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Reorder values so that output position `i` holds input value `indices[i]`
    pub fn project(self, indices: &[usize]) -> Result<Self> {
        let mut slots: Vec<Option<Value>> = self.values.into_iter().map(Some).collect();
        let mut values = Vec::with_capacity(indices.len());
        for &i in indices {
            let value = slots
                .get_mut(i)
                .and_then(Option::take)
                .ok_or_else(|| Error::InvalidArgument(format!("Projection index {} is invalid", i)))?;
            values.push(value);
        }
        Ok(Self {
            row_number: self.row_number,
            values,
        })
    }

    /// Check that every value fits the field it lines up with
    pub fn conforms_to(&self, schema: &TableSchema) -> Result<()> {
        if self.values.len() != schema.len() {
            return Err(Error::RowWidth {
                expected: schema.len(),
                found: self.values.len(),
            });
        }
        for (value, field) in self.values.iter().zip(schema.fields()) {
            match value.data_type() {
                None if !field.nullable => {
                    return Err(Error::SchemaMismatch(format!(
                        "Null in non-nullable column '{}'",
                        field.name
                    )))
                }
                Some(ty) if ty != field.data_type => {
                    return Err(Error::SchemaMismatch(format!(
                        "{} value in {} column '{}'",
                        ty, field.data_type, field.name
                    )))
                }
                _ => {}
            }
        }
        Ok(())
    }
}
