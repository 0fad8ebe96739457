//! Ingestion reporting

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::DataType;

/// Why a cell could not be coerced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoercionFailure {
    /// Empty cell in a non-nullable column
    MissingValue,
    /// Value does not parse as the column type
    Unparseable(DataType),
}

/// A single cell that failed coercion.
///
/// These are never raised; they are collected per row and summarized in the
/// [`IngestReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoercionError {
    /// Column name
    pub column: String,
    /// Raw cell text
    pub value: String,
    /// Failure kind
    pub failure: CoercionFailure,
}

impl fmt::Display for CoercionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.failure {
            CoercionFailure::MissingValue => {
                write!(f, "column '{}': missing value in non-nullable column", self.column)
            }
            CoercionFailure::Unparseable(ty) => {
                write!(f, "column '{}': '{}' is not a valid {}", self.column, self.value, ty)
            }
        }
    }
}

/// A rejected row kept as a diagnostic sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRow {
    /// 1-based data row number
    pub row_number: u64,
    /// Cells that caused the rejection
    pub errors: Vec<CoercionError>,
}

/// Summary of one ingestion call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Data rows encountered, including skipped malformed rows
    pub rows_read: u64,
    /// Rows accepted by the storage adapter
    pub rows_inserted: u64,
    /// Rows rejected by coercion
    pub rows_rejected: u64,
    /// Malformed rows skipped under the skip policy
    pub rows_skipped: u64,
    /// Cells in nullable columns that failed to parse and were stored as null
    pub cells_nulled: u64,
    /// Fields containing byte sequences invalid in the configured encoding
    pub decode_errors: u64,
    /// Bounded sample of rejected rows, in file order
    pub rejected_samples: Vec<RejectedRow>,
}

impl IngestReport {
    /// Record a rejected row, keeping at most `limit` samples
    pub fn record_rejection(&mut self, row: RejectedRow, limit: usize) {
        self.rows_rejected += 1;
        if self.rejected_samples.len() < limit {
            self.rejected_samples.push(row);
        }
    }

    /// Row numbers of the sampled rejections
    pub fn rejected_row_numbers(&self) -> Vec<u64> {
        self.rejected_samples.iter().map(|r| r.row_number).collect()
    }
}

impl fmt::Display for IngestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "read={} inserted={} rejected={} skipped={} nulled={}",
            self.rows_read, self.rows_inserted, self.rows_rejected, self.rows_skipped, self.cells_nulled
        )
    }
}
