//! Coercion of raw rows into typed rows

use csv_ingest_core::{
    CoercionError, CoercionFailure, IngestReport, NormalizedRow, RejectedRow, TableSchema, Value,
};
use tracing::debug;

use crate::cell::CellParser;
use crate::csv::RawRow;
use crate::options::IngestOptions;

/// Result of normalizing one row
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// The row is typed; `cells_nulled` unparseable cells became null
    Accepted {
        /// Typed row in schema order
        row: NormalizedRow,
        /// Unparseable cells stored as null
        cells_nulled: u64,
    },
    /// A non-nullable column could not be filled
    Rejected(RejectedRow),
}

/// Coerces [`RawRow`]s to a schema with the same rules used for inference
#[derive(Debug, Clone)]
pub struct Normalizer {
    schema: TableSchema,
    parser: CellParser,
    rejected_sample_limit: usize,
}

impl Normalizer {
    /// Create a normalizer for rows laid out like `schema`
    pub fn new(schema: TableSchema, options: &IngestOptions) -> Self {
        Self {
            schema,
            parser: CellParser::new(options),
            rejected_sample_limit: options.rejected_sample_limit,
        }
    }

    /// Schema rows are normalized against
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Normalize one row
    pub fn normalize(&self, raw: &RawRow) -> RowOutcome {
        let mut values = Vec::with_capacity(self.schema.len());
        let mut errors = Vec::new();
        let mut cells_nulled = 0;

        for (i, field) in self.schema.fields().iter().enumerate() {
            let cell = raw.get(i).unwrap_or("");

            if self.parser.is_null(cell) {
                if !field.nullable {
                    errors.push(CoercionError {
                        column: field.name.clone(),
                        value: cell.to_string(),
                        failure: CoercionFailure::MissingValue,
                    });
                }
                values.push(Value::Null);
                continue;
            }

            match self.parser.parse(field.data_type, cell) {
                Some(value) => values.push(value),
                None if field.nullable => {
                    cells_nulled += 1;
                    values.push(Value::Null);
                }
                None => {
                    errors.push(CoercionError {
                        column: field.name.clone(),
                        value: cell.to_string(),
                        failure: CoercionFailure::Unparseable(field.data_type),
                    });
                    values.push(Value::Null);
                }
            }
        }

        if errors.is_empty() {
            RowOutcome::Accepted {
                row: NormalizedRow::new(raw.number(), values),
                cells_nulled,
            }
        } else {
            RowOutcome::Rejected(RejectedRow {
                row_number: raw.number(),
                errors,
            })
        }
    }

    /// Normalize one row and record nulled cells or the rejection in `report`
    pub fn normalize_into(&self, raw: &RawRow, report: &mut IngestReport) -> Option<NormalizedRow> {
        match self.normalize(raw) {
            RowOutcome::Accepted { row, cells_nulled } => {
                report.cells_nulled += cells_nulled;
                Some(row)
            }
            RowOutcome::Rejected(rejected) => {
                debug!(
                    row = rejected.row_number,
                    line = raw.line(),
                    errors = rejected.errors.len(),
                    "Rejected row"
                );
                report.record_rejection(rejected, self.rejected_sample_limit);
                None
            }
        }
    }
}
