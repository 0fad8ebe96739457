//! Column profiling and type inference over a row sample

use std::collections::HashSet;

use csv_ingest_core::{DataType, InferredType};
use serde::Serialize;

use crate::cell::CellParser;
use crate::csv::RawRow;
use crate::options::IngestOptions;

/// Candidate types with a match counter, in precedence order. Text always matches.
const COUNTED_TYPES: [DataType; 4] = [
    DataType::Boolean,
    DataType::Integer,
    DataType::Float,
    DataType::Timestamp,
];

/// Aggregate statistics for one sampled column.
///
/// Immutable once built; see [`ProfileBuilder`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    name: String,
    non_empty: u64,
    empty: u64,
    type_matches: [u64; 4],
    min_length: Option<usize>,
    max_length: Option<usize>,
    distinct_values: Vec<String>,
    distinct_overflow: bool,
}

impl ColumnProfile {
    /// Column name as it appears in the input
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sampled cells with a value
    pub fn non_empty(&self) -> u64 {
        self.non_empty
    }

    /// Sampled cells that were empty or a null token
    pub fn empty(&self) -> u64 {
        self.empty
    }

    /// Non-empty cells accepted by `data_type`
    pub fn matches(&self, data_type: DataType) -> u64 {
        match data_type {
            DataType::Text => self.non_empty,
            other => self.type_matches[other.rank()],
        }
    }

    /// Shortest non-empty value, in characters
    pub fn min_length(&self) -> Option<usize> {
        self.min_length
    }

    /// Longest non-empty value, in characters
    pub fn max_length(&self) -> Option<usize> {
        self.max_length
    }

    /// Distinct non-empty values in first-seen order
    pub fn distinct_values(&self) -> &[String] {
        &self.distinct_values
    }

    /// Whether more distinct values were seen than were kept
    pub fn distinct_overflow(&self) -> bool {
        self.distinct_overflow
    }

    /// The most specific type accepting every non-empty sampled value.
    ///
    /// A column without values is nullable text.
    pub fn inferred_type(&self) -> InferredType {
        if self.non_empty == 0 {
            return InferredType::new(DataType::Text, true);
        }
        let data_type = DataType::PRECEDENCE
            .into_iter()
            .find(|ty| self.matches(*ty) == self.non_empty)
            .unwrap_or(DataType::Text);
        InferredType::new(data_type, self.empty > 0)
    }
}

/// Accumulates a [`ColumnProfile`] one cell at a time
#[derive(Debug)]
pub struct ProfileBuilder {
    name: String,
    distinct_limit: usize,
    non_empty: u64,
    empty: u64,
    type_matches: [u64; 4],
    min_length: Option<usize>,
    max_length: Option<usize>,
    distinct_values: Vec<String>,
    seen: HashSet<String>,
    distinct_overflow: bool,
}

impl ProfileBuilder {
    /// Start profiling a column
    pub fn new(name: &str, distinct_limit: usize) -> Self {
        Self {
            name: name.to_string(),
            distinct_limit,
            non_empty: 0,
            empty: 0,
            type_matches: [0; 4],
            min_length: None,
            max_length: None,
            distinct_values: Vec::new(),
            seen: HashSet::new(),
            distinct_overflow: false,
        }
    }

    /// Add one cell
    pub fn observe(&mut self, cell: &str, parser: &CellParser) {
        if parser.is_null(cell) {
            self.empty += 1;
            return;
        }
        self.non_empty += 1;

        let matches = parser.classify(cell);
        for ty in COUNTED_TYPES {
            if matches.accepts(ty) {
                self.type_matches[ty.rank()] += 1;
            }
        }

        let length = cell.chars().count();
        self.min_length = Some(self.min_length.map_or(length, |m| m.min(length)));
        self.max_length = Some(self.max_length.map_or(length, |m| m.max(length)));

        if !self.distinct_overflow && !self.seen.contains(cell) {
            if self.distinct_values.len() < self.distinct_limit {
                self.seen.insert(cell.to_string());
                self.distinct_values.push(cell.to_string());
            } else {
                self.distinct_overflow = true;
            }
        }
    }

    /// Freeze the profile
    pub fn finish(self) -> ColumnProfile {
        ColumnProfile {
            name: self.name,
            non_empty: self.non_empty,
            empty: self.empty,
            type_matches: self.type_matches,
            min_length: self.min_length,
            max_length: self.max_length,
            distinct_values: self.distinct_values,
            distinct_overflow: self.distinct_overflow,
        }
    }
}

/// Infers column types from sampled rows
#[derive(Debug, Clone)]
pub struct TypeInferencer {
    parser: CellParser,
    distinct_limit: usize,
}

impl TypeInferencer {
    /// Create an inferencer from ingestion options
    pub fn new(options: &IngestOptions) -> Self {
        Self {
            parser: CellParser::new(options),
            distinct_limit: options.distinct_sample_limit,
        }
    }

    /// Profile every column in a single pass over `rows`.
    ///
    /// Cells beyond a short row count as empty.
    pub fn profile(&self, header: &[String], rows: &[RawRow]) -> Vec<ColumnProfile> {
        let mut builders: Vec<ProfileBuilder> = header
            .iter()
            .map(|name| ProfileBuilder::new(name, self.distinct_limit))
            .collect();

        for row in rows {
            for (i, builder) in builders.iter_mut().enumerate() {
                builder.observe(row.get(i).unwrap_or(""), &self.parser);
            }
        }

        builders.into_iter().map(ProfileBuilder::finish).collect()
    }

    /// Inferred type per column
    pub fn infer(&self, header: &[String], rows: &[RawRow]) -> Vec<InferredType> {
        self.profile(header, rows)
            .iter()
            .map(ColumnProfile::inferred_type)
            .collect()
    }
}
