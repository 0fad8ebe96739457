//! Cell matching and parsing rules
//!
//! Inference and normalization both go through [`CellParser`], so a value that
//! made a column infer as some type always parses as that type later.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv_ingest_core::{DataType, Value};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::options::IngestOptions;

static INTEGER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?(0|[1-9][0-9]*)$").unwrap());

static FLOAT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?(0|[1-9][0-9]*)(\.[0-9]*)?([eE][+-]?[0-9]+)?$").unwrap());

const TRUE_LITERALS: [&str; 3] = ["true", "1", "yes"];
const FALSE_LITERALS: [&str; 3] = ["false", "0", "no"];

/// Which candidate types a single non-empty cell satisfies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CellMatches {
    /// Boolean literal
    pub boolean: bool,
    /// Integer without leading zeros, fits in i64
    pub integer: bool,
    /// Integer pattern with optional fraction/exponent, finite
    pub float: bool,
    /// One of the configured timestamp formats
    pub timestamp: bool,
}

impl CellMatches {
    /// Whether the cell satisfies `data_type`
    pub fn accepts(&self, data_type: DataType) -> bool {
        match data_type {
            DataType::Boolean => self.boolean,
            DataType::Integer => self.integer,
            DataType::Float => self.float,
            DataType::Timestamp => self.timestamp,
            DataType::Text => true,
        }
    }
}

/// Parses cells according to the configured null tokens and timestamp formats
#[derive(Debug, Clone)]
pub struct CellParser {
    timestamp_formats: Vec<String>,
    null_tokens: Vec<String>,
}

impl CellParser {
    /// Create a parser from ingestion options
    pub fn new(options: &IngestOptions) -> Self {
        Self {
            timestamp_formats: options.timestamp_formats.clone(),
            null_tokens: options.null_tokens.clone(),
        }
    }

    /// Whether the cell counts as missing
    pub fn is_null(&self, cell: &str) -> bool {
        cell.is_empty() || self.null_tokens.iter().any(|t| t == cell)
    }

    /// Test a non-empty cell against every candidate type
    pub fn classify(&self, cell: &str) -> CellMatches {
        let boolean = parse_boolean(cell).is_some();
        let integer = parse_integer(cell).is_some();
        let float = integer || parse_float(cell).is_some();
        CellMatches {
            boolean,
            integer,
            float,
            timestamp: self.parse_timestamp(cell).is_some(),
        }
    }

    /// Parse a non-empty cell as `data_type`
    pub fn parse(&self, data_type: DataType, cell: &str) -> Option<Value> {
        match data_type {
            DataType::Boolean => parse_boolean(cell).map(Value::Boolean),
            DataType::Integer => parse_integer(cell).map(Value::Integer),
            DataType::Float => parse_float(cell).map(Value::Float),
            DataType::Timestamp => self.parse_timestamp(cell).map(Value::Timestamp),
            DataType::Text => Some(Value::Text(cell.to_string())),
        }
    }

    /// Parse a timestamp with the first matching format.
    ///
    /// Offset-aware values are converted to UTC; bare dates map to midnight.
    pub fn parse_timestamp(&self, cell: &str) -> Option<NaiveDateTime> {
        self.timestamp_formats.iter().find_map(|format| {
            if let Ok(ts) = DateTime::parse_from_str(cell, format) {
                return Some(ts.naive_utc());
            }
            if let Ok(ts) = NaiveDateTime::parse_from_str(cell, format) {
                return Some(ts);
            }
            NaiveDate::parse_from_str(cell, format)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
    }
}

/// Parse a boolean literal, case-insensitive
pub fn parse_boolean(cell: &str) -> Option<bool> {
    if TRUE_LITERALS.iter().any(|l| cell.eq_ignore_ascii_case(l)) {
        Some(true)
    } else if FALSE_LITERALS.iter().any(|l| cell.eq_ignore_ascii_case(l)) {
        Some(false)
    } else {
        None
    }
}

/// Parse an integer; leading zeros are rejected
pub fn parse_integer(cell: &str) -> Option<i64> {
    if !INTEGER_PATTERN.is_match(cell) {
        return None;
    }
    cell.parse().ok()
}

/// Parse a finite float written in decimal or exponent notation
pub fn parse_float(cell: &str) -> Option<f64> {
    if !FLOAT_PATTERN.is_match(cell) {
        return None;
    }
    cell.parse::<f64>().ok().filter(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn parser() -> CellParser {
        CellParser::new(&IngestOptions::default())
    }

    #[test_case("true", Some(true))]
    #[test_case("FALSE", Some(false))]
    #[test_case("Yes", Some(true))]
    #[test_case("no", Some(false))]
    #[test_case("1", Some(true))]
    #[test_case("0", Some(false))]
    #[test_case("y", None)]
    #[test_case("2", None)]
    fn booleans(cell: &str, expected: Option<bool>) {
        assert_eq!(parse_boolean(cell), expected);
    }

    #[test_case("0", Some(0))]
    #[test_case("-17", Some(-17))]
    #[test_case("+5", Some(5))]
    #[test_case("007", None ; "leading zeros")]
    #[test_case("1.0", None)]
    #[test_case("9223372036854775807", Some(i64::MAX))]
    #[test_case("9223372036854775808", None ; "overflow")]
    #[test_case(" 1", None ; "untrimmed")]
    fn integers(cell: &str, expected: Option<i64>) {
        assert_eq!(parse_integer(cell), expected);
    }

    #[test_case("1.5", Some(1.5))]
    #[test_case("-0.25", Some(-0.25))]
    #[test_case("1e3", Some(1000.0))]
    #[test_case("2.", Some(2.0))]
    #[test_case("42", Some(42.0))]
    #[test_case(".5", None ; "no integer part")]
    #[test_case("01.5", None ; "leading zero")]
    #[test_case("NaN", None)]
    #[test_case("inf", None)]
    #[test_case("1e999", None ; "not finite")]
    fn floats(cell: &str, expected: Option<f64>) {
        assert_eq!(parse_float(cell), expected);
    }

    #[test_case("2024-03-01", "2024-03-01 00:00:00")]
    #[test_case("2024-03-01 12:30:00", "2024-03-01 12:30:00")]
    #[test_case("2024-03-01T12:30:00.250", "2024-03-01 12:30:00.250")]
    #[test_case("2024-03-01T12:30:00Z", "2024-03-01 12:30:00")]
    #[test_case("2024-03-01T12:30:00+02:00", "2024-03-01 10:30:00")]
    #[test_case("03/01/2024", "2024-03-01 00:00:00")]
    fn timestamps(cell: &str, expected: &str) {
        let expected = NaiveDateTime::parse_from_str(expected, "%Y-%m-%d %H:%M:%S%.f").unwrap();
        assert_eq!(parser().parse_timestamp(cell), Some(expected));
    }

    #[test_case("2024-13-01")]
    #[test_case("yesterday")]
    #[test_case("12")]
    fn not_timestamps(cell: &str) {
        assert_eq!(parser().parse_timestamp(cell), None);
    }

    #[test]
    fn custom_timestamp_formats_only() {
        let options = IngestOptions::default().with_timestamp_formats(["%d.%m.%Y"]);
        let parser = CellParser::new(&options);
        assert!(parser.parse_timestamp("01.03.2024").is_some());
        assert!(parser.parse_timestamp("2024-03-01").is_none());
    }

    #[test]
    fn classify_covers_chain() {
        let m = parser().classify("1");
        assert!(m.boolean && m.integer && m.float && !m.timestamp);
        assert!(m.accepts(DataType::Text));

        let m = parser().classify("3.5");
        assert!(!m.boolean && !m.integer && m.float);

        let m = parser().classify("2024-01-01");
        assert!(m.timestamp && !m.float);
    }

    #[test]
    fn null_tokens() {
        let options = IngestOptions::default().with_null_tokens(["NA", "null"]);
        let parser = CellParser::new(&options);
        assert!(parser.is_null(""));
        assert!(parser.is_null("NA"));
        assert!(!parser.is_null("na"));
        assert!(!parser.is_null(" "));
    }

    #[test]
    fn parse_text_always_succeeds() {
        assert_eq!(
            parser().parse(DataType::Text, "anything"),
            Some(Value::Text("anything".into()))
        );
    }
}
