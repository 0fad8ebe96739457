//! Ingestion options

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Timestamp formats tried in order when none are configured.
///
/// Each format is tried as an offset-aware date-time, then a naive date-time,
/// then a bare date.
pub const DEFAULT_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y",
];

/// What to do with a row whose field count differs from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedRowPolicy {
    /// Count the row as read and move on
    Skip,
    /// Fail the whole ingestion
    #[default]
    Abort,
}

/// Primary key selection for new tables
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// No primary key
    #[default]
    None,
    /// Use the named column, given as the original header or sanitized name
    Column(String),
}

/// Options for reading, inferring and ingesting a CSV stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Field delimiter (single-byte ASCII)
    pub delimiter: char,

    /// Quote character (single-byte ASCII)
    pub quote_char: char,

    /// Whether the first record is a header
    pub has_header: bool,

    /// WHATWG encoding label of the input
    pub encoding: String,

    /// Trim surrounding whitespace from fields and headers
    pub trim: bool,

    /// Rows to sample for inference; `None` samples up to `sample_cap`
    pub sample_size: Option<usize>,

    /// Upper bound on sampled rows
    pub sample_cap: usize,

    /// Policy for rows with the wrong number of fields
    pub on_malformed_row: MalformedRowPolicy,

    /// Accepted timestamp formats, first match wins
    pub timestamp_formats: Vec<String>,

    /// Cell values treated as missing in addition to the empty string
    pub null_tokens: Vec<String>,

    /// Distinct values kept per column profile
    pub distinct_sample_limit: usize,

    /// Rejected rows kept in the report
    pub rejected_sample_limit: usize,

    /// Rows handed to the storage adapter per insert call
    pub batch_size: usize,

    /// Primary key for newly created tables
    pub primary_key: KeyPolicy,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote_char: '"',
            has_header: true,
            encoding: "utf-8".to_string(),
            trim: false,
            sample_size: None,
            sample_cap: 100_000,
            on_malformed_row: MalformedRowPolicy::Abort,
            timestamp_formats: DEFAULT_TIMESTAMP_FORMATS.iter().map(|s| s.to_string()).collect(),
            null_tokens: Vec::new(),
            distinct_sample_limit: 16,
            rejected_sample_limit: 10,
            batch_size: 8192,
            primary_key: KeyPolicy::None,
        }
    }
}

impl IngestOptions {
    /// Create options with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Load options from JSON; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Set custom delimiter
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Set custom quote character
    pub fn with_quote_char(mut self, quote_char: char) -> Self {
        self.quote_char = quote_char;
        self
    }

    /// Set whether the first record is a header
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Set the input encoding label
    pub fn with_encoding(mut self, encoding: &str) -> Self {
        self.encoding = encoding.to_string();
        self
    }

    /// Set whether to trim whitespace
    pub fn with_trim(mut self, trim: bool) -> Self {
        self.trim = trim;
        self
    }

    /// Limit the number of sampled rows
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = Some(sample_size);
        self
    }

    /// Set the malformed row policy
    pub fn with_malformed_row_policy(mut self, policy: MalformedRowPolicy) -> Self {
        self.on_malformed_row = policy;
        self
    }

    /// Replace the accepted timestamp formats
    pub fn with_timestamp_formats<I, S>(mut self, formats: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.timestamp_formats = formats.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the null tokens
    pub fn with_null_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.null_tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    /// Set the insert batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Use `column` as the primary key of new tables
    pub fn with_primary_key(mut self, column: &str) -> Self {
        self.primary_key = KeyPolicy::Column(column.to_string());
        self
    }

    /// Number of rows the inferencer will look at
    pub fn effective_sample_size(&self) -> usize {
        self.sample_size.map_or(self.sample_cap, |n| n.min(self.sample_cap))
    }

    /// Delimiter as a byte
    pub fn delimiter_byte(&self) -> Result<u8> {
        ascii_byte(self.delimiter, "delimiter")
    }

    /// Quote character as a byte
    pub fn quote_byte(&self) -> Result<u8> {
        ascii_byte(self.quote_char, "quote_char")
    }

    /// Resolve the encoding label
    pub fn resolve_encoding(&self) -> Result<&'static Encoding> {
        let encoding = Encoding::for_label(self.encoding.trim().as_bytes())
            .ok_or_else(|| Error::Config(format!("Unknown encoding: {}", self.encoding)))?;
        if !encoding.is_ascii_compatible() {
            return Err(Error::Config(format!(
                "Encoding {} is not ASCII-compatible",
                encoding.name()
            )));
        }
        Ok(encoding)
    }

    /// Check the options before any input is read
    pub fn validate(&self) -> Result<()> {
        let delimiter = self.delimiter_byte()?;
        let quote = self.quote_byte()?;
        if delimiter == quote {
            return Err(Error::Config("delimiter and quote_char must differ".into()));
        }
        if matches!(delimiter, b'\r' | b'\n') {
            return Err(Error::Config("delimiter cannot be a line terminator".into()));
        }
        self.resolve_encoding()?;
        if self.sample_cap == 0 {
            return Err(Error::Config("sample_cap must be positive".into()));
        }
        if self.sample_size == Some(0) {
            return Err(Error::Config("sample_size must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be positive".into()));
        }
        Ok(())
    }
}

fn ascii_byte(c: char, name: &str) -> Result<u8> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        Err(Error::Config(format!("{} must be a single-byte ASCII character, got {:?}", name, c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn defaults_are_valid() {
        let options = IngestOptions::default();
        options.validate().unwrap();
        assert_eq!(options.effective_sample_size(), 100_000);
        assert_eq!(options.on_malformed_row, MalformedRowPolicy::Abort);
    }

    #[test]
    fn sample_size_is_capped() {
        let mut options = IngestOptions::default().with_sample_size(10);
        assert_eq!(options.effective_sample_size(), 10);
        options.sample_cap = 5;
        assert_eq!(options.effective_sample_size(), 5);
    }

    #[test_case(IngestOptions::default().with_delimiter('§') ; "non ascii delimiter")]
    #[test_case(IngestOptions::default().with_delimiter('"') ; "delimiter equals quote")]
    #[test_case(IngestOptions::default().with_delimiter('\n') ; "newline delimiter")]
    #[test_case(IngestOptions::default().with_encoding("utf-16le") ; "utf16")]
    #[test_case(IngestOptions::default().with_encoding("klingon") ; "unknown encoding")]
    #[test_case(IngestOptions::default().with_batch_size(0) ; "zero batch")]
    #[test_case(IngestOptions::default().with_sample_size(0) ; "zero sample")]
    fn invalid_options(options: IngestOptions) {
        assert!(matches!(options.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn latin1_label_resolves() {
        let options = IngestOptions::default().with_encoding("latin1");
        assert_eq!(options.resolve_encoding().unwrap().name(), "windows-1252");
    }

    #[test]
    fn from_json_keeps_defaults() {
        let options = IngestOptions::from_json(
            r#"{"delimiter": ";", "on_malformed_row": "skip", "primary_key": {"column": "id"}}"#,
        )
        .unwrap();
        assert_eq!(options.delimiter, ';');
        assert_eq!(options.on_malformed_row, MalformedRowPolicy::Skip);
        assert_eq!(options.primary_key, KeyPolicy::Column("id".into()));
        assert!(options.has_header);
        assert_eq!(options.batch_size, 8192);
    }

    #[test]
    fn from_json_validates() {
        assert!(matches!(
            IngestOptions::from_json(r#"{"batch_size": 0}"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(IngestOptions::from_json("not json"), Err(Error::Config(_))));
    }
}
