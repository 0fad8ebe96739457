//! Raw CSV reader producing untyped rows

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder, Trim};
use encoding_rs::Encoding;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::options::IngestOptions;

const UTF8_BOM: char = '\u{feff}';

/// One data record as untyped text fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based data row number (the header is not counted)
    number: u64,

    /// Line the record starts on
    line: u64,

    /// Decoded fields
    fields: Vec<String>,
}

impl RawRow {
    /// Create a new raw row
    pub fn new(number: u64, line: u64, fields: Vec<String>) -> Self {
        Self { number, line, fields }
    }

    /// Data row number
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Line the record starts on
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Fields in column order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Field at `index`
    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row has no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Lazy, single-pass reader of [`RawRow`]s.
///
/// The header (or synthesized `col_N` names) is read on construction. Rows
/// are then yielded one at a time. A row of the wrong width is yielded as
/// [`Error::MalformedRow`] and iteration continues; any other error ends it.
pub struct RawReader<R: Read> {
    /// Inner CSV reader
    reader: csv::Reader<R>,

    /// Input encoding
    encoding: &'static Encoding,

    /// Column names as they appear in the input
    header: Vec<String>,

    /// First data row when it was consumed to size a headerless input
    pending: Option<RawRow>,

    /// Reused record buffer
    record: ByteRecord,

    /// Data records seen so far
    rows_read: u64,

    /// Fields that needed replacement characters
    decode_errors: u64,

    /// Whether the reader is exhausted
    finished: bool,
}

impl RawReader<File> {
    /// Open a CSV file
    pub fn from_path<P: AsRef<Path>>(path: P, options: &IngestOptions) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "Opened CSV file");
        Self::new(file, options)
    }
}

impl<R: Read> RawReader<R> {
    /// Create a reader over `input` and consume its header
    pub fn new(input: R, options: &IngestOptions) -> Result<Self> {
        options.validate()?;
        let encoding = options.resolve_encoding()?;

        let mut reader = ReaderBuilder::new()
            .delimiter(options.delimiter_byte()?)
            .quote(options.quote_byte()?)
            .has_headers(false) // The first record is handled here
            .flexible(true) // Width is checked per row
            .trim(if options.trim { Trim::All } else { Trim::None })
            .from_reader(input);

        let mut record = ByteRecord::new();
        if !reader.read_byte_record(&mut record)? {
            return Err(Error::EmptyInput);
        }

        let (mut first, errors) = decode_record(&record, encoding);
        if let Some(field) = first.first_mut() {
            if let Some(stripped) = field.strip_prefix(UTF8_BOM) {
                *field = stripped.to_string();
            }
        }

        let mut raw = Self {
            reader,
            encoding,
            header: Vec::new(),
            pending: None,
            record,
            rows_read: 0,
            decode_errors: errors,
            finished: false,
        };

        if options.has_header {
            raw.header = first;
        } else {
            raw.header = (0..first.len()).map(|i| format!("col_{}", i)).collect();
            raw.rows_read = 1;
            raw.pending = Some(RawRow::new(1, record_line(&raw.record), first));
        }

        if raw.header.is_empty() {
            return Err(Error::EmptyInput);
        }

        debug!(columns = raw.header.len(), has_header = options.has_header, "Read CSV header");
        Ok(raw)
    }

    /// Column names as read (or synthesized)
    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// Expected number of fields per row
    pub fn width(&self) -> usize {
        self.header.len()
    }

    /// Data records seen so far, malformed ones included
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Fields decoded with replacement characters so far
    pub fn decode_errors(&self) -> u64 {
        self.decode_errors
    }

    fn read_row(&mut self) -> Option<Result<RawRow>> {
        match self.reader.read_byte_record(&mut self.record) {
            Ok(true) => {
                self.rows_read += 1;
                let number = self.rows_read;
                let line = record_line(&self.record);

                if self.record.len() != self.header.len() {
                    return Some(Err(Error::MalformedRow {
                        row: number,
                        line,
                        expected: self.header.len(),
                        found: self.record.len(),
                    }));
                }

                let (fields, errors) = decode_record(&self.record, self.encoding);
                if errors > 0 {
                    warn!(row = number, fields = errors, "Replaced invalid byte sequences");
                    self.decode_errors += errors;
                }
                Some(Ok(RawRow::new(number, line, fields)))
            }
            Ok(false) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e.into()))
            }
        }
    }
}

impl<R: Read> Iterator for RawReader<R> {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(row) = self.pending.take() {
            return Some(Ok(row));
        }
        if self.finished {
            return None;
        }
        self.read_row()
    }
}

fn record_line(record: &ByteRecord) -> u64 {
    record.position().map_or(0, csv::Position::line)
}

fn decode_record(record: &ByteRecord, encoding: &'static Encoding) -> (Vec<String>, u64) {
    let mut errors = 0;
    let fields = record
        .iter()
        .map(|bytes| {
            let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
            if had_errors {
                errors += 1;
            }
            text.into_owned()
        })
        .collect();
    (fields, errors)
}
