//! End-to-end ingestion: sample, infer, plan, normalize and insert

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Instant;

use csv_ingest_core::{
    IngestReport, NormalizedRow, QueryFacade, StorageAdapter, TableHandle, TableSchema,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::builder::{IngestionPlan, SchemaBuilder};
use crate::csv::{RawReader, RawRow};
use crate::error::{Error, Result};
use crate::inference::{ColumnProfile, TypeInferencer};
use crate::normalizer::Normalizer;
use crate::options::{IngestOptions, MalformedRowPolicy};

/// Rows kept in [`SampleAnalysis::preview`]
pub const PREVIEW_ROWS: usize = 5;

/// Result of a successful ingestion
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    /// Schema of the table after ingestion
    pub schema: TableSchema,
    /// Row and cell counters
    pub report: IngestReport,
}

/// Inference result for a sample, without persisting anything
#[derive(Debug, Clone, Serialize)]
pub struct SampleAnalysis {
    /// Schema that ingestion would create
    pub schema: TableSchema,
    /// One profile per column, in input order
    pub profiles: Vec<ColumnProfile>,
    /// Rows used for inference
    pub rows_sampled: u64,
    /// Malformed rows skipped while sampling
    pub rows_skipped: u64,
    /// Empty cells per column, keyed by sanitized name
    pub missing_values: Vec<(String, u64)>,
    /// First [`PREVIEW_ROWS`] sampled rows, fields as read
    pub preview: Vec<Vec<String>>,
    /// Data rows in the whole input, malformed ones included
    pub total_rows: u64,
    /// Decoded field bytes for the whole input, extrapolated from the sample
    pub estimated_bytes: u64,
}

struct Sample {
    rows: Vec<RawRow>,
    skipped: u64,
}

/// Drives a CSV stream into a storage adapter
#[derive(Debug, Clone)]
pub struct CsvIngestor {
    options: IngestOptions,
}

impl CsvIngestor {
    /// Create an ingestor; the options are validated once here
    pub fn new(options: IngestOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    /// Options in use
    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Ingest the CSV file at `path` into `table`
    pub fn ingest_path<P, S>(&self, table: &str, path: P, storage: &mut S) -> Result<IngestOutcome>
    where
        P: AsRef<Path>,
        S: StorageAdapter + ?Sized,
    {
        let file = File::open(path.as_ref())?;
        debug!(path = %path.as_ref().display(), table, "Ingesting file");
        self.ingest(table, file, storage)
    }

    /// Ingest a CSV stream into `table`.
    ///
    /// Either the whole stream is consumed and a report returned, or the first
    /// structural, schema or storage error is returned. Table creation and all
    /// inserts run inside one storage unit of work, so an error leaves the
    /// storage as it was before the call.
    pub fn ingest<R, S>(&self, table: &str, input: R, storage: &mut S) -> Result<IngestOutcome>
    where
        R: Read,
        S: StorageAdapter + ?Sized,
    {
        let start = Instant::now();
        let mut reader = RawReader::new(input, &self.options)?;
        let mut report = IngestReport::default();

        let sample = self.sample(&mut reader)?;
        report.rows_skipped = sample.skipped;

        let builder = SchemaBuilder::new(&self.options);
        let types = TypeInferencer::new(&self.options).infer(reader.header(), &sample.rows);
        let schema = builder.build(reader.header(), &types)?;
        info!(table, columns = schema.len(), sampled = sample.rows.len(), "Inferred schema");
        debug!("{}", schema);

        let existing = storage.existing_schema(table)?;
        let plan = builder.plan(existing.as_ref(), schema)?;

        storage.begin()?;
        if let Err(e) = self.write(table, &plan, sample.rows, &mut reader, storage, &mut report) {
            warn!(table, error = %e, "Ingestion failed, rolling back");
            if let Err(rollback) = storage.rollback() {
                warn!(table, error = %rollback, "Rollback failed");
            }
            return Err(e);
        }
        storage.commit()?;

        report.rows_read = reader.rows_read();
        report.decode_errors = reader.decode_errors();
        if report.rows_rejected > 0 {
            warn!(table, rejected = report.rows_rejected, "Rows rejected during normalization");
        }
        info!(
            table,
            %report,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Ingestion complete"
        );

        Ok(IngestOutcome {
            schema: plan.stored().clone(),
            report,
        })
    }

    /// Create the table and stream every row into it
    fn write<R, S>(
        &self,
        table: &str,
        plan: &IngestionPlan,
        sample: Vec<RawRow>,
        reader: &mut RawReader<R>,
        storage: &mut S,
        report: &mut IngestReport,
    ) -> Result<()>
    where
        R: Read,
        S: StorageAdapter + ?Sized,
    {
        let handle = storage.create_or_get_table(table, plan.stored())?;
        let normalizer = Normalizer::new(plan.effective().clone(), &self.options);
        let mut writer = BatchWriter::new(&handle, plan, self.options.batch_size);

        for raw in &sample {
            if let Some(row) = normalizer.normalize_into(raw, report) {
                writer.push(row, storage, report)?;
            }
        }
        drop(sample);

        for item in reader.by_ref() {
            if let Some(raw) = self.accept(item, &mut report.rows_skipped)? {
                if let Some(row) = normalizer.normalize_into(&raw, report) {
                    writer.push(row, storage, report)?;
                }
            }
        }
        writer.flush(storage, report)
    }

    /// Sample and infer without touching storage.
    ///
    /// The rest of the input is read to count its rows, so this costs a full
    /// pass over the data.
    pub fn analyze<R: Read>(&self, input: R) -> Result<SampleAnalysis> {
        let mut reader = RawReader::new(input, &self.options)?;
        let sample = self.sample(&mut reader)?;

        let profiles = TypeInferencer::new(&self.options).profile(reader.header(), &sample.rows);
        let types: Vec<_> = profiles.iter().map(ColumnProfile::inferred_type).collect();
        let schema = SchemaBuilder::new(&self.options).build(reader.header(), &types)?;

        let missing_values = schema
            .names()
            .zip(&profiles)
            .map(|(name, profile)| (name.to_string(), profile.empty()))
            .collect();

        let preview = sample
            .rows
            .iter()
            .take(PREVIEW_ROWS)
            .map(|row| row.fields().to_vec())
            .collect();
        let sample_bytes: u64 = sample
            .rows
            .iter()
            .flat_map(|row| row.fields())
            .map(|field| field.len() as u64)
            .sum();

        for item in reader.by_ref() {
            match item {
                Ok(_) | Err(Error::MalformedRow { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        let total_rows = reader.rows_read();
        let rows_sampled = sample.rows.len() as u64;
        let estimated_bytes = match rows_sampled {
            0 => 0,
            n => sample_bytes.saturating_mul(total_rows) / n,
        };
        debug!(total_rows, estimated_bytes, "Counted input rows");

        Ok(SampleAnalysis {
            schema,
            rows_sampled,
            rows_skipped: sample.skipped,
            profiles,
            missing_values,
            preview,
            total_rows,
            estimated_bytes,
        })
    }

    /// [`CsvIngestor::analyze`] over a file
    pub fn analyze_path<P: AsRef<Path>>(&self, path: P) -> Result<SampleAnalysis> {
        self.analyze(File::open(path)?)
    }

    fn sample<R: Read>(&self, reader: &mut RawReader<R>) -> Result<Sample> {
        let limit = self.options.effective_sample_size();
        let mut sample = Sample {
            rows: Vec::with_capacity(limit.min(1024)),
            skipped: 0,
        };

        while sample.rows.len() < limit {
            let Some(item) = reader.next() else {
                break;
            };
            if let Some(row) = self.accept(item, &mut sample.skipped)? {
                sample.rows.push(row);
            }
        }

        debug!(rows = sample.rows.len(), skipped = sample.skipped, limit, "Sampled rows");
        Ok(sample)
    }

    fn accept(&self, item: Result<RawRow>, skipped: &mut u64) -> Result<Option<RawRow>> {
        match item {
            Ok(row) => Ok(Some(row)),
            Err(Error::MalformedRow {
                row,
                line,
                expected,
                found,
            }) if self.options.on_malformed_row == MalformedRowPolicy::Skip => {
                warn!(row, line, expected, found, "Skipping malformed row");
                *skipped += 1;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// Collects normalized rows and hands them to storage in fixed-size batches
struct BatchWriter<'a> {
    handle: &'a TableHandle,
    plan: &'a IngestionPlan,
    batch_size: usize,
    batch: Vec<NormalizedRow>,
    batches: u64,
}

impl<'a> BatchWriter<'a> {
    fn new(handle: &'a TableHandle, plan: &'a IngestionPlan, batch_size: usize) -> Self {
        Self {
            handle,
            plan,
            batch_size,
            batch: Vec::with_capacity(batch_size.min(8192)),
            batches: 0,
        }
    }

    fn push<S>(&mut self, row: NormalizedRow, storage: &mut S, report: &mut IngestReport) -> Result<()>
    where
        S: StorageAdapter + ?Sized,
    {
        self.batch.push(self.plan.project(row)?);
        if self.batch.len() >= self.batch_size {
            self.flush(storage, report)?;
        }
        Ok(())
    }

    fn flush<S>(&mut self, storage: &mut S, report: &mut IngestReport) -> Result<()>
    where
        S: StorageAdapter + ?Sized,
    {
        if self.batch.is_empty() {
            return Ok(());
        }
        let rows = std::mem::take(&mut self.batch);
        let inserted = storage.insert_rows(self.handle, rows)?;
        self.batches += 1;
        report.rows_inserted += inserted as u64;
        debug!(
            table = self.handle.name(),
            batch = self.batches,
            rows = inserted,
            total = report.rows_inserted,
            "Inserted batch"
        );
        Ok(())
    }
}

/// Quote an identifier for SQL, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Check that `table` can be read back with `schema`'s columns.
///
/// Runs a zero-row select through the facade and returns its error unchanged.
pub fn verify_queryable<Q>(facade: &Q, table: &str, schema: &TableSchema) -> Result<()>
where
    Q: QueryFacade + ?Sized,
{
    let columns: Vec<String> = schema.names().map(quote_identifier).collect();
    let query = format!(
        "SELECT {} FROM {} LIMIT 0",
        columns.join(", "),
        quote_identifier(table)
    );
    facade.execute_read(&query)?;
    debug!(table, "Table is queryable");
    Ok(())
}
