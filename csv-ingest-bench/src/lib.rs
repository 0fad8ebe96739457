//! Benchmarks for CSV inference and ingestion

use std::io::Cursor;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{ensure, Result};
use csv_ingest_core::MemoryStorage;
use csv_ingest_readers::{CsvIngestor, IngestOptions, SqliteStorage};
use serde::Serialize;
use tracing::debug;

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Number of measured iterations
    pub iterations: usize,

    /// Warmup iterations
    pub warmup_iterations: usize,

    /// Data rows in the generated CSV
    pub rows: usize,

    /// Columns in the generated CSV
    pub columns: usize,

    /// Rows per insert call
    pub batch_size: usize,

    /// Rows sampled for inference, `None` for the default cap
    pub sample_size: Option<usize>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            warmup_iterations: 2,
            rows: 50_000,
            columns: 10,
            batch_size: 8192,
            sample_size: None,
        }
    }
}

impl BenchConfig {
    /// Ingestion options matching this configuration
    pub fn ingest_options(&self) -> IngestOptions {
        let options = IngestOptions::default().with_batch_size(self.batch_size);
        match self.sample_size {
            Some(n) => options.with_sample_size(n),
            None => options,
        }
    }
}

/// Benchmark result
#[derive(Debug, Clone, Serialize)]
pub struct BenchResult {
    /// Name of the benchmark
    pub name: String,

    /// Total time taken
    pub total_time: Duration,

    /// Average time per iteration
    pub avg_time: Duration,

    /// Min time per iteration
    pub min_time: Duration,

    /// Max time per iteration
    pub max_time: Duration,

    /// Rows processed across all measured iterations
    pub rows: u64,

    /// Throughput (rows/second)
    pub throughput: f64,
}

/// Run `func` for the configured iterations; it returns the rows it processed
pub fn run_benchmark<F>(name: &str, config: &BenchConfig, mut func: F) -> Result<BenchResult>
where
    F: FnMut() -> Result<u64>,
{
    ensure!(config.iterations > 0, "iterations must be positive");

    for _ in 0..config.warmup_iterations {
        func()?;
    }

    let mut times = Vec::with_capacity(config.iterations);
    let mut rows = 0;
    let start_total = Instant::now();

    for _ in 0..config.iterations {
        let start = Instant::now();
        rows += func()?;
        times.push(start.elapsed());
    }

    let total_time = start_total.elapsed();
    let avg_time = times.iter().sum::<Duration>() / times.len() as u32;
    let min_time = times.iter().min().copied().unwrap_or_default();
    let max_time = times.iter().max().copied().unwrap_or_default();
    let throughput = rows as f64 / total_time.as_secs_f64();

    debug!(name, iterations = config.iterations, rows, "Benchmark finished");
    Ok(BenchResult {
        name: name.to_string(),
        total_time,
        avg_time,
        min_time,
        max_time,
        rows,
        throughput,
    })
}

/// Generate a CSV with a header and `rows` data rows.
///
/// Columns cycle through integer, float, boolean, timestamp and text values;
/// every 17th float cell is left empty.
pub fn generate_csv(rows: usize, columns: usize) -> String {
    let mut out = String::with_capacity(rows * columns * 8);
    let header: Vec<String> = (0..columns).map(|i| format!("Column {}", i)).collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for j in 0..rows {
        for i in 0..columns {
            if i > 0 {
                out.push(',');
            }
            match i % 5 {
                0 => out.push_str(&(j as i64 * 7 - 3).to_string()),
                1 if j % 17 == 0 => {}
                1 => out.push_str(&format!("{:.2}", j as f64 * 0.25)),
                2 => out.push_str(if j % 2 == 0 { "true" } else { "false" }),
                3 => out.push_str(&format!(
                    "2024-{:02}-{:02} {:02}:{:02}:00",
                    j % 12 + 1,
                    j % 28 + 1,
                    j % 24,
                    j % 60
                )),
                _ => out.push_str(&format!("item_{}", j % 1000)),
            }
        }
        out.push('\n');
    }
    out
}

/// Sampling, profiling and schema inference only
pub fn bench_inference(config: &BenchConfig) -> Result<BenchResult> {
    let data = generate_csv(config.rows, config.columns);
    let ingestor = CsvIngestor::new(config.ingest_options())?;
    run_benchmark("Inference", config, || {
        let analysis = ingestor.analyze(Cursor::new(data.as_bytes()))?;
        Ok(analysis.rows_sampled)
    })
}

/// Full ingestion into a fresh in-memory store per iteration
pub fn bench_ingest_memory(config: &BenchConfig) -> Result<BenchResult> {
    let data = generate_csv(config.rows, config.columns);
    let ingestor = CsvIngestor::new(config.ingest_options())?;
    run_benchmark("Ingest (memory)", config, || {
        let mut storage = MemoryStorage::new();
        let outcome = ingestor.ingest("bench", Cursor::new(data.as_bytes()), &mut storage)?;
        Ok(outcome.report.rows_inserted)
    })
}

/// Full ingestion into a SQLite file under `dir`, one table per iteration
pub fn bench_ingest_sqlite(config: &BenchConfig, dir: &Path) -> Result<BenchResult> {
    let data = generate_csv(config.rows, config.columns);
    let ingestor = CsvIngestor::new(config.ingest_options())?;
    let mut storage = SqliteStorage::open(dir.join("bench.db"))?;
    let mut run = 0;
    run_benchmark("Ingest (sqlite)", config, || {
        run += 1;
        let table = format!("bench_{}", run);
        let outcome = ingestor.ingest(&table, Cursor::new(data.as_bytes()), &mut storage)?;
        Ok(outcome.report.rows_inserted)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use csv_ingest_core::DataType;

    fn small() -> BenchConfig {
        BenchConfig {
            iterations: 2,
            warmup_iterations: 0,
            rows: 100,
            columns: 5,
            batch_size: 32,
            sample_size: None,
        }
    }

    #[test]
    fn generated_csv_infers_every_type() {
        let ingestor = CsvIngestor::new(IngestOptions::default()).unwrap();
        let analysis = ingestor.analyze(Cursor::new(generate_csv(40, 5))).unwrap();
        let types: Vec<_> = analysis.schema.fields().iter().map(|f| f.data_type).collect();
        assert_eq!(
            types,
            vec![
                DataType::Integer,
                DataType::Float,
                DataType::Boolean,
                DataType::Timestamp,
                DataType::Text,
            ]
        );
        assert!(analysis.schema.field(1).nullable);
        assert_eq!(analysis.schema.field(0).name, "column_0");
    }

    #[test]
    fn memory_bench_counts_rows() {
        let result = bench_ingest_memory(&small()).unwrap();
        assert_eq!(result.rows, 200);
        assert!(result.min_time <= result.max_time);
    }

    #[test]
    fn sqlite_bench_uses_fresh_tables() {
        let dir = tempfile::tempdir().unwrap();
        let result = bench_ingest_sqlite(&small(), dir.path()).unwrap();
        assert_eq!(result.rows, 200);
    }

    #[test]
    fn zero_iterations_is_an_error() {
        let config = BenchConfig {
            iterations: 0,
            ..small()
        };
        assert!(run_benchmark("noop", &config, || Ok(0)).is_err());
    }
}
