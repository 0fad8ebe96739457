//! Benchmark runner for CSV inference and ingestion

use anyhow::Result;
use csv_ingest_bench::{bench_inference, bench_ingest_memory, bench_ingest_sqlite, BenchConfig, BenchResult};

fn print_result(result: &BenchResult) {
    println!("\nBenchmark: {}", result.name);
    println!("  Total time:   {:?}", result.total_time);
    println!("  Average time: {:?}", result.avg_time);
    println!("  Min time:     {:?}", result.min_time);
    println!("  Max time:     {:?}", result.max_time);
    println!("  Throughput:   {:.2} rows/sec", result.throughput);
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::WARN).init();

    println!("=== CSV Ingest Benchmarks ===");

    let config = BenchConfig::default();
    let mut results = vec![bench_inference(&config)?, bench_ingest_memory(&config)?];

    let dir = std::env::temp_dir().join(format!("csv-ingest-bench-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    let sqlite = bench_ingest_sqlite(&BenchConfig { iterations: 3, ..config.clone() }, &dir);
    std::fs::remove_dir_all(&dir)?;
    results.push(sqlite?);

    for result in &results {
        print_result(result);
    }

    // Wider tables and smaller samples
    println!("\n=== Column Count Scaling ===");
    for columns in [5, 20, 50] {
        let config = BenchConfig {
            iterations: 3,
            warmup_iterations: 1,
            rows: 20_000,
            columns,
            sample_size: Some(1_000),
            ..BenchConfig::default()
        };
        let result = bench_ingest_memory(&config)?;
        println!("  {:>3} columns: {:.2} rows/sec", columns, result.throughput);
        results.push(result);
    }

    if std::env::args().any(|a| a == "--json") {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(())
}
