use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use audio_dedup::config::EngineConfig;
use audio_dedup::models::DedupReport;
use audio_dedup::progress::{format_duration, set_log_only};
use audio_dedup::DuplicateFinder;

#[derive(Parser)]
#[command(name = "audio-dedup")]
#[command(about = "Find duplicate and near-duplicate recordings in a music library")]
struct Args {
    /// Library root to scan recursively
    library: PathBuf,

    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Fine clustering distance threshold (default 0.12)
    #[arg(long)]
    threshold: Option<f64>,

    /// Extraction worker threads (default 8)
    #[arg(long)]
    workers: Option<usize>,

    /// Also list tracks that have no duplicate
    #[arg(long)]
    debug: bool,

    /// Fingerprint cache file
    #[arg(long)]
    cache: Option<PathBuf>,

    /// Seed for bucket partitioning
    #[arg(long)]
    seed: Option<u64>,

    /// Print the report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Hide progress bars and print periodic log lines instead
    #[arg(long)]
    log_only: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(threshold) = args.threshold {
        config.distance_threshold = threshold;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(cache) = &args.cache {
        config.cache_path = cache.clone();
    }
    if let Some(seed) = args.seed {
        config.partition_seed = seed;
    }
    config.debug |= args.debug;
    Ok(config)
}

fn print_report(report: &DedupReport) {
    if report.clusters.is_empty() {
        println!("No duplicates found.");
    }
    for (i, cluster) in report.clusters.iter().enumerate() {
        println!("\nGroup {} ({} files):", i + 1, cluster.len());
        for path in cluster {
            println!("  {}", path.display());
        }
    }

    if !report.failures.is_empty() {
        println!("\nCould not analyze {} files:", report.failures.len());
        for failure in &report.failures {
            println!("  {}: {}", failure.path.display(), failure.reason);
        }
    }

    let stats = &report.stats;
    println!("\n{:=<60}", "");
    println!("Scan complete!");
    println!("  Files scanned: {}", stats.scanned);
    println!("  Fingerprints: {} cached, {} computed", stats.cached, stats.computed);
    println!("  Failed: {}", stats.failed);
    println!("  Buckets: {}", stats.buckets);
    println!("  Groups: {}", report.clusters.len());
    println!("  Elapsed: {}", format_duration(stats.elapsed));
    println!("{:=<60}", "");
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    set_log_only(args.log_only);

    let config = build_config(&args)?;
    let finder = DuplicateFinder::new(config);
    let report = finder
        .find_duplicates(&args.library)
        .with_context(|| format!("Failed to scan {}", args.library.display()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{}", json);
    } else {
        print_report(&report);
    }
    Ok(())
}
