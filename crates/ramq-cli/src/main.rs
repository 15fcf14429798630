// crates/ramq-cli/src/main.rs
// ============================================================================
// Module: RAMQ CLI Entry Point
// Description: Command dispatcher for one-shot and queue-driven validation runs.
// Purpose: Wire ramq-ingest, ramq-engine, ramq-store, and ramq-queue for local use.
// Dependencies: clap, ramq-config, ramq-core, ramq-engine, ramq-ingest, ramq-queue, ramq-store
// ============================================================================

//! ## Overview
//! Two subcommands exercise the same [`pipeline::run_pipeline`]: `validate`
//! calls it synchronously and prints a summary, `worker` enqueues one job per
//! `--input` and drains it through [`ramq_queue::InMemoryJobQueue`], the way
//! a long-running worker process would (SPEC_FULL.md §4.4/§5).

mod pipeline;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use ramq_config::RamqConfig;
use ramq_core::RunId;
use ramq_queue::InMemoryJobQueue;
use ramq_queue::ProgressBus;
use ramq_queue::RetryPolicy;
use ramq_store::ReferenceCache;
use ramq_store::SqliteStore;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "ramq", arg_required_else_help = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a validation synchronously and print a summary.
    Validate(ValidateArgs),
    /// Enqueue one run and drain it through the queue-driven worker pool.
    Worker(WorkerArgs),
}

/// Arguments shared by both subcommands.
#[derive(Args, Debug)]
struct ValidateArgs {
    /// Path to the SQLite store file (created if absent).
    #[arg(long, value_name = "PATH")]
    db: PathBuf,
    /// Path to the semicolon-delimited input CSV.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Optional path to write the SSV export of the parsed records to.
    #[arg(long, value_name = "PATH")]
    export: Option<PathBuf>,
}

/// Arguments for the `worker` subcommand.
#[derive(Args, Debug)]
struct WorkerArgs {
    /// Path to the SQLite store file (created if absent).
    #[arg(long, value_name = "PATH")]
    db: PathBuf,
    /// Path to the semicolon-delimited input CSV to enqueue.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,
    /// Number of worker threads draining the queue.
    #[arg(long, value_name = "N")]
    concurrency: Option<u64>,
}

/// CLI error wrapper covering every fallible step across both subcommands.
#[derive(Debug, Error)]
enum CliError {
    /// A configuration value was present but invalid.
    #[error(transparent)]
    Config(#[from] ramq_config::ConfigError),
    /// The input file could not be read.
    #[error("failed to read {path}: {source}")]
    ReadInput {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The SSV export could not be written.
    #[error("failed to write {path}: {source}")]
    WriteExport {
        /// Path that failed to write.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The store could not be opened or migrated.
    #[error(transparent)]
    Store(#[from] ramq_store::StoreError),
    /// The pipeline could not reach a terminal stage.
    #[error(transparent)]
    Pipeline(#[from] pipeline::PipelineError),
    /// An ingestion-only step (e.g. `--export` without `validate`) failed.
    #[error(transparent)]
    Ingest(#[from] ramq_ingest::IngestError),
    /// The SSV writer failed.
    #[error(transparent)]
    Ssv(#[from] ramq_ingest::SsvError),
}

type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = RamqConfig::from_env()?;
    match cli.command {
        Commands::Validate(args) => command_validate(&args, &config),
        Commands::Worker(args) => command_worker(&args, &config),
    }
}

// ============================================================================
// SECTION: Validate Command
// ============================================================================

/// Runs a single validation synchronously and prints a plain-text summary.
fn command_validate(args: &ValidateArgs, config: &RamqConfig) -> CliResult<ExitCode> {
    let store = SqliteStore::open(&args.db)?;
    let reference_cache = ReferenceCache::new(
        store.clone(),
        config.codes_cache_ttl_seconds,
        config.rules_cache_ttl_seconds,
    );
    let progress = ProgressBus::new();

    let csv_bytes = fs::read(&args.input).map_err(|source| CliError::ReadInput { path: args.input.clone(), source })?;
    let run_id = RunId::new_random();
    let file_name = args.input.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();

    let summary = pipeline::run_pipeline(&store, &reference_cache, &progress, run_id, &file_name, &csv_bytes)?;

    println!("run {run_id}: {} records, {} errors, {} optimizations, {} info, {} row errors",
        summary.totals.records_parsed,
        summary.totals.error_count,
        summary.totals.optimization_count,
        summary.totals.info_count,
        summary.row_error_count);

    if let Some(export_path) = &args.export {
        let parsed = ramq_ingest::parse_csv(run_id, &csv_bytes)?;
        let ssv = ramq_ingest::write_ssv(&parsed.records)?;
        fs::write(export_path, ssv).map_err(|source| CliError::WriteExport { path: export_path.clone(), source })?;
    }

    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Worker Command
// ============================================================================

/// Enqueues one run and drains it through the queue-driven worker pool,
/// demonstrating the background-worker execution mode of SPEC_FULL.md §4.4.
fn command_worker(args: &WorkerArgs, config: &RamqConfig) -> CliResult<ExitCode> {
    let store = SqliteStore::open(&args.db)?;
    let reference_cache = ReferenceCache::new(
        store.clone(),
        config.codes_cache_ttl_seconds,
        config.rules_cache_ttl_seconds,
    );
    let progress = Arc::new(ProgressBus::new());

    let csv_bytes = fs::read(&args.input).map_err(|source| CliError::ReadInput { path: args.input.clone(), source })?;
    let run_id = RunId::new_random();
    let file_name = args.input.file_name().map(|name| name.to_string_lossy().into_owned()).unwrap_or_default();

    let queue = Arc::new(InMemoryJobQueue::new(16, RetryPolicy::default()));
    queue
        .create_job(run_id, serde_json::json!({ "file_name": file_name }))
        .map_err(|error| CliError::Store(ramq_store::StoreError::Db(error.to_string())))?;

    let worker_store = store.clone();
    let worker_progress = Arc::clone(&progress);
    let workers = Arc::clone(&queue).consume(usize::try_from(config.validation_worker_concurrency).unwrap_or(1), move |job| {
        pipeline::run_pipeline(&worker_store, &reference_cache, &worker_progress, job.run_id, &file_name, &csv_bytes)
            .map(|_| ())
            .map_err(|error| error.to_string())
    });

    // A single enqueued job drains in well under a second; this is a
    // demonstration worker, not a long-lived daemon.
    std::thread::sleep(Duration::from_millis(200));
    workers.shutdown();

    if let Some(run) = store.get_run(run_id)? {
        println!(
            "run {run_id}: stage={:?} records={} errors={}",
            run.stage, run.totals.records_parsed, run.totals.error_count
        );
    }
    for (job, reason) in queue.dead_letters() {
        eprintln!("dead-lettered run {}: {reason}", job.run_id);
    }

    Ok(ExitCode::SUCCESS)
}
