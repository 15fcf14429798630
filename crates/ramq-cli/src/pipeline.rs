// crates/ramq-cli/src/pipeline.rs
// ============================================================================
// Module: Run Pipeline
// Description: Drives one ValidationRun through queued -> ... -> done/failed.
// Purpose: Wire ramq-ingest, ramq-engine, ramq-store and ramq-queue together
//          the way SPEC_FULL.md §4.4 and §5 describe the background worker.
// Dependencies: ramq-core, ramq-engine, ramq-ingest, ramq-queue, ramq-store
// ============================================================================

//! ## Overview
//! [`run_pipeline`] is the one function both CLI subcommands call: `validate`
//! calls it directly and reports the summary to stdout, `worker` calls it
//! from inside a queue job handler. It never panics and never returns a run
//! left in an intermediate stage — every exit path leaves the store with
//! either `done` or `failed`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use ramq_core::RunErrorCode;
use ramq_core::RunId;
use ramq_core::RunStage;
use ramq_core::RunTotals;
use ramq_core::Severity;
use ramq_core::ValidationRun;
use ramq_engine::ValidationEngine;
use ramq_ingest::IngestError;
use ramq_queue::ProgressBus;
use ramq_queue::ProgressEvent;
use ramq_queue::ProgressEventKind;
use ramq_store::ReferenceCache;
use ramq_store::SqliteStore;
use thiserror::Error;
use tracing::info;
use tracing::warn;

/// Errors that can abort [`run_pipeline`] before a terminal stage is reached.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV ingestion failed outright (SPEC_FULL.md §7 input errors).
    #[error("ingestion failed: {0}")]
    Ingest(#[from] IngestError),
    /// The reference snapshot (codes/rules/contexts/establishments) was unavailable.
    #[error("reference cache unavailable: {0}")]
    Reference(#[from] ramq_store::ReferenceCacheError),
    /// A store operation failed.
    #[error("store error: {0}")]
    Store(#[from] ramq_store::StoreError),
}

/// Outcome of a completed (not necessarily successful) run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// The run's final totals.
    pub totals: RunTotals,
    /// Per-row ingestion failures, recorded but non-fatal.
    pub row_error_count: usize,
}

/// Runs the full `queued -> parsing -> validating -> persisting -> done`
/// pipeline for `run_id` over `csv_bytes`, persisting every stage transition
/// and publishing a progress event at each checkpoint.
///
/// # Errors
///
/// Returns [`PipelineError`] only when the run could not reach a terminal
/// stage at all (e.g. the store itself is unreachable); ordinary ingestion
/// and reference failures are instead recorded on the run as `failed` and
/// returned as `Ok` with zeroed totals, matching SPEC_FULL.md §7's
/// "the worker converts any uncaught error into a run failure" policy.
pub fn run_pipeline(
    store: &SqliteStore,
    reference_cache: &ReferenceCache,
    progress: &ProgressBus,
    run_id: RunId,
    file_name: &str,
    csv_bytes: &[u8],
) -> Result<RunSummary, PipelineError> {
    let mut run = ValidationRun::new_queued(run_id, "cli".to_string(), file_name.to_string(), timestamp());
    store.upsert_run(&run)?;

    transition(store, progress, &mut run, RunStage::Parsing, 0)?;
    let outcome = match ramq_ingest::parse_csv(run_id, csv_bytes) {
        Ok(outcome) => outcome,
        Err(error) => {
            fail(store, progress, &mut run, RunErrorCode::InvalidInput, &error.to_string())?;
            return Ok(RunSummary { totals: run.totals, row_error_count: 0 });
        }
    };
    for row_error in &outcome.row_errors {
        warn!(run_id = %run_id, row_index = row_error.row_index, reason = %row_error.reason, "row skipped during ingestion");
    }
    store.bulk_insert_records(&outcome.records)?;
    run.totals.records_parsed = u64::try_from(outcome.records.len()).unwrap_or(u64::MAX);

    transition(store, progress, &mut run, RunStage::Validating, 40)?;
    let reference = match reference_cache.snapshot() {
        Ok(snapshot) => snapshot,
        Err(error) => {
            fail(store, progress, &mut run, RunErrorCode::ReferenceUnavailable, &error.to_string())?;
            return Ok(RunSummary { totals: run.totals, row_error_count: outcome.row_errors.len() });
        }
    };

    let mut engine = ValidationEngine::new();
    for rule in reference.rules() {
        engine.register_rule(rule.clone());
    }
    let findings = engine.validate_records(&outcome.records, &reference, run_id);

    transition(store, progress, &mut run, RunStage::Persisting, 80)?;
    store.bulk_insert_results(&findings)?;

    for finding in &findings {
        match finding.severity {
            Severity::Error => run.totals.error_count += 1,
            Severity::Optimization => run.totals.optimization_count += 1,
            Severity::Info => run.totals.info_count += 1,
        }
    }

    run.stage = RunStage::Done;
    run.progress = 100;
    store.upsert_run(&run)?;
    info!(run_id = %run_id, records = run.totals.records_parsed, errors = run.totals.error_count, "run completed");
    progress.publish(
        run_id,
        ProgressEvent { kind: ProgressEventKind::Completed, stage: RunStage::Done, progress: 100, at: timestamp(), extra: None },
    );
    progress.close(run_id);

    Ok(RunSummary { totals: run.totals, row_error_count: outcome.row_errors.len() })
}

/// Advances `run` to `stage`, persists it, and publishes a `stage` event.
fn transition(
    store: &SqliteStore,
    progress: &ProgressBus,
    run: &mut ValidationRun,
    stage: RunStage,
    percent: u8,
) -> Result<(), PipelineError> {
    run.stage = stage;
    run.progress = percent;
    store.upsert_run(run)?;
    progress.publish(
        run.id,
        ProgressEvent { kind: ProgressEventKind::Stage, stage, progress: percent, at: timestamp(), extra: None },
    );
    Ok(())
}

/// Marks `run` as `failed` with `code`/`reason`, persists it, and publishes
/// the terminal `failed` event.
fn fail(
    store: &SqliteStore,
    progress: &ProgressBus,
    run: &mut ValidationRun,
    code: RunErrorCode,
    reason: &str,
) -> Result<(), PipelineError> {
    run.stage = RunStage::Failed;
    run.error_code = Some(code);
    run.error_message = Some(reason.to_string());
    store.upsert_run(run)?;
    warn!(run_id = %run.id, error_code = ?code, reason, "run failed");
    progress.publish(
        run.id,
        ProgressEvent { kind: ProgressEventKind::Failed, stage: RunStage::Failed, progress: run.progress, at: timestamp(), extra: None },
    );
    progress.close(run.id);
    Ok(())
}

/// Returns the current time as a Unix-epoch-seconds string.
///
/// Run timestamps are opaque to every consumer in this crate; a plain
/// seconds-since-epoch string avoids pulling in a calendar-formatting
/// dependency purely for log/display purposes.
fn timestamp() -> String {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|duration| duration.as_secs().to_string()).unwrap_or_else(|_| "0".to_string())
}
