// crates/ramq-queue/src/job.rs
// ============================================================================
// Module: Queue Job & Retry Policy
// Description: The unit of work dispatched to a run-pipeline worker.
// Purpose: Implement SPEC_FULL.md §6's retry-with-backoff contract.
// Dependencies: ramq-core, serde_json
// ============================================================================

//! ## Overview
//! A [`Job`] is identified by its owning run, carries an opaque JSON payload,
//! and tracks how many attempts have already failed. [`RetryPolicy`] turns
//! that attempt count into a backoff delay; the default matches the 1s/2s/4s
//! exponential schedule named in SPEC_FULL.md §6.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use ramq_core::RunId;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Job
// ============================================================================

/// A single unit of dispatched work, keyed by the run it drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// The run this job drives through its pipeline.
    pub run_id: RunId,
    /// Opaque, handler-interpreted payload.
    pub payload: serde_json::Value,
    /// Number of retries already consumed; zero on first delivery.
    pub attempt: u32,
}

impl Job {
    /// Creates a fresh job at attempt zero.
    #[must_use]
    pub const fn new(run_id: RunId, payload: serde_json::Value) -> Self {
        Self { run_id, payload, attempt: 0 }
    }
}

// ============================================================================
// SECTION: Retry Policy
// ============================================================================

/// Exponential backoff policy governing retries before dead-lettering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt.
    pub max_retries: u32,
    /// Delay applied before the first retry; doubled for each subsequent one.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    /// 3 retries with 1s/2s/4s delays, per SPEC_FULL.md §6.
    fn default() -> Self {
        Self { max_retries: 3, base_delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    /// Returns true when `attempt` retries have already been spent and the
    /// job should be dead-lettered rather than retried again.
    #[must_use]
    pub const fn is_exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_retries
    }

    /// Returns the backoff delay before the `retry_number`-th retry
    /// (1-based: the first retry is `retry_number == 1`).
    #[must_use]
    pub fn delay_for_retry(&self, retry_number: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_number.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}
