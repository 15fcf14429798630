// crates/ramq-queue/src/lib.rs
// ============================================================================
// Crate: ramq-queue
// Description: Background job queue driving the run pipeline, plus progress events.
// Purpose: Implement SPEC_FULL.md §5 (concurrency model) and §6 (queue contract).
// ============================================================================

//! ## Overview
//! `ramq-queue` has no knowledge of CSV parsing, rule handlers, or storage:
//! it only knows how to hold run-identified jobs, hand them to a caller-supplied
//! handler with bounded concurrency and retry-with-backoff, and fan out
//! progress events to whoever is watching a run.

#![forbid(unsafe_code)]

pub mod job;
pub mod progress;
pub mod queue;

pub use job::Job;
pub use job::RetryPolicy;
pub use progress::ProgressBus;
pub use progress::ProgressEvent;
pub use progress::ProgressEventKind;
pub use queue::InMemoryJobQueue;
pub use queue::QueueError;
pub use queue::Workers;
