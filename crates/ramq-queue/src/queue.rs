// crates/ramq-queue/src/queue.rs
// ============================================================================
// Module: In-Memory Job Queue
// Description: Bounded-concurrency job consumption with retry and dead-letter.
// Purpose: Implement SPEC_FULL.md §5/§6's queue contract.
// Dependencies: ramq-core, tokio::sync::mpsc
// ============================================================================

//! ## Overview
//! [`InMemoryJobQueue`] backs one run-pipeline worker pool. `create_job` is
//! idempotent by `run_id`: re-enqueuing a run already queued or in flight is
//! a no-op, matching SPEC_FULL.md §4.4's coalescing requirement. `consume`
//! spawns a small pool of OS threads, each polling the shared channel and
//! driving a job through [`RetryPolicy`] before dead-lettering it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use ramq_core::RunId;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::error::TrySendError;
use tracing::error;
use tracing::warn;

use crate::job::Job;
use crate::job::RetryPolicy;

/// Interval workers sleep between empty polls of the job channel.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced by [`InMemoryJobQueue::create_job`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue has reached its configured capacity.
    #[error("queue is at capacity")]
    Full,
    /// The queue has been shut down and no longer accepts jobs.
    #[error("queue is closed")]
    Closed,
}

// ============================================================================
// SECTION: Queue
// ============================================================================

/// A bounded, in-memory job queue with run-scoped deduplication.
pub struct InMemoryJobQueue {
    /// Enqueue side of the job channel.
    sender: mpsc::Sender<Job>,
    /// Dequeue side, shared across worker threads behind a mutex.
    receiver: Mutex<mpsc::Receiver<Job>>,
    /// Runs currently queued or being processed; enforces create-job idempotence.
    in_flight: Mutex<HashSet<RunId>>,
    /// Jobs that exhausted their retry budget, with the final failure reason.
    dead_letters: Mutex<Vec<(Job, String)>>,
    /// Backoff schedule applied between retries.
    retry_policy: RetryPolicy,
}

impl InMemoryJobQueue {
    /// Creates a queue with the given channel capacity and retry policy.
    #[must_use]
    pub fn new(capacity: usize, retry_policy: RetryPolicy) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(receiver),
            in_flight: Mutex::new(HashSet::new()),
            dead_letters: Mutex::new(Vec::new()),
            retry_policy,
        }
    }

    /// Enqueues a job for `run_id`. Idempotent: a run already queued or being
    /// processed is left untouched rather than enqueued a second time.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Full`] when the channel is at capacity, or
    /// [`QueueError::Closed`] when every receiver has been dropped.
    pub fn create_job(&self, run_id: RunId, payload: serde_json::Value) -> Result<(), QueueError> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if !in_flight.insert(run_id) {
            return Ok(());
        }
        drop(in_flight);

        match self.sender.try_send(Job::new(run_id, payload)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.in_flight.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&run_id);
                Err(QueueError::Full)
            }
            Err(TrySendError::Closed(_)) => {
                self.in_flight.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&run_id);
                Err(QueueError::Closed)
            }
        }
    }

    /// Returns every dead-lettered job alongside its final failure reason.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<(Job, String)> {
        self.dead_letters.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }

    /// Spawns `concurrency` worker threads, each pulling jobs from the shared
    /// channel and driving them through `handler` with this queue's retry
    /// policy. Returns a handle that stops the workers on [`Workers::shutdown`].
    #[must_use]
    pub fn consume<F>(self: &Arc<Self>, concurrency: usize, handler: F) -> Workers
    where
        F: Fn(&Job) -> Result<(), String> + Send + Sync + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let handler = Arc::new(handler);
        let handles = (0..concurrency.max(1))
            .map(|_| {
                let queue = Arc::clone(self);
                let handler = Arc::clone(&handler);
                let shutdown = Arc::clone(&shutdown);
                thread::spawn(move || queue.worker_loop(handler.as_ref(), &shutdown))
            })
            .collect();
        Workers { shutdown, handles }
    }

    fn worker_loop<F>(&self, handler: &F, shutdown: &AtomicBool)
    where
        F: Fn(&Job) -> Result<(), String>,
    {
        loop {
            if shutdown.load(Ordering::Acquire) {
                return;
            }

            let next = {
                let mut guard = self.receiver.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
                guard.try_recv()
            };

            let mut job = match next {
                Ok(job) => job,
                Err(TryRecvError::Empty) => {
                    thread::sleep(POLL_INTERVAL);
                    continue;
                }
                Err(TryRecvError::Disconnected) => return,
            };

            loop {
                match handler(&job) {
                    Ok(()) => {
                        self.ack(job.run_id);
                        break;
                    }
                    Err(reason) => {
                        if self.retry_policy.is_exhausted(job.attempt) {
                            error!(run_id = %job.run_id, reason = %reason, "job exhausted retries, dead-lettering");
                            self.nack_to_dead_letter(job, reason);
                            break;
                        }
                        let delay = self.retry_policy.delay_for_retry(job.attempt + 1);
                        warn!(run_id = %job.run_id, attempt = job.attempt, delay_ms = delay.as_millis(), "job failed, retrying after backoff");
                        thread::sleep(delay);
                        job.attempt += 1;
                    }
                }
            }
        }
    }

    /// Acknowledges successful completion of `run_id`'s job.
    fn ack(&self, run_id: RunId) {
        self.in_flight.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&run_id);
    }

    /// Negatively acknowledges a job that exhausted its retries, moving it to
    /// the dead-letter list.
    fn nack_to_dead_letter(&self, job: Job, reason: String) {
        let run_id = job.run_id;
        self.dead_letters.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push((job, reason));
        self.in_flight.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&run_id);
    }
}

// ============================================================================
// SECTION: Worker Handle
// ============================================================================

/// A running worker pool spawned by [`InMemoryJobQueue::consume`].
pub struct Workers {
    /// Flag polled by each worker thread between jobs.
    shutdown: Arc<AtomicBool>,
    /// Join handles for the spawned worker threads.
    handles: Vec<JoinHandle<()>>,
}

impl Workers {
    /// Signals every worker to stop and waits for them to exit.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}
