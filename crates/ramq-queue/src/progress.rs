// crates/ramq-queue/src/progress.rs
// ============================================================================
// Module: Progress Event Bus
// Description: Per-run broadcast of pipeline progress events.
// Purpose: Implement SPEC_FULL.md §4.4/§6's out-of-band event stream.
// Dependencies: ramq-core, tokio::sync::broadcast
// ============================================================================

//! ## Overview
//! Each run gets its own broadcast channel, created lazily on first publish
//! or subscribe. Delivery is best-effort for `progress` events (a slow or
//! absent subscriber may miss one), but callers are expected to publish a
//! `completed` or `failed` event exactly once per run, satisfying SPEC_FULL.md
//! §5's at-least-once guarantee for terminal events.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Mutex;

use ramq_core::RunId;
use ramq_core::RunStage;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::broadcast;

/// Per-run channel buffer capacity; generous enough that a normally-paced
/// subscriber never lags behind a run's event volume.
const CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// SECTION: Event Shape
// ============================================================================

/// The kind of a [`ProgressEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    /// A sub-stage progress update within the current stage.
    Progress,
    /// The run transitioned to a new pipeline stage.
    Stage,
    /// The run finished successfully.
    Completed,
    /// The run failed.
    Failed,
}

/// A single progress update for one run, matching SPEC_FULL.md §6's
/// `{type, stage, progress, at, extra?}` wire shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: ProgressEventKind,
    /// Pipeline stage at the time of this event.
    pub stage: RunStage,
    /// Progress percentage in `[0, 100]`.
    pub progress: u8,
    /// ISO-8601 timestamp supplied by the caller.
    pub at: String,
    /// Optional handler-specific detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

// ============================================================================
// SECTION: Bus
// ============================================================================

/// Lazily-created per-run broadcast channels for progress events.
pub struct ProgressBus {
    /// One broadcast sender per run with at least one publish or subscriber.
    channels: Mutex<HashMap<RunId, broadcast::Sender<ProgressEvent>>>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self { channels: Mutex::new(HashMap::new()) }
    }

    /// Publishes `event` for `run_id`. Dropping the event when there are no
    /// subscribers is allowed and expected (SPEC_FULL.md §5 backpressure).
    pub fn publish(&self, run_id: RunId, event: ProgressEvent) {
        let mut guard = self.channels.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let sender = guard.entry(run_id).or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        let _: Result<usize, _> = sender.send(event);
    }

    /// Subscribes to `run_id`'s event stream, creating the channel if this is
    /// the first subscriber.
    pub fn subscribe(&self, run_id: RunId) -> broadcast::Receiver<ProgressEvent> {
        let mut guard = self.channels.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        guard.entry(run_id).or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0).subscribe()
    }

    /// Drops the channel for `run_id`, releasing it once the run is finished
    /// and no further events will be published.
    pub fn close(&self, run_id: RunId) {
        self.channels.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&run_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(kind: ProgressEventKind) -> ProgressEvent {
        ProgressEvent { kind, stage: RunStage::Validating, progress: 50, at: "2025-02-06T10:00:00Z".to_string(), extra: None }
    }

    #[test]
    fn subscriber_receives_published_events() {
        let bus = ProgressBus::new();
        let run_id = RunId::new_random();
        let mut receiver = bus.subscribe(run_id);

        bus.publish(run_id, sample_event(ProgressEventKind::Progress));

        let received = receiver.try_recv().unwrap();
        assert_eq!(received.progress, 50);
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let bus = ProgressBus::new();
        bus.publish(RunId::new_random(), sample_event(ProgressEventKind::Completed));
    }

    #[test]
    fn distinct_runs_do_not_see_each_others_events() {
        let bus = ProgressBus::new();
        let run_a = RunId::new_random();
        let run_b = RunId::new_random();
        let mut receiver_b = bus.subscribe(run_b);

        bus.publish(run_a, sample_event(ProgressEventKind::Failed));

        assert!(receiver_b.try_recv().is_err());
    }
}
