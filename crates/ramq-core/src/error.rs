// crates/ramq-core/src/error.rs
// ============================================================================
// Module: RAMQ Core Errors
// Description: Error taxonomy shared by reference-cache and engine contracts.
// Purpose: Classify failures the way SPEC_FULL.md §7/§11 requires.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! `CoreError` covers the failure modes of the reference cache and the
//! handler/engine contracts defined in this crate. Ingestion, storage, and
//! queueing define their own narrower error types; see `ramq-ingest`,
//! `ramq-store`, and `ramq-queue` respectively.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Core Errors
// ============================================================================

/// Errors surfaced by the reference cache and rule-handler contracts.
///
/// # Invariants
/// - Variants are stable for programmatic handling by callers classifying a
///   run failure (SPEC_FULL.md §7).
#[derive(Debug, Error)]
pub enum CoreError {
    /// The reference store was unreachable and no prior snapshot exists.
    #[error("reference snapshot unavailable: {0}")]
    ReferenceUnavailable(String),
    /// A rule's `condition` payload did not match its `rule_type`'s expected shape.
    #[error("invalid rule condition for rule {rule_id} (type {rule_type:?}): {reason}")]
    InvalidRuleCondition {
        /// Offending rule identifier, as a string for display purposes.
        rule_id: String,
        /// The rule's `rule_type` tag.
        rule_type: String,
        /// Human-readable reason.
        reason: String,
    },
}
