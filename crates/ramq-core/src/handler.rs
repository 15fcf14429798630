// crates/ramq-core/src/handler.rs
// ============================================================================
// Module: RAMQ Rule Handler Contract
// Description: The common `validate` surface every rule-type handler implements.
// Purpose: Let the engine dispatch to handlers without knowing their internals.
// Dependencies: crate::{model, reference}
// ============================================================================

//! ## Overview
//! Every handler in `ramq-rules` implements [`RuleHandler`]. Handlers are
//! pure functions of their inputs: they must not mutate `records` and must
//! be deterministic (SPEC_FULL.md §4.2, §8). The engine in `ramq-engine`
//! never inspects a handler's internals; it only calls `validate` and
//! converts a returned `Err` into a `rule_execution_error` finding.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use crate::identifiers::RunId;
use crate::model::BillingRecord;
use crate::model::Rule;
use crate::model::ValidationResult;
use crate::reference::ReferenceSnapshot;

// ============================================================================
// SECTION: Handler Errors
// ============================================================================

/// An error raised by a rule handler during evaluation.
///
/// # Invariants
/// - Caught exclusively at the `ramq-engine` boundary and converted to a
///   `rule_execution_error` finding; never propagated further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError(pub String);

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for HandlerError {}

// ============================================================================
// SECTION: Handler Trait
// ============================================================================

/// A pure function from a record set to a list of findings.
///
/// Implementors receive an immutable view of `records`, the `rule` that
/// selected them, and the reference snapshot in effect for the run; they
/// return findings in their own preferred (but deterministic) order. The
/// engine preserves that order within the rule and only imposes its own
/// ordering across different rules (registration order).
pub trait RuleHandler: Send + Sync {
    /// Evaluates this handler's rule type against `records`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when evaluation cannot proceed (e.g. a
    /// malformed `condition` payload); the engine converts this into a
    /// single `rule_execution_error` finding and continues with the next
    /// rule.
    fn validate(
        &self,
        records: &[BillingRecord],
        rule: &Rule,
        reference: &ReferenceSnapshot,
        run_id: RunId,
    ) -> Result<Vec<ValidationResult>, HandlerError>;
}
