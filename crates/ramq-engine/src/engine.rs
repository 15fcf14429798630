// crates/ramq-engine/src/engine.rs
// ============================================================================
// Module: Validation Engine
// Description: Resolves the active rule set and runs handlers over records.
// Purpose: Implement SPEC_FULL.md §4.3's registerRule/clearRules/listRules/
//          validateRecords operations.
// Dependencies: ramq-core, ramq-rules
// ============================================================================

//! ## Overview
//! [`ValidationEngine`] is the one place a handler's [`HandlerError`] is
//! deliberately swallowed into domain data (SPEC_FULL.md §11): a failing
//! handler never aborts a run, it contributes a single `rule_execution_error`
//! finding and the engine moves on to the next rule.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ramq_core::BillingRecord;
use ramq_core::HandlerError;
use ramq_core::ReferenceSnapshot;
use ramq_core::ResultId;
use ramq_core::Rule;
use ramq_core::RunId;
use ramq_core::Severity;
use ramq_core::ValidationResult;
use ramq_rules::HandlerRegistry;
use ramq_rules::ResolvedRule;

/// Category tag stamped on findings synthesized from a handler failure.
pub const RULE_EXECUTION_ERROR_CATEGORY: &str = "rule_execution_error";

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Holds the active rule set and dispatches it against record sets.
///
/// # Invariants
/// - `rules` preserves registration order; `validateRecords` emits findings
///   in that order across rules, and in each handler's own order within a
///   rule, regardless of whether handlers ran in parallel.
pub struct ValidationEngine {
    /// Registered rules, in registration order.
    rules: Vec<Rule>,
    /// Maps each rule's `ruleType` to its handler implementation.
    registry: HandlerRegistry,
}

impl ValidationEngine {
    /// Builds an engine with every built-in handler registered and no rules.
    #[must_use]
    pub fn new() -> Self {
        Self { rules: Vec::new(), registry: HandlerRegistry::with_builtin_handlers() }
    }

    /// Appends `rule` to the active set.
    pub fn register_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Drops every registered rule.
    pub fn clear_rules(&mut self) {
        self.rules.clear();
    }

    /// Returns the active rule set, in registration order.
    #[must_use]
    pub fn list_rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Runs every enabled, resolvable rule against `records` and returns the
    /// findings in deterministic order (SPEC_FULL.md §4.3).
    ///
    /// Handlers are pure by contract and may run concurrently; a handler
    /// failure never escapes this call, it is converted into a single
    /// `rule_execution_error` finding for that rule.
    #[must_use]
    pub fn validate_records(
        &self,
        records: &[BillingRecord],
        reference: &ReferenceSnapshot,
        run_id: RunId,
    ) -> Vec<ValidationResult> {
        let resolved = self.registry.resolve(&self.rules);
        let outcomes = run_handlers(&resolved, records, reference, run_id);

        let mut findings = Vec::new();
        for (rule, outcome) in resolved.iter().map(|resolved| resolved.rule).zip(outcomes) {
            match outcome {
                Ok(mut results) => findings.append(&mut results),
                Err(error) => {
                    tracing::warn!(
                        run_id = %run_id,
                        rule_id = %rule.id,
                        rule_type = %rule.rule_type,
                        error = %error,
                        "rule handler failed"
                    );
                    findings.push(execution_error_finding(run_id, rule, &error));
                }
            }
        }
        findings
    }
}

impl Default for ValidationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs each resolved rule's handler, one thread per rule, and returns the
/// per-rule outcomes in the same order as `resolved` regardless of which
/// thread finishes first.
fn run_handlers(
    resolved: &[ResolvedRule<'_>],
    records: &[BillingRecord],
    reference: &ReferenceSnapshot,
    run_id: RunId,
) -> Vec<Result<Vec<ValidationResult>, HandlerError>> {
    std::thread::scope(|scope| {
        let handles: Vec<_> = resolved
            .iter()
            .map(|entry| {
                scope.spawn(move || entry.handler.validate(records, entry.rule, reference, run_id))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle.join().unwrap_or_else(|_| {
                    Err(HandlerError("rule handler panicked".to_string()))
                })
            })
            .collect()
    })
}

/// Builds the `rule_execution_error` finding standing in for a failed handler.
fn execution_error_finding(run_id: RunId, rule: &Rule, error: &HandlerError) -> ValidationResult {
    ValidationResult {
        id: ResultId::new_random(),
        validation_run_id: run_id,
        rule_id: rule.id,
        severity: Severity::Error,
        category: RULE_EXECUTION_ERROR_CATEGORY.to_string(),
        message: format!("La règle « {} » n'a pas pu être évaluée : {error}", rule.name),
        solution: None,
        billing_record_id: None,
        affected_records: Vec::new(),
        id_ramq: None,
        rule_data: serde_json::json!({ "monetaryImpact": 0.0, "ruleType": rule.rule_type }),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    use ramq_core::RecordNumber;
    use ramq_core::ServiceDate;

    use super::*;

    fn reference() -> ReferenceSnapshot {
        ReferenceSnapshot::build(Vec::new(), Vec::new(), BTreeSet::new(), Vec::new())
    }

    fn rule(rule_type: &str, name: &str) -> Rule {
        Rule {
            id: ramq_core::RuleId::new_random(),
            name: name.to_string(),
            rule_type: rule_type.to_string(),
            category: "intervention_clinique".to_string(),
            condition: serde_json::Value::Null,
            threshold: None,
            enabled: true,
            custom_fields: BTreeMap::new(),
        }
    }

    fn record() -> BillingRecord {
        BillingRecord {
            validation_run_id: RunId::new_random(),
            record_number: RecordNumber::from_raw(1).expect("nonzero"),
            facture: "F1".to_string(),
            id_ramq: "R1".to_string(),
            date_service_raw: "2025-02-06".to_string(),
            date_service: ServiceDate::parse("2025-02-06").ok(),
            debut: None,
            fin: None,
            periode: String::new(),
            lieu_pratique: "50012".to_string(),
            secteur_activite: "3".to_string(),
            diagnostic: String::new(),
            code: "8857".to_string(),
            unites: String::new(),
            role: String::new(),
            element_contexte: None,
            montant_preliminaire: ramq_core::Money::ZERO,
            montant_paye: None,
            doctor_info: None,
            patient: None,
            custom_fields: BTreeMap::new(),
        }
    }

    #[test]
    fn empty_engine_produces_no_findings() {
        let engine = ValidationEngine::new();
        let findings = engine.validate_records(&[record()], &reference(), RunId::new_random());
        assert!(findings.is_empty());
    }

    #[test]
    fn register_clear_and_list_round_trip() {
        let mut engine = ValidationEngine::new();
        engine.register_rule(rule("daily_time_limit", "Limite quotidienne"));
        assert_eq!(engine.list_rules().len(), 1);
        engine.clear_rules();
        assert!(engine.list_rules().is_empty());
    }

    #[test]
    fn disabled_rule_contributes_no_findings_and_no_error() {
        let mut engine = ValidationEngine::new();
        let mut disabled = rule("daily_time_limit", "Désactivée");
        disabled.enabled = false;
        engine.register_rule(disabled);
        let findings = engine.validate_records(&[record()], &reference(), RunId::new_random());
        assert!(findings.is_empty());
    }

    #[test]
    fn unresolvable_rule_is_skipped_without_an_execution_error_finding() {
        let mut engine = ValidationEngine::new();
        engine.register_rule(rule("not_a_real_type", "Inconnue"));
        let findings = engine.validate_records(&[record()], &reference(), RunId::new_random());
        assert!(findings.is_empty());
    }

    #[test]
    fn registration_order_is_preserved_across_multiple_rules() {
        let mut engine = ValidationEngine::new();
        engine.register_rule(rule("daily_time_limit", "Première"));
        engine.register_rule(rule("office_fee", "Deuxième"));
        let rules = engine.list_rules();
        assert_eq!(rules[0].name, "Première");
        assert_eq!(rules[1].name, "Deuxième");
    }
}
