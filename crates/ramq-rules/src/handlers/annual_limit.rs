// crates/ramq-rules/src/handlers/annual_limit.rs
// ============================================================================
// Module: Annual Per-Patient Limit Handler
// Description: Flags repeated billing of an "annual" code for the same
//              patient within the same calendar year.
// Purpose: Implement SPEC_FULL.md §4.2.3 and its declarative §4.2.5 variant.
// Dependencies: ramq-core, crate::{condition, finding}
// ============================================================================

//! ## Overview
//! Two `ruleType`s share this algorithm: `annual_per_patient_limit` resolves
//! its code set from leaf classification labels against the reference
//! snapshot, while the simpler declarative `annual_limit` takes an explicit
//! code set. Both group by `(patient, code, year)` and emit a single
//! finding per group with more than one billing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use ramq_core::BillingRecord;
use ramq_core::HandlerError;
use ramq_core::Money;
use ramq_core::ReferenceSnapshot;
use ramq_core::Rule;
use ramq_core::RuleHandler;
use ramq_core::RunId;
use ramq_core::Severity;
use ramq_core::ValidationResult;

use crate::condition::AnnualLimitCondition;
use crate::condition::RuleCondition;
use crate::finding::FindingBuilder;

/// Handler for `ruleType = "annual_per_patient_limit"` (SPEC_FULL.md §4.2.3).
#[derive(Debug, Default)]
pub struct AnnualPerPatientLimitHandler;

impl RuleHandler for AnnualPerPatientLimitHandler {
    fn validate(
        &self,
        records: &[BillingRecord],
        rule: &Rule,
        reference: &ReferenceSnapshot,
        run_id: RunId,
    ) -> Result<Vec<ValidationResult>, HandlerError> {
        let condition = match RuleCondition::parse(&rule.rule_type, &rule.condition) {
            Ok(RuleCondition::AnnualPerPatientLimit(condition)) => condition,
            Ok(_) => {
                return Err(HandlerError(
                    "annual_per_patient_limit rule resolved to a different condition type".to_string(),
                ));
            }
            Err(error) => return Err(HandlerError(error.to_string())),
        };

        let codes = resolve_codes(&condition, reference);
        Ok(evaluate(records, &codes, reference, rule, run_id))
    }
}

/// Handler for the declarative `ruleType = "annual_limit"` (SPEC_FULL.md §4.2.5).
#[derive(Debug, Default)]
pub struct AnnualLimitHandler;

impl RuleHandler for AnnualLimitHandler {
    fn validate(
        &self,
        records: &[BillingRecord],
        rule: &Rule,
        reference: &ReferenceSnapshot,
        run_id: RunId,
    ) -> Result<Vec<ValidationResult>, HandlerError> {
        let condition = match RuleCondition::parse(&rule.rule_type, &rule.condition) {
            Ok(RuleCondition::AnnualLimit(condition)) => condition,
            Ok(_) => return Err(HandlerError("annual_limit rule resolved to a different condition type".to_string())),
            Err(error) => return Err(HandlerError(error.to_string())),
        };

        Ok(evaluate(records, &condition.codes, reference, rule, run_id))
    }
}

/// Resolves the effective code set: explicit `codes` take priority over
/// `leaf_patterns` resolved against the reference snapshot.
fn resolve_codes(condition: &AnnualLimitCondition, reference: &ReferenceSnapshot) -> BTreeSet<String> {
    if !condition.codes.is_empty() {
        return condition.codes.clone();
    }
    condition.leaf_patterns.iter().flat_map(|leaf| reference.codes_with_leaf(leaf).iter().cloned()).collect()
}

/// Shared grouping and finding logic for both `ruleType`s.
fn evaluate(
    records: &[BillingRecord],
    codes: &BTreeSet<String>,
    reference: &ReferenceSnapshot,
    rule: &Rule,
    run_id: RunId,
) -> Vec<ValidationResult> {
    let mut groups: BTreeMap<(String, String, i32), Vec<&BillingRecord>> = BTreeMap::new();

    for record in records {
        if !codes.contains(&record.code) {
            continue;
        }
        let Some(patient) = record.patient.clone() else { continue };
        let Some(date) = record.date_service else { continue };
        groups.entry((patient, record.code.clone(), date.year())).or_default().push(record);
    }

    let mut findings = Vec::new();
    for ((_, code, _), mut members) in groups {
        if members.len() <= 1 {
            continue;
        }
        members.sort_by_key(|record| (record.date_service, record.facture.clone()));

        let paid: Vec<&&BillingRecord> = members.iter().filter(|record| record.is_paid()).collect();
        let unpaid: Vec<&&BillingRecord> = members.iter().filter(|record| !record.is_paid()).collect();

        let tariff = reference.code(&code).map_or(Money::ZERO, |c| c.tariff);

        let mut builder = FindingBuilder::new(run_id, rule.id, Severity::Error, "annual_per_patient_limit");
        let primary = members.first().copied();

        builder = if unpaid.is_empty() {
            builder
                .message(format!(
                    "Le code {code} a été facturé {count} fois et payé {count} fois pour ce patient cette année.",
                    count = members.len()
                ))
                .solution("Vérifier manuellement auprès de la RAMQ et corriger les réclamations en double.".to_string())
                .monetary_impact_cents(0)
        } else if paid.is_empty() {
            builder
                .message(format!(
                    "Le code {code} a été facturé {count} fois pour ce patient cette année, toutes non payées.",
                    count = members.len()
                ))
                .solution("Investiguer le motif de refus et ne conserver qu'une seule réclamation.".to_string())
                .monetary_impact_cents(tariff.cents())
        } else {
            let paid_ramq: Vec<String> = paid.iter().map(|record| record.id_ramq.clone()).collect();
            let unpaid_ramq: Vec<String> = unpaid.iter().map(|record| record.id_ramq.clone()).collect();
            builder
                .message(format!(
                    "Le code {code} est payé sous {paid_ramq} et également facturé, non payé, sous {unpaid_ramq}.",
                    paid_ramq = paid_ramq.join(", "),
                    unpaid_ramq = unpaid_ramq.join(", "),
                ))
                .solution("Remplacer les réclamations non payées par des facturations conformes.".to_string())
                .monetary_impact_cents(0)
                .extra("paidIdRamq", serde_json::json!(paid_ramq))
                .extra("unpaidIdRamq", serde_json::json!(unpaid_ramq))
        };

        if let Some(first) = primary {
            builder = builder.primary_record(first.id()).id_ramq(first.id_ramq.clone());
        }
        for member in &members {
            builder = builder.affected_record(member.id());
        }
        builder = builder.extra("paidCount", serde_json::json!(paid.len())).extra("unpaidCount", serde_json::json!(unpaid.len()));

        findings.push(builder.build());
    }

    findings
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use ramq_core::BillingCode;
    use ramq_core::CodeClassification;
    use ramq_core::RecordNumber;
    use ramq_core::RuleId;
    use ramq_core::ServiceDate;

    use super::*;

    /// A reference snapshot with one priced, classified code, grounded on
    /// `visit_duration.rs`'s `candidate_reference` fixture pattern.
    fn candidate_reference() -> ReferenceSnapshot {
        ReferenceSnapshot::build(
            vec![BillingCode {
                code: "8857".to_string(),
                description: "Intervention clinique".to_string(),
                category: String::new(),
                place: String::new(),
                tariff: Money::from_cents(5_970),
                extra_unit_value: Money::ZERO,
                unit_required: false,
                classification: CodeClassification {
                    top_level: String::new(),
                    level1_group: String::new(),
                    level2_group: String::new(),
                    leaf: "Intervention clinique".to_string(),
                },
                active: true,
                custom_fields: BTreeMap::new(),
                updated_at: String::new(),
            }],
            Vec::new(),
            BTreeSet::new(),
            Vec::new(),
        )
    }

    fn record(record_number: u32, date: &str, paid: bool, patient: &str) -> BillingRecord {
        BillingRecord {
            validation_run_id: RunId::new_random(),
            record_number: RecordNumber::from_raw(record_number).expect("nonzero"),
            facture: format!("F{record_number}"),
            id_ramq: format!("R{record_number}"),
            date_service_raw: date.to_string(),
            date_service: ServiceDate::parse(date).ok(),
            debut: None,
            fin: None,
            periode: String::new(),
            lieu_pratique: "50012".to_string(),
            secteur_activite: String::new(),
            diagnostic: String::new(),
            code: "8857".to_string(),
            unites: String::new(),
            role: String::new(),
            element_contexte: None,
            montant_preliminaire: Money::ZERO,
            montant_paye: if paid { Some(Money::from_cents(5_970)) } else { None },
            doctor_info: Some("DOC1".to_string()),
            patient: Some(patient.to_string()),
            custom_fields: BTreeMap::new(),
        }
    }

    fn rule_with_codes(codes: &[&str]) -> Rule {
        Rule {
            id: RuleId::new_random(),
            name: "Limite annuelle".to_string(),
            rule_type: "annual_limit".to_string(),
            category: "annual".to_string(),
            condition: serde_json::json!({ "codes": codes }),
            threshold: None,
            enabled: true,
            custom_fields: BTreeMap::new(),
        }
    }

    #[test]
    fn scenario_e_all_unpaid_yields_positive_tariff_impact() {
        let records = vec![record(1, "2025-02-06", false, "PAT1"), record(2, "2025-03-01", false, "PAT1")];

        let handler = AnnualLimitHandler;
        let reference = candidate_reference();
        let findings = handler.validate(&records, &rule_with_codes(&["8857"]), &reference, RunId::new_random()).unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_data.get("paidCount"), Some(&serde_json::json!(0)));
        assert_eq!(findings[0].rule_data.get("unpaidCount"), Some(&serde_json::json!(2)));
        assert!((findings[0].monetary_impact() - 59.70).abs() < 0.001);
    }

    #[test]
    fn different_years_do_not_group() {
        let records = vec![record(1, "2024-12-31", true, "PAT1"), record(2, "2025-01-01", true, "PAT1")];

        let handler = AnnualLimitHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler.validate(&records, &rule_with_codes(&["8857"]), &reference, RunId::new_random()).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn mixed_paid_and_unpaid_names_both_id_ramq_lists() {
        let records = vec![record(1, "2025-02-06", true, "PAT1"), record(2, "2025-03-01", false, "PAT1")];

        let handler = AnnualLimitHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler.validate(&records, &rule_with_codes(&["8857"]), &reference, RunId::new_random()).unwrap();

        assert_eq!(findings.len(), 1);
        assert!((findings[0].monetary_impact() - 0.0).abs() < f64::EPSILON);
        assert_eq!(findings[0].rule_data.get("paidIdRamq"), Some(&serde_json::json!(["R1"])));
        assert_eq!(findings[0].rule_data.get("unpaidIdRamq"), Some(&serde_json::json!(["R2"])));
    }

    #[test]
    fn all_paid_reports_zero_impact() {
        let records = vec![record(1, "2025-02-06", true, "PAT1"), record(2, "2025-03-01", true, "PAT1")];

        let handler = AnnualLimitHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler.validate(&records, &rule_with_codes(&["8857"]), &reference, RunId::new_random()).unwrap();
        assert!((findings[0].monetary_impact() - 0.0).abs() < f64::EPSILON);
    }

    fn rule_with_leaf_patterns(leaf_patterns: &[&str]) -> Rule {
        Rule {
            id: RuleId::new_random(),
            name: "Limite annuelle par patient".to_string(),
            rule_type: "annual_per_patient_limit".to_string(),
            category: "annual".to_string(),
            condition: serde_json::json!({ "leafPatterns": leaf_patterns }),
            threshold: None,
            enabled: true,
            custom_fields: BTreeMap::new(),
        }
    }

    #[test]
    fn leaf_patterns_resolve_codes_against_the_reference_snapshot() {
        let records = vec![record(1, "2025-02-06", false, "PAT1"), record(2, "2025-03-01", false, "PAT1")];

        let handler = AnnualPerPatientLimitHandler;
        let reference = candidate_reference();
        let findings = handler
            .validate(&records, &rule_with_leaf_patterns(&["Intervention clinique"]), &reference, RunId::new_random())
            .unwrap();

        assert_eq!(findings.len(), 1);
        assert!((findings[0].monetary_impact() - 59.70).abs() < 0.001);
    }

    #[test]
    fn a_leaf_pattern_matching_no_code_resolves_no_findings() {
        let records = vec![record(1, "2025-02-06", false, "PAT1"), record(2, "2025-03-01", false, "PAT1")];

        let handler = AnnualPerPatientLimitHandler;
        let reference = candidate_reference();
        let findings = handler
            .validate(&records, &rule_with_leaf_patterns(&["Leaf inconnue"]), &reference, RunId::new_random())
            .unwrap();

        assert!(findings.is_empty());
    }
}
