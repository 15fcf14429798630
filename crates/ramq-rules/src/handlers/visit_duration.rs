// crates/ramq-rules/src/handlers/visit_duration.rs
// ============================================================================
// Module: Visit-Duration Revenue Optimization Handler
// Description: Flags consultations billed under a flat code that would have
//              earned more as a timed intervention-clinique billing.
// Purpose: Implement SPEC_FULL.md §4.2.4.
// Dependencies: ramq-core, crate::{condition, finding}
// ============================================================================

//! ## Overview
//! A candidate is any record whose code classifies under the configured
//! top-level group (and is not one of the intervention codes themselves)
//! with a parseable `debut`/`fin` spanning at least the minimum duration.
//! Each candidate is compared against what billing the equivalent
//! intervention-clinique codes would have earned; the handler also emits
//! one per-run rollup `info` finding summarizing the whole batch.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ramq_core::BillingRecord;
use ramq_core::HandlerError;
use ramq_core::Money;
use ramq_core::ReferenceSnapshot;
use ramq_core::Rule;
use ramq_core::RuleHandler;
use ramq_core::RunId;
use ramq_core::Severity;
use ramq_core::ValidationResult;
use ramq_core::duration_minutes_crossing_midnight;

use crate::condition::RuleCondition;
use crate::condition::VisitDurationCondition;
use crate::finding::FindingBuilder;

/// Handler for `ruleType = "visit_duration_optimization"` (SPEC_FULL.md §4.2.4).
#[derive(Debug, Default)]
pub struct VisitDurationHandler;

impl RuleHandler for VisitDurationHandler {
    fn validate(
        &self,
        records: &[BillingRecord],
        rule: &Rule,
        reference: &ReferenceSnapshot,
        run_id: RunId,
    ) -> Result<Vec<ValidationResult>, HandlerError> {
        let condition = match RuleCondition::parse(&rule.rule_type, &rule.condition) {
            Ok(RuleCondition::VisitDurationOptimization(condition)) => condition,
            Ok(_) => {
                return Err(HandlerError(
                    "visit_duration_optimization rule resolved to a different condition type".to_string(),
                ));
            }
            Err(error) => return Err(HandlerError(error.to_string())),
        };

        let candidate_codes = reference.codes_with_top_level(&condition.candidate_top_level);

        let mut findings = Vec::new();
        let mut analyzed_durations = Vec::new();
        let mut gains = Vec::new();

        for record in records {
            if condition.excluded_codes.contains(&record.code) || !candidate_codes.contains(&record.code) {
                continue;
            }
            let (Some(debut), Some(fin)) = (record.debut, record.fin) else { continue };
            let Some(duration) = duration_minutes_crossing_midnight(debut, fin) else { continue };
            if duration < condition.minimum_duration_minutes {
                continue;
            }

            analyzed_durations.push(duration);

            let intervention_amount = intervention_amount_cents(&condition, duration);
            let current_amount = record.montant_preliminaire.cents();
            if intervention_amount <= current_amount {
                continue;
            }

            let gain = intervention_amount - current_amount;
            gains.push(gain);

            let suggested_codes: Vec<&str> = if duration < 45 {
                vec![condition.base_code.as_str()]
            } else {
                vec![condition.base_code.as_str(), condition.extra_code.as_str()]
            };

            findings.push(
                FindingBuilder::new(run_id, rule.id, Severity::Optimization, "visit_duration_optimization")
                    .message(format!(
                        "La consultation de {duration} minutes facturée sous {code} aurait rapporté davantage \
                         en intervention clinique.",
                        code = record.code
                    ))
                    .solution(format!(
                        "Facturer {codes} au lieu de {code}.",
                        codes = suggested_codes.join(" + "),
                        code = record.code
                    ))
                    .primary_record(record.id())
                    .id_ramq(record.id_ramq.clone())
                    .extra("currentCode", serde_json::json!(record.code))
                    .extra("duration", serde_json::json!(duration))
                    .extra("currentAmount", serde_json::json!(Money::from_cents(current_amount).as_f64()))
                    .extra("interventionAmount", serde_json::json!(Money::from_cents(intervention_amount).as_f64()))
                    .extra("gain", serde_json::json!(Money::from_cents(gain).as_f64()))
                    .extra("suggestedCodes", serde_json::json!(suggested_codes))
                    .monetary_impact_cents(gain)
                    .build(),
            );
        }

        if !analyzed_durations.is_empty() {
            let analyzed = analyzed_durations.len();
            let optimizations = gains.len();
            let total_potential_cents: i64 = gains.iter().sum();
            let avg_duration = analyzed_durations.iter().sum::<u32>() as f64 / analyzed as f64;
            let optimization_rate = optimizations as f64 / analyzed as f64;

            findings.push(
                FindingBuilder::new(run_id, rule.id, Severity::Info, "visit_duration_optimization")
                    .message(format!(
                        "{optimizations} occasions d'optimisation détectées sur {analyzed} consultations analysées."
                    ))
                    .extra("analyzed", serde_json::json!(analyzed))
                    .extra("optimizations", serde_json::json!(optimizations))
                    .extra("totalPotentialRevenue", serde_json::json!(Money::from_cents(total_potential_cents).as_f64()))
                    .extra("optimizationRate", serde_json::json!(optimization_rate))
                    .extra("avgDuration", serde_json::json!(avg_duration))
                    .build(),
            );
        }

        Ok(findings)
    }
}

/// Computes the intervention-clinique billing amount for `duration`
/// minutes: the base tariff for the first period plus a ceiling-rounded
/// number of additional periods.
fn intervention_amount_cents(condition: &VisitDurationCondition, duration: u32) -> i64 {
    if duration <= condition.minimum_duration_minutes {
        return condition.base_tariff_cents;
    }
    let extra_minutes = duration - condition.minimum_duration_minutes;
    let extra_periods = extra_minutes.div_ceil(condition.extra_period_minutes);
    condition.base_tariff_cents + i64::from(extra_periods) * condition.extra_period_tariff_cents
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use ramq_core::BillingCode;
    use ramq_core::ClockTime;
    use ramq_core::CodeClassification;
    use ramq_core::RecordNumber;
    use ramq_core::RuleId;
    use ramq_core::ServiceDate;

    use super::*;

    fn candidate_reference() -> ReferenceSnapshot {
        ReferenceSnapshot::build(
            vec![BillingCode {
                code: "00103".to_string(),
                description: String::new(),
                category: String::new(),
                place: String::new(),
                tariff: Money::ZERO,
                extra_unit_value: Money::ZERO,
                unit_required: false,
                classification: CodeClassification {
                    top_level: "B - CONSULTATION, EXAMEN ET VISITE".to_string(),
                    level1_group: String::new(),
                    level2_group: String::new(),
                    leaf: String::new(),
                },
                active: true,
                custom_fields: BTreeMap::new(),
                updated_at: String::new(),
            }],
            Vec::new(),
            std::collections::BTreeSet::new(),
            Vec::new(),
        )
    }

    fn record(duration_start: &str, duration_end: &str, montant: i64) -> BillingRecord {
        BillingRecord {
            validation_run_id: RunId::new_random(),
            record_number: RecordNumber::from_raw(1).expect("nonzero"),
            facture: "F1".to_string(),
            id_ramq: "R1".to_string(),
            date_service_raw: "2025-02-06".to_string(),
            date_service: ServiceDate::parse("2025-02-06").ok(),
            debut: ClockTime::parse(duration_start).ok(),
            fin: ClockTime::parse(duration_end).ok(),
            periode: String::new(),
            lieu_pratique: "50012".to_string(),
            secteur_activite: String::new(),
            diagnostic: String::new(),
            code: "00103".to_string(),
            unites: String::new(),
            role: String::new(),
            element_contexte: None,
            montant_preliminaire: Money::from_cents(montant),
            montant_paye: None,
            doctor_info: Some("DOC1".to_string()),
            patient: Some("PAT1".to_string()),
            custom_fields: BTreeMap::new(),
        }
    }

    fn rule() -> Rule {
        Rule {
            id: RuleId::new_random(),
            name: "Optimisation durée de visite".to_string(),
            rule_type: "visit_duration_optimization".to_string(),
            category: "optimization".to_string(),
            condition: serde_json::Value::Null,
            threshold: None,
            enabled: true,
            custom_fields: BTreeMap::new(),
        }
    }

    #[test]
    fn scenario_f_thirty_minutes_yields_17_20_gain() {
        let records = vec![record("10:00", "10:30", 4_250)];
        let handler = VisitDurationHandler;
        let reference = candidate_reference();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();

        let optimization = &findings[0];
        assert_eq!(optimization.rule_data.get("duration"), Some(&serde_json::json!(30)));
        assert_eq!(optimization.rule_data.get("interventionAmount"), Some(&serde_json::json!(59.70)));
        assert!((optimization.monetary_impact() - 17.20).abs() < 0.01);
        assert_eq!(optimization.rule_data.get("suggestedCodes"), Some(&serde_json::json!(["8857"])));
    }

    #[test]
    fn twenty_nine_minutes_is_not_a_candidate() {
        let records = vec![record("10:00", "10:29", 0)];
        let handler = VisitDurationHandler;
        let reference = candidate_reference();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn forty_five_minutes_suggests_both_codes() {
        let records = vec![record("10:00", "10:45", 0)];
        let handler = VisitDurationHandler;
        let reference = candidate_reference();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();
        assert_eq!(findings[0].rule_data.get("suggestedCodes"), Some(&serde_json::json!(["8857", "8859"])));
    }

    #[test]
    fn rollup_info_finding_is_emitted_when_candidates_are_analyzed() {
        let records = vec![record("10:00", "10:30", 4_250)];
        let handler = VisitDurationHandler;
        let reference = candidate_reference();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[1].severity, Severity::Info);
        assert_eq!(findings[1].rule_data.get("analyzed"), Some(&serde_json::json!(1)));
    }
}
