// crates/ramq-rules/src/handlers/declarative.rs
// ============================================================================
// Module: Declarative Rule-Type Handlers
// Description: The simpler scope/predicate rule families named but not
//              algorithmically detailed by the handler catalogue.
// Purpose: Implement SPEC_FULL.md §4.2.5.
// Dependencies: ramq-core, crate::{condition, finding}
// ============================================================================

//! ## Overview
//! Each handler here is a small per-record or per-group predicate. They
//! share the scope-grouping helper [`scope_key`] so `prohibition`,
//! `requirement`, `amount_limit`, and `mutual_exclusion` all group records
//! the same way a rule author would expect.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use ramq_core::BillingRecord;
use ramq_core::ClockTime;
use ramq_core::HandlerError;
use ramq_core::Money;
use ramq_core::ReferenceSnapshot;
use ramq_core::Rule;
use ramq_core::RuleHandler;
use ramq_core::RunId;
use ramq_core::Severity;
use ramq_core::ValidationResult;

use crate::condition::RuleCondition;
use crate::condition::Scope;
use crate::finding::FindingBuilder;

/// Groups records by the scope a declarative rule is evaluated over.
fn scope_key(record: &BillingRecord, scope: Scope) -> Option<String> {
    match scope {
        Scope::Patient => record.patient.clone(),
        Scope::PatientDay => {
            let patient = record.patient.clone()?;
            let date = record.date_service?;
            Some(format!("{patient}|{date}"))
        }
        Scope::Invoice => Some(record.facture.clone()),
    }
}

// ============================================================================
// SECTION: Prohibition
// ============================================================================

/// Handler for `ruleType = "prohibition"`.
#[derive(Debug, Default)]
pub struct ProhibitionHandler;

impl RuleHandler for ProhibitionHandler {
    fn validate(
        &self,
        records: &[BillingRecord],
        rule: &Rule,
        _reference: &ReferenceSnapshot,
        run_id: RunId,
    ) -> Result<Vec<ValidationResult>, HandlerError> {
        let condition = match RuleCondition::parse(&rule.rule_type, &rule.condition) {
            Ok(RuleCondition::Prohibition(condition)) => condition,
            Ok(_) => return Err(HandlerError("prohibition rule resolved to a different condition type".to_string())),
            Err(error) => return Err(HandlerError(error.to_string())),
        };

        let mut groups: BTreeMap<String, Vec<&BillingRecord>> = BTreeMap::new();
        for record in records {
            if condition.codes_x.contains(&record.code) || condition.codes_y.contains(&record.code) {
                if let Some(key) = scope_key(record, condition.scope) {
                    groups.entry(key).or_default().push(record);
                }
            }
        }

        let mut findings = Vec::new();
        for members in groups.into_values() {
            let has_x = members.iter().any(|record| condition.codes_x.contains(&record.code));
            let has_y = members.iter().any(|record| condition.codes_y.contains(&record.code));
            if !(has_x && has_y) {
                continue;
            }

            let mut sorted = members;
            sorted.sort_by_key(|record| (record.date_service, record.facture.clone()));
            let mut builder = FindingBuilder::new(run_id, rule.id, Severity::Error, "prohibition")
                .message("Deux codes qui ne peuvent pas être facturés ensemble ont été trouvés dans la même portée.".to_string())
                .solution("Annuler l'un des deux codes en conflit.".to_string())
                .monetary_impact_cents(0);
            if let Some(first) = sorted.first() {
                builder = builder.primary_record(first.id()).id_ramq(first.id_ramq.clone());
            }
            for member in &sorted {
                builder = builder.affected_record(member.id());
            }
            findings.push(builder.build());
        }

        Ok(findings)
    }
}

// ============================================================================
// SECTION: Requirement
// ============================================================================

/// Handler for `ruleType = "requirement"`.
#[derive(Debug, Default)]
pub struct RequirementHandler;

impl RuleHandler for RequirementHandler {
    fn validate(
        &self,
        records: &[BillingRecord],
        rule: &Rule,
        _reference: &ReferenceSnapshot,
        run_id: RunId,
    ) -> Result<Vec<ValidationResult>, HandlerError> {
        let condition = match RuleCondition::parse(&rule.rule_type, &rule.condition) {
            Ok(RuleCondition::Requirement(condition)) => condition,
            Ok(_) => return Err(HandlerError("requirement rule resolved to a different condition type".to_string())),
            Err(error) => return Err(HandlerError(error.to_string())),
        };

        let mut groups: BTreeMap<String, Vec<&BillingRecord>> = BTreeMap::new();
        for record in records {
            if let Some(key) = scope_key(record, condition.scope) {
                groups.entry(key).or_default().push(record);
            }
        }

        let mut findings = Vec::new();
        for members in groups.into_values() {
            let triggers: Vec<&&BillingRecord> =
                members.iter().filter(|record| record.code == condition.required_by).collect();
            if triggers.is_empty() {
                continue;
            }
            let satisfied = members.iter().any(|record| record.code == condition.requires);
            if satisfied {
                continue;
            }

            for trigger in triggers {
                findings.push(
                    FindingBuilder::new(run_id, rule.id, Severity::Error, "requirement")
                        .message(format!(
                            "Le code {required_by} requiert la présence du code {requires}, qui est absent.",
                            required_by = condition.required_by,
                            requires = condition.requires,
                        ))
                        .solution(format!("Ajouter une facturation du code {requires}.", requires = condition.requires))
                        .primary_record(trigger.id())
                        .id_ramq(trigger.id_ramq.clone())
                        .monetary_impact_cents(0)
                        .build(),
                );
            }
        }

        Ok(findings)
    }
}

// ============================================================================
// SECTION: Time Restriction
// ============================================================================

/// Handler for `ruleType = "time_restriction"`.
#[derive(Debug, Default)]
pub struct TimeRestrictionHandler;

impl RuleHandler for TimeRestrictionHandler {
    fn validate(
        &self,
        records: &[BillingRecord],
        rule: &Rule,
        _reference: &ReferenceSnapshot,
        run_id: RunId,
    ) -> Result<Vec<ValidationResult>, HandlerError> {
        let condition = match RuleCondition::parse(&rule.rule_type, &rule.condition) {
            Ok(RuleCondition::TimeRestriction(condition)) => condition,
            Ok(_) => return Err(HandlerError("time_restriction rule resolved to a different condition type".to_string())),
            Err(error) => return Err(HandlerError(error.to_string())),
        };

        let window_start = ClockTime::parse(&condition.window_start)
            .map_err(|error| HandlerError(format!("invalid window_start: {error}")))?;
        let window_end = ClockTime::parse(&condition.window_end)
            .map_err(|error| HandlerError(format!("invalid window_end: {error}")))?;

        let mut findings = Vec::new();
        for record in records {
            if record.code != condition.code {
                continue;
            }
            let Some(debut) = record.debut else { continue };
            if debut >= window_start && debut <= window_end {
                continue;
            }

            findings.push(
                FindingBuilder::new(run_id, rule.id, Severity::Error, "time_restriction")
                    .message(format!(
                        "Le code {code} n'est valide qu'entre {window_start} et {window_end}.",
                        code = condition.code
                    ))
                    .solution("Vérifier l'heure de la visite ou annuler cette facturation.".to_string())
                    .primary_record(record.id())
                    .id_ramq(record.id_ramq.clone())
                    .monetary_impact_cents(if record.is_paid() { -record.montant_paye.unwrap_or(Money::ZERO).cents() } else { 0 })
                    .build(),
            );
        }

        Ok(findings)
    }
}

// ============================================================================
// SECTION: Location Restriction
// ============================================================================

/// Handler for `ruleType = "location_restriction"`.
#[derive(Debug, Default)]
pub struct LocationRestrictionHandler;

impl RuleHandler for LocationRestrictionHandler {
    fn validate(
        &self,
        records: &[BillingRecord],
        rule: &Rule,
        _reference: &ReferenceSnapshot,
        run_id: RunId,
    ) -> Result<Vec<ValidationResult>, HandlerError> {
        let condition = match RuleCondition::parse(&rule.rule_type, &rule.condition) {
            Ok(RuleCondition::LocationRestriction(condition)) => condition,
            Ok(_) => {
                return Err(HandlerError("location_restriction rule resolved to a different condition type".to_string()));
            }
            Err(error) => return Err(HandlerError(error.to_string())),
        };

        let mut findings = Vec::new();
        for record in records {
            if record.code != condition.code || record.is_cabinet() == condition.requires_cabinet {
                continue;
            }

            findings.push(
                FindingBuilder::new(run_id, rule.id, Severity::Error, "location_restriction")
                    .message(format!(
                        "Le code {code} ne peut pas être facturé dans cet établissement.",
                        code = condition.code
                    ))
                    .solution("Facturer dans un établissement du type requis ou annuler.".to_string())
                    .primary_record(record.id())
                    .id_ramq(record.id_ramq.clone())
                    .monetary_impact_cents(if record.is_paid() { -record.montant_paye.unwrap_or(Money::ZERO).cents() } else { 0 })
                    .build(),
            );
        }

        Ok(findings)
    }
}

// ============================================================================
// SECTION: Age Restriction
// ============================================================================

/// Handler for `ruleType = "age_restriction"`.
///
/// Patient date of birth is not modelled in this engine's data; per
/// SPEC_FULL.md §4.2.5 this handler always returns no findings.
#[derive(Debug, Default)]
pub struct AgeRestrictionHandler;

impl RuleHandler for AgeRestrictionHandler {
    fn validate(
        &self,
        _records: &[BillingRecord],
        rule: &Rule,
        _reference: &ReferenceSnapshot,
        _run_id: RunId,
    ) -> Result<Vec<ValidationResult>, HandlerError> {
        match RuleCondition::parse(&rule.rule_type, &rule.condition) {
            Ok(RuleCondition::AgeRestriction(_)) => Ok(Vec::new()),
            Ok(_) => Err(HandlerError("age_restriction rule resolved to a different condition type".to_string())),
            Err(error) => Err(HandlerError(error.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Amount Limit
// ============================================================================

/// Handler for `ruleType = "amount_limit"`.
#[derive(Debug, Default)]
pub struct AmountLimitHandler;

impl RuleHandler for AmountLimitHandler {
    fn validate(
        &self,
        records: &[BillingRecord],
        rule: &Rule,
        _reference: &ReferenceSnapshot,
        run_id: RunId,
    ) -> Result<Vec<ValidationResult>, HandlerError> {
        let condition = match RuleCondition::parse(&rule.rule_type, &rule.condition) {
            Ok(RuleCondition::AmountLimit(condition)) => condition,
            Ok(_) => return Err(HandlerError("amount_limit rule resolved to a different condition type".to_string())),
            Err(error) => return Err(HandlerError(error.to_string())),
        };

        let mut groups: BTreeMap<String, Vec<&BillingRecord>> = BTreeMap::new();
        for record in records {
            if !condition.codes.contains(&record.code) {
                continue;
            }
            if let Some(key) = scope_key(record, condition.scope) {
                groups.entry(key).or_default().push(record);
            }
        }

        let mut findings = Vec::new();
        for members in groups.into_values() {
            let total: Money = members.iter().map(|record| record.montant_preliminaire).sum();
            if total.cents() <= condition.max_total_cents {
                continue;
            }

            let mut sorted = members;
            sorted.sort_by_key(|record| (record.date_service, record.facture.clone()));
            let mut builder = FindingBuilder::new(run_id, rule.id, Severity::Error, "amount_limit")
                .message(format!(
                    "Le total facturé ({total}) dépasse le maximum permis de {max}.",
                    max = Money::from_cents(condition.max_total_cents)
                ))
                .solution("Annuler ou réduire une des facturations pour respecter le maximum.".to_string())
                .monetary_impact_cents(-(total.cents() - condition.max_total_cents));
            if let Some(first) = sorted.first() {
                builder = builder.primary_record(first.id()).id_ramq(first.id_ramq.clone());
            }
            for member in &sorted {
                builder = builder.affected_record(member.id());
            }
            findings.push(builder.build());
        }

        Ok(findings)
    }
}

// ============================================================================
// SECTION: Mutual Exclusion
// ============================================================================

/// Handler for `ruleType = "mutual_exclusion"`.
#[derive(Debug, Default)]
pub struct MutualExclusionHandler;

impl RuleHandler for MutualExclusionHandler {
    fn validate(
        &self,
        records: &[BillingRecord],
        rule: &Rule,
        _reference: &ReferenceSnapshot,
        run_id: RunId,
    ) -> Result<Vec<ValidationResult>, HandlerError> {
        let condition = match RuleCondition::parse(&rule.rule_type, &rule.condition) {
            Ok(RuleCondition::MutualExclusion(condition)) => condition,
            Ok(_) => return Err(HandlerError("mutual_exclusion rule resolved to a different condition type".to_string())),
            Err(error) => return Err(HandlerError(error.to_string())),
        };

        let mut groups: BTreeMap<String, Vec<&BillingRecord>> = BTreeMap::new();
        for record in records {
            if !condition.codes.contains(&record.code) {
                continue;
            }
            if let Some(key) = scope_key(record, condition.scope) {
                groups.entry(key).or_default().push(record);
            }
        }

        let mut findings = Vec::new();
        for members in groups.into_values() {
            if members.len() <= 1 {
                continue;
            }

            let mut sorted = members;
            sorted.sort_by_key(|record| (record.date_service, record.facture.clone()));
            let mut builder = FindingBuilder::new(run_id, rule.id, Severity::Error, "mutual_exclusion")
                .message("Plusieurs codes mutuellement exclusifs ont été facturés dans la même portée.".to_string())
                .solution("Conserver une seule facturation parmi les codes exclusifs.".to_string())
                .monetary_impact_cents(0);
            if let Some(first) = sorted.first() {
                builder = builder.primary_record(first.id()).id_ramq(first.id_ramq.clone());
            }
            for member in &sorted {
                builder = builder.affected_record(member.id());
            }
            findings.push(builder.build());
        }

        Ok(findings)
    }
}

// ============================================================================
// SECTION: Missing Annual Opportunity
// ============================================================================

/// Handler for `ruleType = "missing_annual_opportunity"`.
#[derive(Debug, Default)]
pub struct MissingAnnualOpportunityHandler;

impl RuleHandler for MissingAnnualOpportunityHandler {
    fn validate(
        &self,
        records: &[BillingRecord],
        rule: &Rule,
        _reference: &ReferenceSnapshot,
        run_id: RunId,
    ) -> Result<Vec<ValidationResult>, HandlerError> {
        let condition = match RuleCondition::parse(&rule.rule_type, &rule.condition) {
            Ok(RuleCondition::MissingAnnualOpportunity(condition)) => condition,
            Ok(_) => {
                return Err(HandlerError(
                    "missing_annual_opportunity rule resolved to a different condition type".to_string(),
                ));
            }
            Err(error) => return Err(HandlerError(error.to_string())),
        };

        let mut per_patient_year: BTreeMap<(String, i32), Vec<&BillingRecord>> = BTreeMap::new();
        for record in records {
            let Some(patient) = record.patient.clone() else { continue };
            let Some(date) = record.date_service else { continue };
            per_patient_year.entry((patient, date.year())).or_default().push(record);
        }

        let mut findings = Vec::new();
        for ((patient, year), members) in per_patient_year {
            let has_code = members.iter().any(|record| record.code == condition.code);
            if has_code {
                continue;
            }

            let mut sorted = members;
            sorted.sort_by_key(|record| (record.date_service, record.facture.clone()));
            let mut builder = FindingBuilder::new(run_id, rule.id, Severity::Info, "missing_annual_opportunity")
                .message(format!(
                    "Le patient {patient} n'a pas reçu le code {code} en {year}, une occasion manquée.",
                    code = condition.code
                ))
                .solution(format!("Évaluer si le code {code} est applicable à ce patient.", code = condition.code))
                .monetary_impact_cents(0)
                .extra("patient", serde_json::json!(patient))
                .extra("year", serde_json::json!(year))
                .extra("expectedCode", serde_json::json!(condition.code))
                .extra("potentialTariff", serde_json::json!(Money::from_cents(condition.tariff_cents).as_f64()));
            for member in &sorted {
                builder = builder.affected_record(member.id());
            }
            findings.push(builder.build());
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use ramq_core::RecordNumber;
    use ramq_core::RuleId;
    use ramq_core::ServiceDate;

    use super::*;

    fn record(code: &str, patient: &str, facture: &str) -> BillingRecord {
        BillingRecord {
            validation_run_id: RunId::new_random(),
            record_number: RecordNumber::from_raw(1).expect("nonzero"),
            facture: facture.to_string(),
            id_ramq: "R1".to_string(),
            date_service_raw: "2025-02-06".to_string(),
            date_service: ServiceDate::parse("2025-02-06").ok(),
            debut: ClockTime::parse("10:00").ok(),
            fin: None,
            periode: String::new(),
            lieu_pratique: "50012".to_string(),
            secteur_activite: String::new(),
            diagnostic: String::new(),
            code: code.to_string(),
            unites: String::new(),
            role: String::new(),
            element_contexte: None,
            montant_preliminaire: Money::ZERO,
            montant_paye: None,
            doctor_info: Some("DOC1".to_string()),
            patient: Some(patient.to_string()),
            custom_fields: BTreeMap::new(),
        }
    }

    fn paid_record(code: &str, patient: &str, facture: &str, cents: i64) -> BillingRecord {
        let mut record = record(code, patient, facture);
        record.montant_paye = Some(Money::from_cents(cents));
        record
    }

    fn record_with_preliminaire(code: &str, patient: &str, facture: &str, cents: i64) -> BillingRecord {
        let mut record = record(code, patient, facture);
        record.montant_preliminaire = Money::from_cents(cents);
        record
    }

    fn rule(rule_type: &str, condition: serde_json::Value) -> Rule {
        Rule {
            id: RuleId::new_random(),
            name: rule_type.to_string(),
            rule_type: rule_type.to_string(),
            category: "declarative".to_string(),
            condition,
            threshold: None,
            enabled: true,
            custom_fields: BTreeMap::new(),
        }
    }

    #[test]
    fn prohibition_flags_cooccurring_codes_in_scope() {
        let records = vec![record("X1", "PAT1", "F1"), record("Y1", "PAT1", "F1")];
        let condition = serde_json::json!({"scope": "patient", "codesX": ["X1"], "codesY": ["Y1"]});
        let handler = ProhibitionHandler;
        let reference = ReferenceSnapshot::default();
        let findings =
            handler.validate(&records, &rule("prohibition", condition), &reference, RunId::new_random()).unwrap();
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn requirement_flags_missing_companion_code() {
        let records = vec![record("X1", "PAT1", "F1")];
        let condition = serde_json::json!({"scope": "patient", "requiredBy": "X1", "requires": "Y1"});
        let handler = RequirementHandler;
        let reference = ReferenceSnapshot::default();
        let findings =
            handler.validate(&records, &rule("requirement", condition), &reference, RunId::new_random()).unwrap();
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn mutual_exclusion_flags_more_than_one_member_in_scope() {
        let records = vec![record("A", "PAT1", "F1"), record("B", "PAT1", "F1")];
        let condition = serde_json::json!({"scope": "patient", "codes": ["A", "B"]});
        let handler = MutualExclusionHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler
            .validate(&records, &rule("mutual_exclusion", condition), &reference, RunId::new_random())
            .unwrap();
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn missing_annual_opportunity_flags_absent_code_for_the_year() {
        let records = vec![record("OTHER", "PAT1", "F1")];
        let condition = serde_json::json!({"code": "ANNUAL1", "tariffCents": 4_000});
        let handler = MissingAnnualOpportunityHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler
            .validate(&records, &rule("missing_annual_opportunity", condition), &reference, RunId::new_random())
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Info);
    }

    #[test]
    fn age_restriction_never_produces_findings() {
        let records = vec![record("X1", "PAT1", "F1")];
        let condition = serde_json::json!({"code": "X1", "minAge": 18, "maxAge": null});
        let handler = AgeRestrictionHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler
            .validate(&records, &rule("age_restriction", condition), &reference, RunId::new_random())
            .unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn time_restriction_flags_a_paid_billing_outside_the_window() {
        let records = vec![paid_record("X1", "PAT1", "F1", 4_000)];
        let condition = serde_json::json!({"code": "X1", "windowStart": "13:00", "windowEnd": "17:00"});
        let handler = TimeRestrictionHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler
            .validate(&records, &rule("time_restriction", condition), &reference, RunId::new_random())
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert!((findings[0].monetary_impact() - (-40.0)).abs() < 0.001);
    }

    #[test]
    fn time_restriction_allows_a_billing_inside_the_window() {
        let records = vec![paid_record("X1", "PAT1", "F1", 4_000)];
        let condition = serde_json::json!({"code": "X1", "windowStart": "09:00", "windowEnd": "11:00"});
        let handler = TimeRestrictionHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler
            .validate(&records, &rule("time_restriction", condition), &reference, RunId::new_random())
            .unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn location_restriction_flags_a_cabinet_billing_when_cabinet_is_disallowed() {
        let records = vec![paid_record("X1", "PAT1", "F1", 4_000)];
        let condition = serde_json::json!({"code": "X1", "requiresCabinet": false});
        let handler = LocationRestrictionHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler
            .validate(&records, &rule("location_restriction", condition), &reference, RunId::new_random())
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert!((findings[0].monetary_impact() - (-40.0)).abs() < 0.001);
    }

    #[test]
    fn location_restriction_allows_a_cabinet_billing_when_cabinet_is_required() {
        let records = vec![paid_record("X1", "PAT1", "F1", 4_000)];
        let condition = serde_json::json!({"code": "X1", "requiresCabinet": true});
        let handler = LocationRestrictionHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler
            .validate(&records, &rule("location_restriction", condition), &reference, RunId::new_random())
            .unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn amount_limit_flags_a_scope_total_over_the_maximum() {
        let records = vec![
            record_with_preliminaire("X1", "PAT1", "F1", 4_000),
            record_with_preliminaire("X1", "PAT1", "F2", 3_000),
        ];
        let condition = serde_json::json!({"scope": "patient", "codes": ["X1"], "maxTotalCents": 6_000});
        let handler = AmountLimitHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler
            .validate(&records, &rule("amount_limit", condition), &reference, RunId::new_random())
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert!((findings[0].monetary_impact() - (-10.0)).abs() < 0.001);
    }

    #[test]
    fn amount_limit_allows_a_scope_total_at_the_maximum() {
        let records = vec![
            record_with_preliminaire("X1", "PAT1", "F1", 4_000),
            record_with_preliminaire("X1", "PAT1", "F2", 2_000),
        ];
        let condition = serde_json::json!({"scope": "patient", "codes": ["X1"], "maxTotalCents": 6_000});
        let handler = AmountLimitHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler
            .validate(&records, &rule("amount_limit", condition), &reference, RunId::new_random())
            .unwrap();
        assert!(findings.is_empty());
    }
}
