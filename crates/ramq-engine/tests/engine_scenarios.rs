// crates/ramq-engine/tests/engine_scenarios.rs
// ============================================================================
// Black-box tests: ValidationEngine end-to-end over a multi-rule record set.
// ============================================================================

//! Black-box tests: `ValidationEngine` end-to-end over a multi-rule record set.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use ramq_core::BillingRecord;
use ramq_core::Money;
use ramq_core::RecordNumber;
use ramq_core::ReferenceSnapshot;
use ramq_core::Rule;
use ramq_core::RuleId;
use ramq_core::RunId;
use ramq_core::ServiceDate;
use ramq_core::Severity;
use ramq_engine::ValidationEngine;

fn record(record_number: u32, code: &str, patient: &str) -> BillingRecord {
    BillingRecord {
        validation_run_id: RunId::new_random(),
        record_number: RecordNumber::from_raw(record_number).expect("nonzero"),
        facture: format!("F{record_number}"),
        id_ramq: format!("R{record_number}"),
        date_service_raw: "2025-02-06".to_string(),
        date_service: ServiceDate::parse("2025-02-06").ok(),
        debut: None,
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
        montant_paye: Some(Money::ZERO),
        doctor_info: Some("DOC1".to_string()),
        patient: Some(patient.to_string()),
        custom_fields: BTreeMap::new(),
    }
}

fn daily_time_limit_rule() -> Rule {
    Rule {
        id: RuleId::new_random(),
        name: "Plafond quotidien".to_string(),
        rule_type: "daily_time_limit".to_string(),
        category: "intervention_clinique".to_string(),
        condition: serde_json::json!({
            "primaryCode": "8857",
            "primaryMinutes": 30,
            "secondaryCode": "8859",
            "dailyMaxMinutes": 180,
        }),
        threshold: None,
        enabled: true,
        custom_fields: BTreeMap::new(),
    }
}

fn annual_limit_rule() -> Rule {
    Rule {
        id: RuleId::new_random(),
        name: "Plafond annuel".to_string(),
        rule_type: "annual_limit".to_string(),
        category: "annual_limit".to_string(),
        condition: serde_json::json!({ "codes": ["9000"] }),
        threshold: None,
        enabled: true,
        custom_fields: BTreeMap::new(),
    }
}

fn reference() -> ReferenceSnapshot {
    ReferenceSnapshot::build(Vec::new(), Vec::new(), BTreeSet::new(), Vec::new())
}

#[test]
fn multiple_rules_run_and_findings_stay_in_registration_order() {
    let mut engine = ValidationEngine::new();
    engine.register_rule(daily_time_limit_rule());
    engine.register_rule(annual_limit_rule());

    let mut records: Vec<BillingRecord> = (1..=7).map(|index| record(index, "8857", "PATX")).collect();
    records.push(record(8, "9000", "PAT1"));
    records.push(record(9, "9000", "PAT1"));

    let findings = engine.validate_records(&records, &reference(), RunId::new_random());

    assert_eq!(findings.len(), 2);
    assert_eq!(findings[0].category, "daily_time_limit");
    assert_eq!(findings[0].severity, Severity::Error);
    assert_eq!(findings[1].category, "annual_limit");
}

#[test]
fn a_rule_with_no_matching_records_contributes_nothing() {
    let mut engine = ValidationEngine::new();
    engine.register_rule(annual_limit_rule());

    let records = vec![record(1, "8857", "PAT1")];
    let findings = engine.validate_records(&records, &reference(), RunId::new_random());
    assert!(findings.is_empty());
}

#[test]
fn clearing_rules_stops_further_findings() {
    let mut engine = ValidationEngine::new();
    engine.register_rule(annual_limit_rule());
    engine.clear_rules();

    let mut records = vec![record(1, "9000", "PAT1")];
    records.push(record(2, "9000", "PAT1"));
    let findings = engine.validate_records(&records, &reference(), RunId::new_random());
    assert!(findings.is_empty());
}
