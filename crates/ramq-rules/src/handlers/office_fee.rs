// crates/ramq-rules/src/handlers/office_fee.rs
// ============================================================================
// Module: Office Fee Handler
// Description: Validates and optimizes office-fee billings (codes 19928/19929).
// Purpose: Implement SPEC_FULL.md §4.2.2.
// Dependencies: ramq-core, crate::{condition, finding}
// ============================================================================

//! ## Overview
//! Per `(doctorInfo, dateService)` this handler counts paid/unpaid,
//! registered/walk-in patient visits, then checks every office-fee record
//! in that group against the relevant threshold, the combined daily
//! maximum, and finally whether a higher tariff or a second claim would
//! have been achievable. Scenario identifiers below are referenced by
//! SPEC_FULL.md §8's end-to-end scenarios C and D.

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
use ramq_core::ServiceDate;
use ramq_core::Severity;
use ramq_core::ValidationResult;

use crate::condition::OfficeFeeCondition;
use crate::condition::RuleCondition;
use crate::finding::FindingBuilder;

/// Stable scenario identifiers, referenced by the ledger and by tests.
mod scenario {
    /// Office fee billed at a non-cabinet establishment.
    pub const LOCATION: &str = "E1_LOCATION";
    /// Claimed group's paid-visit count does not meet the code's threshold.
    pub const THRESHOLD_NOT_MET: &str = "E2_THRESHOLD_NOT_MET";
    /// Combined paid office-fee total for the group exceeds the daily maximum.
    pub const DAILY_MAX_EXCEEDED: &str = "E5_DAILY_MAX_EXCEEDED";
    /// Directed cancellation: the other group already qualifies for the higher tariff.
    pub const DIRECTED_CANCEL_UPGRADE: &str = "E6_DIRECTED_CANCEL";
    /// Directed cancellation: both codes billed together push the group over the maximum.
    pub const DIRECTED_CANCEL_OVER_MAX: &str = "E8_DIRECTED_CANCEL_OVER_MAX";
    /// Threshold met, under the daily maximum, no better option available.
    pub const PASS: &str = "PASS";
    /// Suggest replacing the lower-tier code with the higher-tier code.
    pub const UPGRADE: &str = "O1_UPGRADE";
    /// Suggest billing a second office fee in the other, also-qualifying group.
    pub const ADD_SECOND: &str = "O1_ADD_SECOND";
}

/// Handler for `ruleType = "office_fee"` (SPEC_FULL.md §4.2.2).
#[derive(Debug, Default)]
pub struct OfficeFeeHandler;

/// Whether a visit or office-fee record belongs to the registered or walk-in group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitGroup {
    /// Patient is registered with the practice.
    Registered,
    /// Patient presented without an appointment.
    WalkIn,
}

/// Per-(doctor, date) tallies of patient visits, excluding office-fee records themselves.
#[derive(Debug, Default, Clone, Copy)]
struct GroupCounts {
    /// Paid, registered patient visits.
    registered_paid: u32,
    /// Unpaid, registered patient visits.
    registered_unpaid: u32,
    /// Paid, walk-in patient visits.
    walk_in_paid: u32,
    /// Unpaid, walk-in patient visits.
    walk_in_unpaid: u32,
}

impl GroupCounts {
    /// Returns the paid count for `group`.
    const fn paid(&self, group: VisitGroup) -> u32 {
        match group {
            VisitGroup::Registered => self.registered_paid,
            VisitGroup::WalkIn => self.walk_in_paid,
        }
    }
}

impl RuleHandler for OfficeFeeHandler {
    fn validate(
        &self,
        records: &[BillingRecord],
        rule: &Rule,
        reference: &ReferenceSnapshot,
        run_id: RunId,
    ) -> Result<Vec<ValidationResult>, HandlerError> {
        let condition = match RuleCondition::parse(&rule.rule_type, &rule.condition) {
            Ok(RuleCondition::OfficeFee(condition)) => condition,
            Ok(_) => return Err(HandlerError("office_fee rule resolved to a different condition type".to_string())),
            Err(error) => return Err(HandlerError(error.to_string())),
        };

        let mut counts: BTreeMap<(String, ServiceDate), GroupCounts> = BTreeMap::new();
        let mut office_fees: BTreeMap<(String, ServiceDate), Vec<&BillingRecord>> = BTreeMap::new();

        for record in records {
            let Some(doctor) = record.doctor_info.clone() else { continue };
            let Some(date) = record.date_service else { continue };
            let key = (doctor, date);

            if record.code == condition.code_a || record.code == condition.code_b {
                office_fees.entry(key).or_default().push(record);
                continue;
            }

            let group = classify_group(record, &condition.walk_in_contexts);
            let entry = counts.entry(key).or_default();
            match (group, record.is_paid()) {
                (VisitGroup::Registered, true) => entry.registered_paid += 1,
                (VisitGroup::Registered, false) => entry.registered_unpaid += 1,
                (VisitGroup::WalkIn, true) => entry.walk_in_paid += 1,
                (VisitGroup::WalkIn, false) => entry.walk_in_unpaid += 1,
            }
        }

        let mut findings = Vec::new();
        for (key, fees) in office_fees {
            let group_counts = counts.get(&key).copied().unwrap_or_default();
            let combined_paid: Money =
                fees.iter().filter(|record| record.is_paid()).filter_map(|record| record.montant_paye).sum();
            let combined_billed: Money =
                fees.iter().map(|record| tariff_for_code(&condition, &record.code, reference)).sum();
            let both_codes_billed = fees.iter().any(|record| record.code == condition.code_a)
                && fees.iter().any(|record| record.code == condition.code_b);
            for fee in &fees {
                findings.push(evaluate_fee(
                    fee,
                    &condition,
                    &group_counts,
                    combined_paid,
                    combined_billed,
                    both_codes_billed,
                    reference,
                    rule,
                    run_id,
                ));
            }
        }

        Ok(findings)
    }
}

/// Classifies `record`'s group by intersecting its context tokens with
/// `walk_in_contexts`, tolerating a leading `#` on either side.
fn classify_group(record: &BillingRecord, walk_in_contexts: &BTreeSet<String>) -> VisitGroup {
    let normalized: BTreeSet<String> =
        walk_in_contexts.iter().map(|context| context.trim_start_matches('#').to_string()).collect();
    let is_walk_in = record
        .context_tokens()
        .iter()
        .any(|token| normalized.contains(token.trim_start_matches('#')));
    if is_walk_in { VisitGroup::WalkIn } else { VisitGroup::Registered }
}

/// Returns the billed tariff for `code` under `condition`, falling back to
/// the standard 32.40/64.80 tariffs when the reference snapshot has no
/// matching code (e.g. in tests that don't populate one).
fn tariff_for_code(condition: &OfficeFeeCondition, code: &str, reference: &ReferenceSnapshot) -> Money {
    if code == condition.code_a {
        reference.code(&condition.code_a).map_or(Money::from_cents(3_240), |c| c.tariff)
    } else {
        reference.code(&condition.code_b).map_or(Money::from_cents(6_480), |c| c.tariff)
    }
}

/// Evaluates one office-fee record against its group's counts.
fn evaluate_fee(
    fee: &BillingRecord,
    condition: &OfficeFeeCondition,
    counts: &GroupCounts,
    combined_paid: Money,
    combined_billed: Money,
    both_codes_billed: bool,
    reference: &ReferenceSnapshot,
    rule: &Rule,
    run_id: RunId,
) -> ValidationResult {
    if !fee.is_cabinet() {
        return FindingBuilder::new(run_id, rule.id, Severity::Error, "office_fee")
            .message(format!(
                "Le frais de bureau {code} a été facturé dans un établissement qui n'est pas un cabinet.",
                code = fee.code
            ))
            .solution("Annuler ce frais de bureau ou le refacturer dans un cabinet.".to_string())
            .primary_record(fee.id())
            .id_ramq(fee.id_ramq.clone())
            .extra("scenarioId", serde_json::json!(scenario::LOCATION))
            .monetary_impact_cents(if fee.is_paid() { -fee.montant_paye.unwrap_or(Money::ZERO).cents() } else { 0 })
            .build();
    }

    let group = classify_group(fee, &condition.walk_in_contexts);
    let (required, is_code_a) = threshold_for(condition, fee.code.as_str(), group);
    let actual = counts.paid(group);

    if actual < required {
        return FindingBuilder::new(run_id, rule.id, Severity::Error, "office_fee")
            .message(format!(
                "Le frais de bureau {code} requiert {required} visites payées mais seulement {actual} ont été \
                 comptabilisées.",
                code = fee.code
            ))
            .solution("Annuler ce frais de bureau tant que le seuil n'est pas atteint.".to_string())
            .primary_record(fee.id())
            .id_ramq(fee.id_ramq.clone())
            .extra("scenarioId", serde_json::json!(scenario::THRESHOLD_NOT_MET))
            .extra("required", serde_json::json!(required))
            .extra("actual", serde_json::json!(actual))
            .monetary_impact_cents(if fee.is_paid() { -fee.montant_paye.unwrap_or(Money::ZERO).cents() } else { 0 })
            .build();
    }

    let tariff_a = tariff_for_code(condition, &condition.code_a, reference);
    let tariff_b = tariff_for_code(condition, &condition.code_b, reference);
    let this_tariff = if is_code_a { tariff_a } else { tariff_b };

    if combined_billed.cents() > condition.daily_max_cents {
        let fee_paid_cents = if fee.is_paid() { fee.montant_paye.unwrap_or(Money::ZERO).cents() } else { 0 };

        if both_codes_billed && fee.code == condition.code_a {
            return FindingBuilder::new(run_id, rule.id, Severity::Error, "office_fee")
                .message(format!(
                    "Le code {code_b} est déjà facturé pour ce groupe; {code_a} devient redondant et fait \
                     dépasser le maximum quotidien.",
                    code_a = condition.code_a,
                    code_b = condition.code_b,
                ))
                .solution(format!("Annuler {code_a}.", code_a = condition.code_a))
                .primary_record(fee.id())
                .id_ramq(fee.id_ramq.clone())
                .extra("scenarioId", serde_json::json!(scenario::DIRECTED_CANCEL_UPGRADE))
                .monetary_impact_cents(-fee_paid_cents)
                .build();
        }
        if both_codes_billed {
            return FindingBuilder::new(run_id, rule.id, Severity::Error, "office_fee")
                .message(format!(
                    "Les codes {code_a} et {code_b} facturés ensemble dépassent le maximum quotidien de {max} $.",
                    code_a = condition.code_a,
                    code_b = condition.code_b,
                    max = Money::from_cents(condition.daily_max_cents),
                ))
                .solution(format!("Annuler {code_a} et conserver uniquement {code_b}.", code_a = condition.code_a, code_b = condition.code_b))
                .primary_record(fee.id())
                .id_ramq(fee.id_ramq.clone())
                .extra("scenarioId", serde_json::json!(scenario::DIRECTED_CANCEL_OVER_MAX))
                .monetary_impact_cents(-fee_paid_cents)
                .build();
        }

        return FindingBuilder::new(run_id, rule.id, Severity::Error, "office_fee")
            .message(format!(
                "Le total des frais de bureau payés pour cette journée dépasse le maximum quotidien de {max} $.",
                max = Money::from_cents(condition.daily_max_cents)
            ))
            .solution("Annuler l'un des frais de bureau facturés ce jour-là.".to_string())
            .primary_record(fee.id())
            .id_ramq(fee.id_ramq.clone())
            .extra("scenarioId", serde_json::json!(scenario::DAILY_MAX_EXCEEDED))
            .monetary_impact_cents(-combined_paid.cents())
            .build();
    }

    if is_code_a {
        let upgrade_threshold = match group {
            VisitGroup::Registered => condition.registered_threshold_b,
            VisitGroup::WalkIn => condition.walk_in_threshold_b,
        };
        let gain = tariff_b - tariff_a;
        if actual >= upgrade_threshold && this_tariff.cents() + gain.cents() <= condition.daily_max_cents {
            return FindingBuilder::new(run_id, rule.id, Severity::Optimization, "office_fee")
                .message(format!(
                    "Le nombre de visites payées ({actual}) admet le code {code_b} au lieu de {code_a}.",
                    code_a = condition.code_a,
                    code_b = condition.code_b,
                ))
                .solution(format!("Remplacer {code_a} par {code_b}.", code_a = condition.code_a, code_b = condition.code_b))
                .primary_record(fee.id())
                .id_ramq(fee.id_ramq.clone())
                .extra("scenarioId", serde_json::json!(scenario::UPGRADE))
                .extra("currentCode", serde_json::json!(condition.code_a))
                .extra("suggestedCode", serde_json::json!(condition.code_b))
                .monetary_impact_cents(gain.cents())
                .build();
        }

        let other_group = match group {
            VisitGroup::Registered => VisitGroup::WalkIn,
            VisitGroup::WalkIn => VisitGroup::Registered,
        };
        let other_threshold = match other_group {
            VisitGroup::Registered => condition.registered_threshold_a,
            VisitGroup::WalkIn => condition.walk_in_threshold_a,
        };
        if counts.paid(other_group) >= other_threshold && this_tariff.cents() + tariff_a.cents() <= condition.daily_max_cents
        {
            return FindingBuilder::new(run_id, rule.id, Severity::Optimization, "office_fee")
                .message(format!(
                    "Le groupe {other_group:?} admet également un frais de bureau {code_a} distinct.",
                    code_a = condition.code_a
                ))
                .solution(format!("Facturer un second {code_a} pour l'autre groupe de visites.", code_a = condition.code_a))
                .primary_record(fee.id())
                .id_ramq(fee.id_ramq.clone())
                .extra("scenarioId", serde_json::json!(scenario::ADD_SECOND))
                .extra("currentCode", serde_json::json!(condition.code_a))
                .monetary_impact_cents(tariff_a.cents())
                .build();
        }
    }

    FindingBuilder::new(run_id, rule.id, Severity::Info, "office_fee")
        .message(format!("Le frais de bureau {code} respecte le seuil et le maximum quotidien.", code = fee.code))
        .primary_record(fee.id())
        .id_ramq(fee.id_ramq.clone())
        .extra("scenarioId", serde_json::json!(scenario::PASS))
        .extra("registeredUnpaid", serde_json::json!(counts.registered_unpaid))
        .extra("walkInUnpaid", serde_json::json!(counts.walk_in_unpaid))
        .build()
}

/// Returns `(required paid count, is code_a)` for `code` in `group`.
fn threshold_for(condition: &OfficeFeeCondition, code: &str, group: VisitGroup) -> (u32, bool) {
    if code == condition.code_a {
        let required = match group {
            VisitGroup::Registered => condition.registered_threshold_a,
            VisitGroup::WalkIn => condition.walk_in_threshold_a,
        };
        (required, true)
    } else {
        let required = match group {
            VisitGroup::Registered => condition.registered_threshold_b,
            VisitGroup::WalkIn => condition.walk_in_threshold_b,
        };
        (required, false)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use ramq_core::RecordNumber;
    use ramq_core::RuleId;

    use super::*;

    fn visit(record_number: u32, paid: bool) -> BillingRecord {
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
            code: "00103".to_string(),
            unites: String::new(),
            role: String::new(),
            element_contexte: None,
            montant_preliminaire: Money::ZERO,
            montant_paye: if paid { Some(Money::from_cents(3_000)) } else { None },
            doctor_info: Some("DOC1".to_string()),
            patient: Some(format!("PAT{record_number}")),
            custom_fields: BTreeMap::new(),
        }
    }

    fn office_fee(record_number: u32, code: &str, paid: bool) -> BillingRecord {
        let mut record = visit(record_number, paid);
        record.code = code.to_string();
        if paid {
            record.montant_paye = Some(match code {
                "19928" => Money::from_cents(3_240),
                "19929" => Money::from_cents(6_480),
                _ => Money::from_cents(3_000),
            });
        }
        record
    }

    fn rule() -> Rule {
        Rule {
            id: RuleId::new_random(),
            name: "Frais de bureau".to_string(),
            rule_type: "office_fee".to_string(),
            category: "office_fee".to_string(),
            condition: serde_json::Value::Null,
            threshold: None,
            enabled: true,
            custom_fields: BTreeMap::new(),
        }
    }

    #[test]
    fn scenario_c_five_paid_registered_is_below_threshold() {
        let mut records: Vec<BillingRecord> = (1..=5).map(|index| visit(index, true)).collect();
        records.push(office_fee(6, "19928", false));

        let handler = OfficeFeeHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_data.get("scenarioId"), Some(&serde_json::json!(scenario::THRESHOLD_NOT_MET)));
        assert_eq!(findings[0].rule_data.get("required"), Some(&serde_json::json!(6)));
        assert_eq!(findings[0].rule_data.get("actual"), Some(&serde_json::json!(5)));
        assert!((findings[0].monetary_impact() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn scenario_d_fifteen_paid_registered_upgrades_to_code_b() {
        let mut records: Vec<BillingRecord> = (1..=15).map(|index| visit(index, true)).collect();
        records.push(office_fee(16, "19928", true));

        let handler = OfficeFeeHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_data.get("scenarioId"), Some(&serde_json::json!(scenario::UPGRADE)));
        assert!((findings[0].monetary_impact() - 32.40).abs() < 0.001);
    }

    #[test]
    fn non_cabinet_establishment_is_always_an_error() {
        let mut records: Vec<BillingRecord> = (1..=10).map(|index| visit(index, true)).collect();
        let mut fee = office_fee(11, "19928", false);
        fee.lieu_pratique = "10012".to_string();
        records.push(fee);

        let handler = OfficeFeeHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();
        assert_eq!(findings[0].rule_data.get("scenarioId"), Some(&serde_json::json!(scenario::LOCATION)));
    }

    fn walk_in_visit(record_number: u32, paid: bool) -> BillingRecord {
        let mut record = visit(record_number, paid);
        record.element_contexte = Some("G160".to_string());
        record
    }

    fn walk_in_office_fee(record_number: u32, code: &str, paid: bool) -> BillingRecord {
        let mut record = walk_in_visit(record_number, paid);
        record.code = code.to_string();
        record
    }

    #[test]
    fn e6_directed_cancel_upgrade_fires_regardless_of_payment_status() {
        // 15 paid registered visits qualify both codes; the doctor bills
        // code_a (paid) alongside code_b (unpaid) the same day. Both-codes-
        // billed must be detected from presence, not from paid totals.
        let mut records: Vec<BillingRecord> = (1..=15).map(|index| visit(index, true)).collect();
        records.push(office_fee(16, "19928", true));
        records.push(office_fee(17, "19929", false));

        let handler = OfficeFeeHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();

        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].rule_data.get("scenarioId"), Some(&serde_json::json!(scenario::DIRECTED_CANCEL_UPGRADE)));
        assert!((findings[0].monetary_impact() - (-32.40)).abs() < 0.001);
        assert_eq!(findings[1].rule_data.get("scenarioId"), Some(&serde_json::json!(scenario::DIRECTED_CANCEL_OVER_MAX)));
        assert!((findings[1].monetary_impact() - 0.0).abs() < f64::EPSILON, "unpaid code_b carries no monetary impact");
    }

    #[test]
    fn e8_directed_cancel_over_max_fires_when_both_codes_are_paid() {
        let mut records: Vec<BillingRecord> = (1..=15).map(|index| visit(index, true)).collect();
        records.push(office_fee(16, "19928", true));
        records.push(office_fee(17, "19929", true));

        let handler = OfficeFeeHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();

        assert_eq!(findings.len(), 2);
        assert_eq!(findings[1].rule_data.get("scenarioId"), Some(&serde_json::json!(scenario::DIRECTED_CANCEL_OVER_MAX)));
        assert!((findings[1].monetary_impact() - (-64.80)).abs() < 0.001);
    }

    #[test]
    fn e5_daily_max_exceeded_from_the_same_code_billed_twice() {
        // Two code_b claims same day/doctor: 129.60 combined billed, over
        // the 64.80 default maximum, with no second distinct code involved.
        let mut records: Vec<BillingRecord> = (1..=15).map(|index| visit(index, true)).collect();
        records.push(office_fee(16, "19929", true));
        records.push(office_fee(17, "19929", true));

        let handler = OfficeFeeHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();

        assert_eq!(findings.len(), 2);
        for finding in &findings {
            assert_eq!(finding.rule_data.get("scenarioId"), Some(&serde_json::json!(scenario::DAILY_MAX_EXCEEDED)));
        }
    }

    #[test]
    fn boundary_registered_a_exactly_six_paid_passes_threshold() {
        let mut records: Vec<BillingRecord> = (1..=6).map(|index| visit(index, true)).collect();
        records.push(office_fee(7, "19928", true));

        let handler = OfficeFeeHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_data.get("scenarioId"), Some(&serde_json::json!(scenario::PASS)));
    }

    #[test]
    fn boundary_registered_b_exactly_twelve_paid_upgrades() {
        let mut records: Vec<BillingRecord> = (1..=12).map(|index| visit(index, true)).collect();
        records.push(office_fee(13, "19928", true));

        let handler = OfficeFeeHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_data.get("scenarioId"), Some(&serde_json::json!(scenario::UPGRADE)));
    }

    #[test]
    fn boundary_registered_b_eleven_paid_does_not_upgrade() {
        let mut records: Vec<BillingRecord> = (1..=11).map(|index| visit(index, true)).collect();
        records.push(office_fee(12, "19928", true));

        let handler = OfficeFeeHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_data.get("scenarioId"), Some(&serde_json::json!(scenario::PASS)));
    }

    #[test]
    fn boundary_walk_in_a_nine_paid_fails_threshold() {
        let mut records: Vec<BillingRecord> = (1..=9).map(|index| walk_in_visit(index, true)).collect();
        records.push(walk_in_office_fee(10, "19928", true));

        let handler = OfficeFeeHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_data.get("scenarioId"), Some(&serde_json::json!(scenario::THRESHOLD_NOT_MET)));
    }

    #[test]
    fn boundary_walk_in_a_exactly_ten_paid_passes_threshold() {
        let mut records: Vec<BillingRecord> = (1..=10).map(|index| walk_in_visit(index, true)).collect();
        records.push(walk_in_office_fee(11, "19928", true));

        let handler = OfficeFeeHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_data.get("scenarioId"), Some(&serde_json::json!(scenario::PASS)));
    }

    #[test]
    fn boundary_walk_in_b_exactly_twenty_paid_upgrades() {
        let mut records: Vec<BillingRecord> = (1..=20).map(|index| walk_in_visit(index, true)).collect();
        records.push(walk_in_office_fee(21, "19928", true));

        let handler = OfficeFeeHandler;
        let reference = ReferenceSnapshot::default();
        let findings = handler.validate(&records, &rule(), &reference, RunId::new_random()).unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_data.get("scenarioId"), Some(&serde_json::json!(scenario::UPGRADE)));
    }
}
