// crates/ramq-rules/src/handlers/daily_time_limit.rs
// ============================================================================
// Module: Daily Time Limit Handler
// Description: Flags a doctor's intervention-clinique minutes exceeding the
//              daily cap on a single calendar date.
// Purpose: Implement SPEC_FULL.md §4.2.1.
// Dependencies: ramq-core, crate::{condition, finding}
// ============================================================================

//! ## Overview
//! Groups billing records by `(doctorInfo, dateService)` and sums minutes
//! attributed to a fixed-duration primary code and a `unites`-driven
//! secondary code, excluding records tagged with an excluded context.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use ramq_core::BillingRecord;
use ramq_core::HandlerError;
use ramq_core::ReferenceSnapshot;
use ramq_core::Rule;
use ramq_core::RuleHandler;
use ramq_core::RunId;
use ramq_core::ServiceDate;
use ramq_core::Severity;
use ramq_core::ValidationResult;

use crate::condition::RuleCondition;
use crate::finding::FindingBuilder;

// ============================================================================
// SECTION: Handler
// ============================================================================

/// Handler for `ruleType = "daily_time_limit"` (SPEC_FULL.md §4.2.1).
#[derive(Debug, Default)]
pub struct DailyTimeLimitHandler;

/// One group's accumulated state: `(doctorInfo, date)` key plus running tallies.
struct GroupAccumulator<'a> {
    /// Members contributing to this group, in input order.
    members: Vec<&'a BillingRecord>,
    /// Minutes attributed to the primary code.
    primary_minutes: u32,
    /// Minutes attributed to the secondary code.
    secondary_minutes: u32,
}

impl RuleHandler for DailyTimeLimitHandler {
    fn validate(
        &self,
        records: &[BillingRecord],
        rule: &Rule,
        _reference: &ReferenceSnapshot,
        run_id: RunId,
    ) -> Result<Vec<ValidationResult>, HandlerError> {
        let condition = match RuleCondition::parse(&rule.rule_type, &rule.condition) {
            Ok(RuleCondition::DailyTimeLimit(condition)) => condition,
            Ok(_) => return Err(HandlerError("daily_time_limit rule resolved to a different condition type".to_string())),
            Err(error) => return Err(HandlerError(error.to_string())),
        };

        let mut groups: BTreeMap<(String, ServiceDate), GroupAccumulator<'_>> = BTreeMap::new();

        for record in records {
            if record.code != condition.primary_code && record.code != condition.secondary_code {
                continue;
            }
            if is_excluded(record, &condition.excluded_contexts) {
                continue;
            }
            let Some(doctor) = record.doctor_info.clone() else { continue };
            let Some(date) = record.date_service else { continue };

            let accumulator = groups.entry((doctor, date)).or_insert_with(|| GroupAccumulator {
                members: Vec::new(),
                primary_minutes: 0,
                secondary_minutes: 0,
            });
            accumulator.members.push(record);
            if record.code == condition.primary_code {
                accumulator.primary_minutes += condition.primary_minutes;
            } else {
                accumulator.secondary_minutes += record.unites_as_non_negative_int();
            }
        }

        let mut findings = Vec::new();
        for ((doctor, date), accumulator) in groups {
            let total = accumulator.primary_minutes + accumulator.secondary_minutes;
            if total <= condition.daily_max_minutes {
                continue;
            }

            let mut ordered = accumulator.members;
            ordered.sort_by_key(|record| (record.date_service, record.debut));
            let earliest = ordered.first().copied();

            let paid_at_risk: ramq_core::Money =
                ordered.iter().filter(|record| record.is_paid()).filter_map(|record| record.montant_paye).sum();

            let excess = total - condition.daily_max_minutes;
            let mut builder = FindingBuilder::new(run_id, rule.id, Severity::Error, "daily_time_limit")
                .message(format!(
                    "Le {date} le médecin {doctor} a facturé {total} minutes d'intervention clinique, \
                     dépassant le maximum quotidien de {max} minutes ({excess} minutes en trop).",
                    max = condition.daily_max_minutes
                ))
                .solution(
                    "Ajouter un contexte exclu (ICEP, ICSM, ICTOX) aux interventions admissibles ou annuler \
                     suffisamment de minutes pour respecter le maximum quotidien."
                        .to_string(),
                )
                .extra("totalMinutes", serde_json::json!(total))
                .extra("limit", serde_json::json!(condition.daily_max_minutes))
                .extra("excessMinutes", serde_json::json!(excess))
                .extra("code8857Minutes", serde_json::json!(accumulator.primary_minutes))
                .extra("code8859Minutes", serde_json::json!(accumulator.secondary_minutes))
                .extra("recordCount", serde_json::json!(ordered.len()))
                .extra("date", serde_json::json!(date.to_string()))
                .monetary_impact_cents(-paid_at_risk.cents());

            if let Some(first) = earliest {
                builder = builder.primary_record(first.id());
            }
            for member in &ordered {
                builder = builder.affected_record(member.id());
            }

            findings.push(builder.build());
        }

        Ok(findings)
    }
}

/// Returns true when `record`'s context tokens contain an excluded context,
/// matched as an exact token (not a substring).
fn is_excluded(record: &BillingRecord, excluded: &std::collections::BTreeSet<String>) -> bool {
    record.context_tokens().iter().any(|token| excluded.contains(token))
}
