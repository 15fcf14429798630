// crates/ramq-rules/src/condition.rs
// ============================================================================
// Module: RAMQ Rule Conditions
// Description: Typed parameter variants for every supported `ruleType`.
// Purpose: Parse a persisted `Rule.condition` JSON payload into a handler's parameters.
// Dependencies: ramq-core, serde, serde_json
// ============================================================================

//! ## Overview
//! A [`Rule`](ramq_core::Rule) carries an opaque `condition` JSON object
//! whose shape depends on its `rule_type`. This module defines one
//! `#[serde]` struct per rule type (SPEC_FULL.md §4.2, §9 "Design Notes")
//! and a single [`RuleCondition::parse`] entry point the registry uses when
//! materializing a rule into an executable handler.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Per-handler condition payloads
// ============================================================================

/// Parameters for the daily-time-limit handler (SPEC_FULL.md §4.2.1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTimeLimitCondition {
    /// Code billed with a fixed per-record duration.
    pub primary_code: String,
    /// Minutes attributed to each `primary_code` record.
    pub primary_minutes: u32,
    /// Code whose duration is read from `unites`.
    pub secondary_code: String,
    /// Context codes that exclude a record from the daily total.
    #[serde(default)]
    pub excluded_contexts: BTreeSet<String>,
    /// Daily maximum minutes per doctor.
    pub daily_max_minutes: u32,
}

impl Default for DailyTimeLimitCondition {
    fn default() -> Self {
        Self {
            primary_code: "8857".to_string(),
            primary_minutes: 30,
            secondary_code: "8859".to_string(),
            excluded_contexts: ["ICEP", "ICSM", "ICTOX"].into_iter().map(str::to_string).collect(),
            daily_max_minutes: 180,
        }
    }
}

/// Parameters for the office-fee handler (SPEC_FULL.md §4.2.2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficeFeeCondition {
    /// Lower-tier office fee code (tariff 32.40).
    pub code_a: String,
    /// Upper-tier office fee code (tariff 64.80).
    pub code_b: String,
    /// Context codes marking a visit or office fee as walk-in.
    #[serde(default)]
    pub walk_in_contexts: BTreeSet<String>,
    /// Minimum paid registered visits required for `code_a`.
    pub registered_threshold_a: u32,
    /// Minimum paid registered visits required for `code_b`.
    pub registered_threshold_b: u32,
    /// Minimum paid walk-in visits required for `code_a`.
    pub walk_in_threshold_a: u32,
    /// Minimum paid walk-in visits required for `code_b`.
    pub walk_in_threshold_b: u32,
    /// Maximum combined office-fee total per (doctor, date), in cents,
    /// compared against the billed tariff total regardless of payment status.
    pub daily_max_cents: i64,
}

impl Default for OfficeFeeCondition {
    fn default() -> Self {
        Self {
            code_a: "19928".to_string(),
            code_b: "19929".to_string(),
            walk_in_contexts: ["#G160", "#AR"].into_iter().map(str::to_string).collect(),
            registered_threshold_a: 6,
            registered_threshold_b: 12,
            walk_in_threshold_a: 10,
            walk_in_threshold_b: 20,
            daily_max_cents: 6_480,
        }
    }
}

/// Parameters for the annual-per-patient-limit handler (SPEC_FULL.md §4.2.3,
/// and the simpler declarative `annual_limit` variant in §4.2.5 when
/// `codes` is populated directly instead of via `leaf_patterns`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnualLimitCondition {
    /// Leaf classification labels identifying "annual" codes.
    #[serde(default)]
    pub leaf_patterns: Vec<String>,
    /// Explicit code set, used directly instead of resolving `leaf_patterns`.
    #[serde(default)]
    pub codes: BTreeSet<String>,
}

/// Parameters for the visit-duration revenue-optimization handler
/// (SPEC_FULL.md §4.2.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitDurationCondition {
    /// Minimum duration, in minutes, to consider a candidate.
    pub minimum_duration_minutes: u32,
    /// Candidate top-level classification label.
    pub candidate_top_level: String,
    /// Codes excluded from candidacy (the intervention codes themselves).
    #[serde(default)]
    pub excluded_codes: BTreeSet<String>,
    /// First-30-minutes intervention code.
    pub base_code: String,
    /// Base tariff for the first period, in cents.
    pub base_tariff_cents: i64,
    /// Additional-period code.
    pub extra_code: String,
    /// Tariff per additional 15-minute period, in cents.
    pub extra_period_tariff_cents: i64,
    /// Length, in minutes, of each additional billing period.
    pub extra_period_minutes: u32,
}

impl Default for VisitDurationCondition {
    fn default() -> Self {
        Self {
            minimum_duration_minutes: 30,
            candidate_top_level: "B - CONSULTATION, EXAMEN ET VISITE".to_string(),
            excluded_codes: ["8857", "8859"].into_iter().map(str::to_string).collect(),
            base_code: "8857".to_string(),
            base_tariff_cents: 5_970,
            extra_code: "8859".to_string(),
            extra_period_tariff_cents: 2_985,
            extra_period_minutes: 15,
        }
    }
}

/// Parameters for `prohibition`: two code sets that must not co-occur.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProhibitionCondition {
    /// Scope the prohibition is evaluated over.
    pub scope: Scope,
    /// First code set.
    pub codes_x: BTreeSet<String>,
    /// Second code set.
    pub codes_y: BTreeSet<String>,
}

/// Parameters for `requirement`: code X requires code Y within scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementCondition {
    /// Scope the requirement is evaluated over.
    pub scope: Scope,
    /// The code whose presence triggers the requirement.
    pub required_by: String,
    /// The code that must also be present.
    pub requires: String,
}

/// Parameters for `time_restriction`: code X only valid within a time window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRestrictionCondition {
    /// The restricted code.
    pub code: String,
    /// Earliest permitted `debut`, inclusive, `HH:MM`.
    pub window_start: String,
    /// Latest permitted `debut`, inclusive, `HH:MM`.
    pub window_end: String,
}

/// Parameters for `location_restriction`: code X only valid in one establishment class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRestrictionCondition {
    /// The restricted code.
    pub code: String,
    /// Whether the code requires a cabinet establishment.
    pub requires_cabinet: bool,
}

/// Parameters for `age_restriction`. No-op without patient DOB data
/// (SPEC_FULL.md §4.2.5); retained for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeRestrictionCondition {
    /// The restricted code.
    pub code: String,
    /// Minimum patient age, inclusive.
    pub min_age: Option<u32>,
    /// Maximum patient age, inclusive.
    pub max_age: Option<u32>,
}

/// Parameters for `amount_limit`: scope-total tariff must not exceed a threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountLimitCondition {
    /// Scope the limit is evaluated over.
    pub scope: Scope,
    /// Codes counted toward the total.
    pub codes: BTreeSet<String>,
    /// Maximum allowed total, in cents.
    pub max_total_cents: i64,
}

/// Parameters for `mutual_exclusion`: at most one of a set may be billed in scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutualExclusionCondition {
    /// Scope the exclusion is evaluated over.
    pub scope: Scope,
    /// The mutually exclusive code set.
    pub codes: BTreeSet<String>,
}

/// Parameters for `missing_annual_opportunity`: patient lacks an expected
/// annual code within a year window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingAnnualOpportunityCondition {
    /// The expected annual code.
    pub code: String,
    /// Expected tariff for the opportunity, in cents.
    pub tariff_cents: i64,
}

/// Aggregation scope shared by the simpler declarative rule types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Grouped by patient.
    Patient,
    /// Grouped by (patient, calendar date).
    PatientDay,
    /// Grouped by invoice (`facture`).
    Invoice,
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// A parsed, typed rule condition ready for handler evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleCondition {
    /// See [`DailyTimeLimitCondition`].
    DailyTimeLimit(DailyTimeLimitCondition),
    /// See [`OfficeFeeCondition`].
    OfficeFee(OfficeFeeCondition),
    /// See [`AnnualLimitCondition`].
    AnnualPerPatientLimit(AnnualLimitCondition),
    /// See [`VisitDurationCondition`].
    VisitDurationOptimization(VisitDurationCondition),
    /// See [`ProhibitionCondition`].
    Prohibition(ProhibitionCondition),
    /// See [`RequirementCondition`].
    Requirement(RequirementCondition),
    /// See [`TimeRestrictionCondition`].
    TimeRestriction(TimeRestrictionCondition),
    /// See [`LocationRestrictionCondition`].
    LocationRestriction(LocationRestrictionCondition),
    /// See [`AgeRestrictionCondition`].
    AgeRestriction(AgeRestrictionCondition),
    /// See [`AmountLimitCondition`].
    AmountLimit(AmountLimitCondition),
    /// See [`MutualExclusionCondition`].
    MutualExclusion(MutualExclusionCondition),
    /// See [`MissingAnnualOpportunityCondition`].
    MissingAnnualOpportunity(MissingAnnualOpportunityCondition),
    /// `annual_limit`, the simpler declarative variant of 4.2.3.
    AnnualLimit(AnnualLimitCondition),
}

/// Error produced when a rule's `condition` payload does not match its
/// declared `rule_type`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("condition for rule_type {rule_type:?} is invalid: {reason}")]
pub struct ConditionParseError {
    /// The rule's `rule_type` tag.
    pub rule_type: String,
    /// Human-readable parse failure reason.
    pub reason: String,
}

impl RuleCondition {
    /// Parses `condition` according to `rule_type`.
    ///
    /// # Errors
    ///
    /// Returns [`ConditionParseError`] when `rule_type` is recognized but
    /// `condition` does not match its expected shape. An unrecognized
    /// `rule_type` also returns an error; callers (the registry) log and
    /// disable such rules rather than propagate the failure.
    pub fn parse(rule_type: &str, condition: &serde_json::Value) -> Result<Self, ConditionParseError> {
        let map_err = |error: serde_json::Error| ConditionParseError {
            rule_type: rule_type.to_string(),
            reason: error.to_string(),
        };

        match rule_type {
            "daily_time_limit" => {
                let parsed = if condition.is_null() {
                    DailyTimeLimitCondition::default()
                } else {
                    serde_json::from_value(condition.clone()).map_err(map_err)?
                };
                Ok(Self::DailyTimeLimit(parsed))
            }
            "office_fee" => {
                let parsed = if condition.is_null() {
                    OfficeFeeCondition::default()
                } else {
                    serde_json::from_value(condition.clone()).map_err(map_err)?
                };
                Ok(Self::OfficeFee(parsed))
            }
            "annual_per_patient_limit" => {
                Ok(Self::AnnualPerPatientLimit(serde_json::from_value(condition.clone()).map_err(map_err)?))
            }
            "visit_duration_optimization" => {
                let parsed = if condition.is_null() {
                    VisitDurationCondition::default()
                } else {
                    serde_json::from_value(condition.clone()).map_err(map_err)?
                };
                Ok(Self::VisitDurationOptimization(parsed))
            }
            "prohibition" => Ok(Self::Prohibition(serde_json::from_value(condition.clone()).map_err(map_err)?)),
            "requirement" => Ok(Self::Requirement(serde_json::from_value(condition.clone()).map_err(map_err)?)),
            "time_restriction" => {
                Ok(Self::TimeRestriction(serde_json::from_value(condition.clone()).map_err(map_err)?))
            }
            "location_restriction" => {
                Ok(Self::LocationRestriction(serde_json::from_value(condition.clone()).map_err(map_err)?))
            }
            "age_restriction" => {
                Ok(Self::AgeRestriction(serde_json::from_value(condition.clone()).map_err(map_err)?))
            }
            "amount_limit" => Ok(Self::AmountLimit(serde_json::from_value(condition.clone()).map_err(map_err)?)),
            "mutual_exclusion" => {
                Ok(Self::MutualExclusion(serde_json::from_value(condition.clone()).map_err(map_err)?))
            }
            "missing_annual_opportunity" => Ok(Self::MissingAnnualOpportunity(
                serde_json::from_value(condition.clone()).map_err(map_err)?,
            )),
            "annual_limit" => Ok(Self::AnnualLimit(serde_json::from_value(condition.clone()).map_err(map_err)?)),
            other => Err(ConditionParseError {
                rule_type: rule_type.to_string(),
                reason: format!("unknown rule_type {other:?}"),
            }),
        }
    }
}
