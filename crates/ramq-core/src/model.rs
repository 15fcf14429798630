// crates/ramq-core/src/model.rs
// ============================================================================
// Module: RAMQ Domain Model
// Description: Canonical entities shared by ingestion, rules, and persistence.
// Purpose: Define the wire- and store-stable shapes described in SPEC_FULL.md §3.
// Dependencies: crate::{identifiers, money, time_util}, serde, serde_json
// ============================================================================

//! ## Overview
//! These types are the canonical in-memory representation every other crate
//! in the workspace builds on: CSV ingestion produces [`BillingRecord`]
//! values, rule handlers consume them and produce [`ValidationResult`]
//! values, and the store persists all of it unchanged.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::BillingRecordId;
use crate::identifiers::RecordNumber;
use crate::identifiers::ResultId;
use crate::identifiers::RuleId;
use crate::identifiers::RunId;
use crate::money::Money;
use crate::time_util::ClockTime;
use crate::time_util::ServiceDate;

// ============================================================================
// SECTION: Reference Entities
// ============================================================================

/// Hierarchical classification of a billing code, most specific field last.
///
/// # Invariants
/// - `leaf` is the label used to resolve annual-limit code sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeClassification {
    /// Top-level grouping, e.g. `"B - CONSULTATION, EXAMEN ET VISITE"`.
    pub top_level: String,
    /// First-level subgroup.
    pub level1_group: String,
    /// Second-level subgroup.
    pub level2_group: String,
    /// Most specific classification label.
    pub leaf: String,
}

/// A billing code from the reference tariff table.
///
/// # Invariants
/// - `code` is unique and stable across the reference set.
/// - `tariff` and `extra_unit_value` are non-negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingCode {
    /// Unique code string, e.g. `"8857"`.
    pub code: String,
    /// Human-readable description.
    pub description: String,
    /// Free-form category tag.
    pub category: String,
    /// Establishment "place" tag this code applies to.
    pub place: String,
    /// Base tariff value.
    pub tariff: Money,
    /// Additional-unit tariff value (used by unit-required codes).
    pub extra_unit_value: Money,
    /// Whether a non-empty `unites` value is required on billing lines.
    pub unit_required: bool,
    /// Hierarchical classification.
    pub classification: CodeClassification,
    /// Whether the code is currently billable.
    pub active: bool,
    /// Arbitrary key/value metadata carried through unmodified.
    pub custom_fields: BTreeMap<String, String>,
    /// Last update timestamp, ISO-8601.
    pub updated_at: String,
}

/// A context element used to classify a billing line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextElement {
    /// Unique context name, e.g. `"ICEP"` or `"#G160"`.
    pub name: String,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// Free-form classification tags.
    pub tags: Vec<String>,
    /// Arbitrary key/value metadata.
    pub custom_fields: BTreeMap<String, String>,
}

/// An establishment (clinic, hospital, CLSC, ...).
///
/// Cabinets are identified structurally: `id` starts with `'5'`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Establishment {
    /// Establishment identifier; a leading `'5'` marks a cabinet.
    pub id: String,
    /// Establishment display name.
    pub name: String,
    /// Optional establishment type.
    pub establishment_type: Option<String>,
    /// Optional administrative region.
    pub region: Option<String>,
    /// Whether the establishment currently accepts billings.
    pub active: bool,
    /// Arbitrary key/value metadata.
    pub custom_fields: BTreeMap<String, String>,
}

impl Establishment {
    /// Returns true when this establishment is a cabinet (id starts with `'5'`).
    #[must_use]
    pub fn is_cabinet(&self) -> bool {
        is_cabinet_id(&self.id)
    }
}

/// Returns true when an establishment id denotes a cabinet (leading `'5'`).
#[must_use]
pub fn is_cabinet_id(establishment_id: &str) -> bool {
    establishment_id.trim().starts_with('5')
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// A persisted rule definition before it is materialized into a handler.
///
/// # Invariants
/// - `condition` is an opaque JSON object interpreted only by the handler
///   selected by `rule_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique rule identifier.
    pub id: RuleId,
    /// French display name.
    pub name: String,
    /// Machine tag selecting the handler implementation.
    pub rule_type: String,
    /// Free-form category tag, e.g. `"intervention_clinique"`.
    pub category: String,
    /// Handler-specific parameters.
    pub condition: serde_json::Value,
    /// Optional numeric threshold shared across simple handler families.
    pub threshold: Option<f64>,
    /// Whether the rule participates in validation runs.
    pub enabled: bool,
    /// Arbitrary key/value metadata.
    pub custom_fields: BTreeMap<String, String>,
}

// ============================================================================
// SECTION: Billing Records
// ============================================================================

/// A single canonicalized CSV row.
///
/// # Invariants
/// - `record_number` is 1-based and unique within `validation_run_id`.
/// - `montant_paye` of `None` or zero means unpaid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingRecord {
    /// Owning validation run.
    pub validation_run_id: RunId,
    /// 1-based position within the run, in input CSV order.
    pub record_number: RecordNumber,
    /// Invoice identifier.
    pub facture: String,
    /// RAMQ claim identifier.
    pub id_ramq: String,
    /// Raw `dateService` field as written in the CSV (date, optionally with time).
    pub date_service_raw: String,
    /// Calendar date extracted from `date_service_raw`, when parseable.
    pub date_service: Option<ServiceDate>,
    /// Visit start time, when present and parseable.
    pub debut: Option<ClockTime>,
    /// Visit end time, when present and parseable.
    pub fin: Option<ClockTime>,
    /// Billing period label.
    pub periode: String,
    /// Establishment identifier; cabinet iff first char is `'5'`.
    pub lieu_pratique: String,
    /// Activity sector label.
    pub secteur_activite: String,
    /// Diagnostic code.
    pub diagnostic: String,
    /// Billing code.
    pub code: String,
    /// Raw `unites` field (numeric string or empty).
    pub unites: String,
    /// Billing role.
    pub role: String,
    /// Comma-separated context codes, or `None` if absent.
    pub element_contexte: Option<String>,
    /// Preliminary billed amount.
    pub montant_preliminaire: Money,
    /// Paid amount; `None` or zero means unpaid.
    pub montant_paye: Option<Money>,
    /// Doctor identifier, stable per doctor within a run.
    pub doctor_info: Option<String>,
    /// Opaque patient identifier (NAM).
    pub patient: Option<String>,
    /// Columns present in the CSV but not mapped to a canonical field.
    pub custom_fields: BTreeMap<String, String>,
}

impl BillingRecord {
    /// Returns this record's run-scoped identity.
    #[must_use]
    pub const fn id(&self) -> BillingRecordId {
        BillingRecordId::new(self.validation_run_id, self.record_number)
    }

    /// Returns true when `montant_paye` parses as a strictly positive amount.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.montant_paye.is_some_and(Money::is_positive)
    }

    /// Splits `element_contexte` into trimmed, upper-cased tokens.
    ///
    /// Empty tokens are discarded so that a trailing comma does not produce
    /// a spurious empty context entry.
    #[must_use]
    pub fn context_tokens(&self) -> Vec<String> {
        self.element_contexte
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(|token| token.trim().to_ascii_uppercase())
            .filter(|token| !token.is_empty())
            .collect()
    }

    /// Returns true when the establishment is a cabinet.
    #[must_use]
    pub fn is_cabinet(&self) -> bool {
        is_cabinet_id(&self.lieu_pratique)
    }

    /// Parses `unites` as a non-negative integer, treating blank or
    /// non-numeric content as zero (per SPEC_FULL.md §4.2.1 step 4).
    #[must_use]
    pub fn unites_as_non_negative_int(&self) -> u32 {
        self.unites.trim().parse::<u32>().unwrap_or(0)
    }
}

// ============================================================================
// SECTION: Runs
// ============================================================================

/// Lifecycle stage of a [`ValidationRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    /// Enqueued, not yet picked up by a worker.
    Queued,
    /// CSV is being parsed into canonical records.
    Parsing,
    /// Rules are being evaluated against the parsed records.
    Validating,
    /// Findings are being persisted.
    Persisting,
    /// The run completed successfully.
    Done,
    /// The run failed; see `error_message`/`error_code`.
    Failed,
}

/// A classified failure reason for a [`ValidationRun`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunErrorCode {
    /// The input CSV could not be parsed into any usable record.
    InvalidInput,
    /// The reference cache (codes/rules/contexts/establishments) was unavailable.
    ReferenceUnavailable,
    /// Findings could not be persisted after retries were exhausted.
    PersistenceFailed,
    /// The run was cancelled externally.
    Cancelled,
    /// The run exceeded its configured timeout.
    Timeout,
}

/// Running totals accumulated over a validation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTotals {
    /// Number of records successfully parsed.
    pub records_parsed: u64,
    /// Number of `error` severity findings.
    pub error_count: u64,
    /// Number of `optimization` severity findings.
    pub optimization_count: u64,
    /// Number of `info` severity findings.
    pub info_count: u64,
}

/// A validation run's control-plane state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRun {
    /// Run identifier.
    pub id: RunId,
    /// Owning user identifier (opaque; auth is out of scope here).
    pub owner: String,
    /// Uploaded file name.
    pub file_name: String,
    /// Creation timestamp, ISO-8601.
    pub created_at: String,
    /// Current lifecycle stage.
    pub stage: RunStage,
    /// Progress percentage in `[0, 100]`.
    pub progress: u8,
    /// Running totals.
    pub totals: RunTotals,
    /// Human-readable failure message, set only when `stage == Failed`.
    pub error_message: Option<String>,
    /// Classified failure reason, set only when `stage == Failed`.
    pub error_code: Option<RunErrorCode>,
}

impl ValidationRun {
    /// Creates a freshly queued run.
    #[must_use]
    pub fn new_queued(id: RunId, owner: String, file_name: String, created_at: String) -> Self {
        Self {
            id,
            owner,
            file_name,
            created_at,
            stage: RunStage::Queued,
            progress: 0,
            totals: RunTotals::default(),
            error_message: None,
            error_code: None,
        }
    }
}

// ============================================================================
// SECTION: Findings
// ============================================================================

/// Severity of a [`ValidationResult`].
///
/// # Invariants
/// - `Error` findings must block export workflows; `Optimization` and `Info`
///   must not (SPEC_FULL.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// A regulation violation; blocks export.
    Error,
    /// A revenue-maximization suggestion; informational only.
    Optimization,
    /// A neutral summary or rollup.
    Info,
}

/// A single emitted finding.
///
/// # Invariants
/// - `billing_record_id` is an element of `affected_records` whenever
///   `affected_records` is non-empty.
/// - `monetary_impact` sign convention: negative = revenue at risk,
///   positive = potential gain, zero = neutral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Finding identifier.
    pub id: ResultId,
    /// Owning validation run.
    pub validation_run_id: RunId,
    /// Rule that produced this finding.
    pub rule_id: RuleId,
    /// Finding severity.
    pub severity: Severity,
    /// Free-form category tag.
    pub category: String,
    /// French-language message.
    pub message: String,
    /// Optional French-language suggested remediation.
    pub solution: Option<String>,
    /// Primary offending record, when applicable.
    pub billing_record_id: Option<BillingRecordId>,
    /// All records that contributed to this finding.
    pub affected_records: Vec<BillingRecordId>,
    /// RAMQ claim id of the primary offender.
    pub id_ramq: Option<String>,
    /// Structured, handler-specific payload; always carries `monetaryImpact`.
    pub rule_data: serde_json::Value,
}

impl ValidationResult {
    /// Returns the `monetaryImpact` field from `rule_data`, defaulting to
    /// zero when absent or not numeric (handlers are expected to always set it).
    #[must_use]
    pub fn monetary_impact(&self) -> f64 {
        self.rule_data.get("monetaryImpact").and_then(serde_json::Value::as_f64).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cabinet_detection_is_structural() {
        assert!(is_cabinet_id("50012"));
        assert!(!is_cabinet_id("10012"));
        assert!(!is_cabinet_id(""));
    }

    #[test]
    fn context_tokens_are_trimmed_upper_and_nonempty() {
        let record = sample_record();
        let mut with_context = record;
        with_context.element_contexte = Some(" clsc ,icep,".to_string());
        assert_eq!(with_context.context_tokens(), vec!["CLSC".to_string(), "ICEP".to_string()]);
    }

    #[test]
    fn unites_non_numeric_is_zero() {
        let mut record = sample_record();
        record.unites = "abc".to_string();
        assert_eq!(record.unites_as_non_negative_int(), 0);
        record.unites = "60".to_string();
        assert_eq!(record.unites_as_non_negative_int(), 60);
    }

    #[test]
    fn is_paid_requires_strictly_positive_amount() {
        let mut record = sample_record();
        record.montant_paye = None;
        assert!(!record.is_paid());
        record.montant_paye = Some(Money::ZERO);
        assert!(!record.is_paid());
        record.montant_paye = Some(Money::from_cents(1));
        assert!(record.is_paid());
    }

    fn sample_record() -> BillingRecord {
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
            secteur_activite: String::new(),
            diagnostic: String::new(),
            code: "8857".to_string(),
            unites: String::new(),
            role: String::new(),
            element_contexte: None,
            montant_preliminaire: Money::ZERO,
            montant_paye: None,
            doctor_info: Some("DOC1".to_string()),
            patient: Some("PAT1".to_string()),
            custom_fields: BTreeMap::new(),
        }
    }
}
