// crates/ramq-rules/src/finding.rs
// ============================================================================
// Module: RAMQ Finding Builder
// Description: Constructs `ValidationResult` values with the monetary-impact
//              sign convention enforced at construction time.
// Purpose: Give every handler one place that cannot emit an inconsistent finding.
// Dependencies: ramq-core
// ============================================================================

//! ## Overview
//! SPEC_FULL.md §3 fixes a sign convention for `monetaryImpact`: negative
//! means revenue at risk, positive means potential gain, zero is neutral.
//! [`FindingBuilder`] is the one place every handler in this crate goes
//! through to build a [`ValidationResult`], so the convention is checked
//! once rather than re-derived in each handler.

// ============================================================================
// SECTION: Imports
// ============================================================================

use ramq_core::BillingRecordId;
use ramq_core::ResultId;
use ramq_core::RuleId;
use ramq_core::RunId;
use ramq_core::Severity;
use ramq_core::ValidationResult;

// ============================================================================
// SECTION: Builder
// ============================================================================

/// Builds a single [`ValidationResult`], enforcing the `monetaryImpact`
/// sign convention against the finding's [`Severity`].
///
/// # Invariants
/// - `Severity::Error` findings carry `monetary_impact <= 0`.
/// - `Severity::Optimization` findings carry `monetary_impact > 0`.
/// - `Severity::Info` findings carry `monetary_impact == 0`.
pub struct FindingBuilder {
    /// Owning run.
    run_id: RunId,
    /// Rule that produced this finding.
    rule_id: RuleId,
    /// Finding severity.
    severity: Severity,
    /// Free-form category tag.
    category: String,
    /// French-language message.
    message: String,
    /// Optional French-language suggested remediation.
    solution: Option<String>,
    /// Primary offending record.
    billing_record_id: Option<BillingRecordId>,
    /// All records that contributed to this finding.
    affected_records: Vec<BillingRecordId>,
    /// RAMQ claim id of the primary offender.
    id_ramq: Option<String>,
    /// Monetary impact in cents, per the sign convention above.
    monetary_impact_cents: i64,
    /// Additional handler-specific payload fields merged alongside `monetaryImpact`.
    extra_fields: Vec<(String, serde_json::Value)>,
}

impl FindingBuilder {
    /// Starts a new finding for `rule_id` within `run_id`.
    #[must_use]
    pub fn new(run_id: RunId, rule_id: RuleId, severity: Severity, category: impl Into<String>) -> Self {
        Self {
            run_id,
            rule_id,
            severity,
            category: category.into(),
            message: String::new(),
            solution: None,
            billing_record_id: None,
            affected_records: Vec::new(),
            id_ramq: None,
            monetary_impact_cents: 0,
            extra_fields: Vec::new(),
        }
    }

    /// Sets the French-language message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Sets the French-language suggested remediation.
    #[must_use]
    pub fn solution(mut self, solution: impl Into<String>) -> Self {
        self.solution = Some(solution.into());
        self
    }

    /// Sets the primary offending record and adds it to `affected_records`.
    #[must_use]
    pub fn primary_record(mut self, record_id: BillingRecordId) -> Self {
        self.billing_record_id = Some(record_id);
        if !self.affected_records.contains(&record_id) {
            self.affected_records.push(record_id);
        }
        self
    }

    /// Adds a record to `affected_records` without making it the primary.
    #[must_use]
    pub fn affected_record(mut self, record_id: BillingRecordId) -> Self {
        if !self.affected_records.contains(&record_id) {
            self.affected_records.push(record_id);
        }
        self
    }

    /// Sets the RAMQ claim id of the primary offender.
    #[must_use]
    pub fn id_ramq(mut self, id_ramq: impl Into<String>) -> Self {
        self.id_ramq = Some(id_ramq.into());
        self
    }

    /// Sets the monetary impact, in cents.
    #[must_use]
    pub const fn monetary_impact_cents(mut self, cents: i64) -> Self {
        self.monetary_impact_cents = cents;
        self
    }

    /// Merges an additional field into `rule_data` alongside `monetaryImpact`.
    #[must_use]
    pub fn extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra_fields.push((key.into(), value.into()));
        self
    }

    /// Finalizes the finding.
    ///
    /// # Panics
    ///
    /// Panics in debug builds when `monetary_impact_cents` violates the sign
    /// convention for `severity`; this is a handler-authoring bug, not a
    /// runtime condition callers must plan around.
    #[must_use]
    pub fn build(self) -> ValidationResult {
        debug_assert!(
            Self::impact_matches_severity(self.severity, self.monetary_impact_cents),
            "monetary impact {} cents violates the sign convention for {:?}",
            self.monetary_impact_cents,
            self.severity
        );

        let impact_decimal = ramq_core::Money::from_cents(self.monetary_impact_cents).as_f64();
        let mut rule_data = serde_json::Map::new();
        rule_data.insert("monetaryImpact".to_string(), serde_json::json!(impact_decimal));
        for (key, value) in self.extra_fields {
            rule_data.insert(key, value);
        }

        ValidationResult {
            id: ResultId::new_random(),
            validation_run_id: self.run_id,
            rule_id: self.rule_id,
            severity: self.severity,
            category: self.category,
            message: self.message,
            solution: self.solution,
            billing_record_id: self.billing_record_id,
            affected_records: self.affected_records,
            id_ramq: self.id_ramq,
            rule_data: serde_json::Value::Object(rule_data),
        }
    }

    /// Checks `monetary_impact_cents` against the sign convention for `severity`.
    const fn impact_matches_severity(severity: Severity, cents: i64) -> bool {
        match severity {
            Severity::Error => cents <= 0,
            Severity::Optimization => cents > 0,
            Severity::Info => cents == 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use ramq_core::RuleId;
    use ramq_core::RunId;

    use super::*;

    #[test]
    fn error_finding_carries_non_positive_impact() {
        let result = FindingBuilder::new(RunId::new_random(), RuleId::new_random(), Severity::Error, "cat")
            .message("msg")
            .monetary_impact_cents(-3_240)
            .build();
        assert!((result.monetary_impact() - (-32.40)).abs() < f64::EPSILON);
    }

    #[test]
    fn optimization_finding_carries_positive_impact() {
        let result = FindingBuilder::new(RunId::new_random(), RuleId::new_random(), Severity::Optimization, "cat")
            .message("msg")
            .monetary_impact_cents(2_985)
            .build();
        assert!(result.monetary_impact() > 0.0);
    }

    #[test]
    #[should_panic(expected = "violates the sign convention")]
    fn error_finding_with_positive_impact_panics_in_debug() {
        let _ = FindingBuilder::new(RunId::new_random(), RuleId::new_random(), Severity::Error, "cat")
            .monetary_impact_cents(100)
            .build();
    }

    #[test]
    fn extra_fields_merge_alongside_monetary_impact() {
        let result = FindingBuilder::new(RunId::new_random(), RuleId::new_random(), Severity::Info, "cat")
            .extra("totalMinutes", serde_json::json!(210))
            .build();
        assert_eq!(result.rule_data.get("totalMinutes"), Some(&serde_json::json!(210)));
        assert_eq!(result.rule_data.get("monetaryImpact"), Some(&serde_json::json!(0.0)));
    }
}
