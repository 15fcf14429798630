// crates/ramq-rules/src/registry.rs
// ============================================================================
// Module: Rule Handler Registry
// Description: Maps `ruleType` tags to handler implementations and resolves rules.
// Purpose: Give the engine a single place to materialize `Rule`s into handlers.
// Dependencies: ramq-core, crate::{condition, handlers}, tracing
// ============================================================================

//! ## Overview
//! [`HandlerRegistry`] owns one [`RuleHandler`] instance per built-in
//! `ruleType`. Resolving a [`Rule`] against the registry validates that its
//! `condition` payload parses for its declared type; a rule whose `ruleType`
//! is unrecognized, or whose `condition` fails to parse, is logged and
//! skipped rather than failing the whole run (SPEC_FULL.md §9 "Design Notes").

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use ramq_core::Rule;
use ramq_core::RuleHandler;

use crate::condition::ConditionParseError;
use crate::condition::RuleCondition;
use crate::handlers::annual_limit::AnnualLimitHandler;
use crate::handlers::annual_limit::AnnualPerPatientLimitHandler;
use crate::handlers::daily_time_limit::DailyTimeLimitHandler;
use crate::handlers::declarative::AgeRestrictionHandler;
use crate::handlers::declarative::AmountLimitHandler;
use crate::handlers::declarative::LocationRestrictionHandler;
use crate::handlers::declarative::MissingAnnualOpportunityHandler;
use crate::handlers::declarative::MutualExclusionHandler;
use crate::handlers::declarative::ProhibitionHandler;
use crate::handlers::declarative::RequirementHandler;
use crate::handlers::declarative::TimeRestrictionHandler;
use crate::handlers::office_fee::OfficeFeeHandler;
use crate::handlers::visit_duration::VisitDurationHandler;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// A [`Rule`] resolved to its executable handler, ready for the engine to call.
pub struct ResolvedRule<'a> {
    /// The rule definition, unchanged.
    pub rule: &'a Rule,
    /// The handler implementation for `rule.rule_type`.
    pub handler: &'a dyn RuleHandler,
}

/// Maps `ruleType` strings to their built-in [`RuleHandler`] implementation.
///
/// # Invariants
/// - Exactly one handler instance per `ruleType`; handlers are stateless and
///   shared across every rule and every run.
pub struct HandlerRegistry {
    handlers: BTreeMap<&'static str, Box<dyn RuleHandler>>,
}

impl HandlerRegistry {
    /// Builds a registry with every built-in handler registered
    /// (SPEC_FULL.md §4.2).
    #[must_use]
    pub fn with_builtin_handlers() -> Self {
        let mut handlers: BTreeMap<&'static str, Box<dyn RuleHandler>> = BTreeMap::new();
        handlers.insert("daily_time_limit", Box::new(DailyTimeLimitHandler));
        handlers.insert("office_fee", Box::new(OfficeFeeHandler));
        handlers.insert("annual_per_patient_limit", Box::new(AnnualPerPatientLimitHandler));
        handlers.insert("annual_limit", Box::new(AnnualLimitHandler));
        handlers.insert("visit_duration_optimization", Box::new(VisitDurationHandler));
        handlers.insert("prohibition", Box::new(ProhibitionHandler));
        handlers.insert("requirement", Box::new(RequirementHandler));
        handlers.insert("time_restriction", Box::new(TimeRestrictionHandler));
        handlers.insert("location_restriction", Box::new(LocationRestrictionHandler));
        handlers.insert("age_restriction", Box::new(AgeRestrictionHandler));
        handlers.insert("amount_limit", Box::new(AmountLimitHandler));
        handlers.insert("mutual_exclusion", Box::new(MutualExclusionHandler));
        handlers.insert("missing_annual_opportunity", Box::new(MissingAnnualOpportunityHandler));
        Self { handlers }
    }

    /// Returns the handler registered for `rule_type`, if any.
    #[must_use]
    pub fn handler(&self, rule_type: &str) -> Option<&dyn RuleHandler> {
        self.handlers.get(rule_type).map(AsRef::as_ref)
    }

    /// Resolves every enabled rule in `rules` against this registry.
    ///
    /// Rules with an unrecognized `ruleType` or a `condition` payload that
    /// fails to parse are logged at `warn` and excluded from the result; a
    /// malformed rule never aborts the run.
    #[must_use]
    pub fn resolve<'a>(&'a self, rules: &'a [Rule]) -> Vec<ResolvedRule<'a>> {
        rules
            .iter()
            .filter(|rule| rule.enabled)
            .filter_map(|rule| match self.try_resolve(rule) {
                Ok(resolved) => Some(resolved),
                Err(reason) => {
                    tracing::warn!(rule_id = %rule.id, rule_type = %rule.rule_type, reason, "disabling rule");
                    None
                }
            })
            .collect()
    }

    /// Resolves a single rule, validating its `condition` payload eagerly so
    /// a malformed rule is caught before the engine hands records to it.
    fn try_resolve<'a>(&'a self, rule: &'a Rule) -> Result<ResolvedRule<'a>, String> {
        let Some(handler) = self.handler(rule.rule_type.as_str()) else {
            return Err(format!("unknown rule_type {:?}", rule.rule_type));
        };
        RuleCondition::parse(&rule.rule_type, &rule.condition).map_err(|error: ConditionParseError| error.to_string())?;
        Ok(ResolvedRule { rule, handler })
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtin_handlers()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use ramq_core::RuleId;

    use super::*;

    fn rule(rule_type: &str, condition: serde_json::Value) -> Rule {
        Rule {
            id: RuleId::new_random(),
            name: rule_type.to_string(),
            rule_type: rule_type.to_string(),
            category: "test".to_string(),
            condition,
            threshold: None,
            enabled: true,
            custom_fields: BTreeMap::new(),
        }
    }

    #[test]
    fn resolves_every_builtin_rule_type() {
        let registry = HandlerRegistry::with_builtin_handlers();
        let rules = vec![
            rule("daily_time_limit", serde_json::Value::Null),
            rule("office_fee", serde_json::Value::Null),
            rule("annual_limit", serde_json::json!({"codes": ["8857"]})),
            rule("visit_duration_optimization", serde_json::Value::Null),
            rule(
                "prohibition",
                serde_json::json!({"scope": "patient", "codesX": ["A"], "codesY": ["B"]}),
            ),
        ];
        let resolved = registry.resolve(&rules);
        assert_eq!(resolved.len(), rules.len());
    }

    #[test]
    fn unknown_rule_type_is_skipped_not_fatal() {
        let registry = HandlerRegistry::with_builtin_handlers();
        let rules = vec![rule("not_a_real_type", serde_json::Value::Null)];
        assert!(registry.resolve(&rules).is_empty());
    }

    #[test]
    fn malformed_condition_is_skipped_not_fatal() {
        let registry = HandlerRegistry::with_builtin_handlers();
        let rules = vec![rule("office_fee", serde_json::json!({"codeA": "19928"}))];
        assert!(registry.resolve(&rules).is_empty());
    }

    #[test]
    fn disabled_rule_is_excluded_before_parsing() {
        let registry = HandlerRegistry::with_builtin_handlers();
        let mut disabled = rule("daily_time_limit", serde_json::Value::Null);
        disabled.enabled = false;
        assert!(registry.resolve(&[disabled]).is_empty());
    }
}
