// crates/ramq-core/src/reference.rs
// ============================================================================
// Module: RAMQ Reference Snapshot
// Description: Immutable, indexed views over the four reference tables.
// Purpose: Give rule handlers O(1) lookup without touching the store directly.
// Dependencies: crate::model
// ============================================================================

//! ## Overview
//! A [`ReferenceSnapshot`] is the unit of consistency handed to every rule
//! handler invocation: it is built once by `ramq-store`'s reference cache and
//! shared read-only for the duration of a validation run. See
//! SPEC_FULL.md §4.1 for the TTL and invalidation contract the cache itself
//! must uphold; this module only defines the immutable snapshot shape and
//! its lookup indices.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::model::BillingCode;
use crate::model::Establishment;
use crate::model::Rule;

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// An immutable, indexed snapshot of all four reference tables.
///
/// # Invariants
/// - Once constructed, a snapshot is never mutated; refresh produces a new
///   snapshot rather than editing this one in place.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSnapshot {
    codes_by_code: BTreeMap<String, BillingCode>,
    codes_by_top_level: BTreeMap<String, Vec<String>>,
    codes_by_leaf: BTreeMap<String, Vec<String>>,
    rules: Vec<Rule>,
    contexts: BTreeSet<String>,
    establishments_by_id: BTreeMap<String, Establishment>,
    /// Marks this snapshot as a stale fallback served after a failed refresh.
    pub stale: bool,
}

impl ReferenceSnapshot {
    /// Builds a snapshot from freshly loaded reference rows, constructing the
    /// by-top-level and by-leaf indices used by handlers such as the
    /// visit-duration optimizer and the annual-limit code resolver.
    #[must_use]
    pub fn build(
        codes: Vec<BillingCode>,
        rules: Vec<Rule>,
        contexts: BTreeSet<String>,
        establishments: Vec<Establishment>,
    ) -> Self {
        let mut codes_by_code = BTreeMap::new();
        let mut codes_by_top_level: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut codes_by_leaf: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for code in codes {
            codes_by_top_level
                .entry(code.classification.top_level.clone())
                .or_default()
                .push(code.code.clone());
            codes_by_leaf.entry(code.classification.leaf.clone()).or_default().push(code.code.clone());
            codes_by_code.insert(code.code.clone(), code);
        }

        let establishments_by_id =
            establishments.into_iter().map(|establishment| (establishment.id.clone(), establishment)).collect();

        Self {
            codes_by_code,
            codes_by_top_level,
            codes_by_leaf,
            rules,
            contexts,
            establishments_by_id,
            stale: false,
        }
    }

    /// Marks an existing snapshot as stale, for serving during a reference
    /// store outage (SPEC_FULL.md §4.1 failure semantics).
    #[must_use]
    pub fn mark_stale(mut self) -> Self {
        self.stale = true;
        self
    }

    /// Looks up a billing code by its unique code string.
    #[must_use]
    pub fn code(&self, code: &str) -> Option<&BillingCode> {
        self.codes_by_code.get(code)
    }

    /// Returns all code strings whose classification's `top_level` matches.
    #[must_use]
    pub fn codes_with_top_level(&self, top_level: &str) -> &[String] {
        self.codes_by_top_level.get(top_level).map_or(&[], Vec::as_slice)
    }

    /// Returns all code strings whose classification's `leaf` matches.
    #[must_use]
    pub fn codes_with_leaf(&self, leaf: &str) -> &[String] {
        self.codes_by_leaf.get(leaf).map_or(&[], Vec::as_slice)
    }

    /// Returns the enabled rules, in registration/load order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Returns true when `name` is a known context element.
    #[must_use]
    pub fn has_context(&self, name: &str) -> bool {
        self.contexts.contains(name)
    }

    /// Looks up an establishment by id.
    #[must_use]
    pub fn establishment(&self, id: &str) -> Option<&Establishment> {
        self.establishments_by_id.get(id)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::CodeClassification;
    use crate::money::Money;

    fn sample_code(code: &str, top_level: &str, leaf: &str) -> BillingCode {
        BillingCode {
            code: code.to_string(),
            description: String::new(),
            category: String::new(),
            place: String::new(),
            tariff: Money::ZERO,
            extra_unit_value: Money::ZERO,
            unit_required: false,
            classification: CodeClassification {
                top_level: top_level.to_string(),
                level1_group: String::new(),
                level2_group: String::new(),
                leaf: leaf.to_string(),
            },
            active: true,
            custom_fields: BTreeMap::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn indices_group_by_classification() {
        let snapshot = ReferenceSnapshot::build(
            vec![
                sample_code("8857", "B - CONSULTATION, EXAMEN ET VISITE", "Visite de prise en charge"),
                sample_code("00103", "B - CONSULTATION, EXAMEN ET VISITE", "Visite périodique"),
                sample_code("19928", "F - FRAIS", "Frais de bureau"),
            ],
            Vec::new(),
            BTreeSet::new(),
            Vec::new(),
        );

        assert_eq!(snapshot.codes_with_top_level("B - CONSULTATION, EXAMEN ET VISITE").len(), 2);
        assert_eq!(snapshot.codes_with_leaf("Visite périodique"), &["00103".to_string()]);
        assert!(snapshot.code("19928").is_some());
        assert!(snapshot.code("unknown").is_none());
    }
}
