// crates/ramq-ingest/src/mapping.rs
// ============================================================================
// Module: CSV Header Mapping
// Description: French billing-CSV header labels mapped to canonical fields.
// Purpose: Implement the exact header dictionary in SPEC_FULL.md §4.4.
// Dependencies: none
// ============================================================================

//! ## Overview
//! Column order in the source CSV is not significant; only the header label
//! is. An unrecognized header is not an error: its values are preserved
//! per row into `BillingRecord::custom_fields` (SPEC_FULL.md §6).

// ============================================================================
// SECTION: Canonical Fields
// ============================================================================

/// A canonical `BillingRecord` field a recognized CSV header maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CanonicalField {
    /// `Facture`.
    Facture,
    /// `ID RAMQ`.
    IdRamq,
    /// `Date de Service`.
    DateService,
    /// `Début`.
    Debut,
    /// `Fin`.
    Fin,
    /// `Periode`/`Période`.
    Periode,
    /// `Lieu de pratique`.
    LieuPratique,
    /// `Secteur d'activité`.
    SecteurActivite,
    /// `Diagnostic`.
    Diagnostic,
    /// `Code`.
    Code,
    /// `Unités`.
    Unites,
    /// `Rôle`.
    Role,
    /// `Élément de contexte`.
    ElementContexte,
    /// `Montant Preliminaire`.
    MontantPreliminaire,
    /// `Montant Payé`.
    MontantPaye,
    /// `Doctor Info`.
    DoctorInfo,
    /// `Patient`.
    Patient,
}

/// The fields ingestion cannot operate without; a missing header for any of
/// these fails the run at `parsing` (SPEC_FULL.md §4.4/§7).
pub const CRITICAL_FIELDS: [CanonicalField; 3] =
    [CanonicalField::Code, CanonicalField::DateService, CanonicalField::LieuPratique];

/// Maps a CSV header label to its canonical field, or `None` when the
/// column is unrecognized (its values are preserved into `custom_fields`).
#[must_use]
pub fn canonical_field(header: &str) -> Option<CanonicalField> {
    match header.trim() {
        "Facture" => Some(CanonicalField::Facture),
        "ID RAMQ" => Some(CanonicalField::IdRamq),
        "Date de Service" => Some(CanonicalField::DateService),
        "Début" => Some(CanonicalField::Debut),
        "Fin" => Some(CanonicalField::Fin),
        "Periode" | "Période" => Some(CanonicalField::Periode),
        "Lieu de pratique" => Some(CanonicalField::LieuPratique),
        "Secteur d'activité" => Some(CanonicalField::SecteurActivite),
        "Diagnostic" => Some(CanonicalField::Diagnostic),
        "Code" => Some(CanonicalField::Code),
        "Unités" => Some(CanonicalField::Unites),
        "Rôle" => Some(CanonicalField::Role),
        "Élément de contexte" => Some(CanonicalField::ElementContexte),
        "Montant Preliminaire" => Some(CanonicalField::MontantPreliminaire),
        "Montant Payé" => Some(CanonicalField::MontantPaye),
        "Doctor Info" => Some(CanonicalField::DoctorInfo),
        "Patient" => Some(CanonicalField::Patient),
        _ => None,
    }
}
