// crates/ramq-ingest/src/parse.rs
// ============================================================================
// Module: CSV Billing-Record Parser
// Description: Turns a raw semicolon-delimited CSV into canonical BillingRecords.
// Purpose: Implement SPEC_FULL.md §4.4's ingestion contract.
// Dependencies: ramq-core, csv
// ============================================================================

//! ## Overview
//! Decoding tries UTF-8 first and falls back to Latin-1 (a direct byte-to-
//! codepoint mapping, since ISO-8859-1 codepoints equal their byte values)
//! so a file saved from an older RAMQ billing tool still parses. A row that
//! fails to parse is recorded in [`ParseOutcome::row_errors`] and skipped
//! rather than failing the whole run; the run only fails when zero usable
//! records remain or a critical column is missing from the header.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use csv::ReaderBuilder;
use csv::StringRecord;
use ramq_core::BillingRecord;
use ramq_core::ClockTime;
use ramq_core::Money;
use ramq_core::RecordNumber;
use ramq_core::RunId;
use ramq_core::ServiceDate;
use thiserror::Error;
use tracing::warn;

use crate::mapping::CRITICAL_FIELDS;
use crate::mapping::CanonicalField;
use crate::mapping::canonical_field;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors that fail an ingestion run outright (SPEC_FULL.md §7 "input errors").
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// A column ingestion cannot operate without is absent from the header row.
    #[error("missing critical column: {0:?}")]
    MissingCriticalColumn(CanonicalField),
    /// Every row failed to parse or the file contained no data rows.
    #[error("no usable records parsed from input")]
    NoUsableRecords,
    /// The CSV reader itself failed (malformed quoting, header read failure).
    #[error("csv structural error: {0}")]
    Csv(String),
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// A single row's parse failure, accumulated rather than aborting the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Zero-based data row index (excluding the header row).
    pub row_index: u64,
    /// Human-readable failure reason.
    pub reason: String,
}

/// The result of parsing a full CSV input.
#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    /// Successfully parsed records, in input order.
    pub records: Vec<BillingRecord>,
    /// Rows that failed to parse, with their reasons.
    pub row_errors: Vec<RowError>,
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses `bytes` as a semicolon-delimited billing CSV for `run_id`.
///
/// # Errors
///
/// Returns [`IngestError::MissingCriticalColumn`] when the header omits a
/// field every handler depends on, and [`IngestError::NoUsableRecords`] when
/// no row parses successfully.
pub fn parse_csv(run_id: RunId, bytes: &[u8]) -> Result<ParseOutcome, IngestError> {
    let text = decode_with_latin1_fallback(bytes);
    let mut reader = ReaderBuilder::new().delimiter(b';').flexible(true).from_reader(text.as_bytes());

    let headers = reader.headers().map_err(|error| IngestError::Csv(error.to_string()))?.clone();
    let mut field_positions: BTreeMap<CanonicalField, usize> = BTreeMap::new();
    let mut custom_positions: Vec<(usize, String)> = Vec::new();
    for (index, header) in headers.iter().enumerate() {
        match canonical_field(header) {
            Some(field) => {
                field_positions.insert(field, index);
            }
            None => custom_positions.push((index, header.to_string())),
        }
    }

    for critical in CRITICAL_FIELDS {
        if !field_positions.contains_key(&critical) {
            return Err(IngestError::MissingCriticalColumn(critical));
        }
    }

    let mut records = Vec::new();
    let mut row_errors = Vec::new();
    let mut next_record_number: u32 = 1;

    for (row_index, result) in reader.records().enumerate() {
        let row_index = u64::try_from(row_index).unwrap_or(u64::MAX);
        let row = match result {
            Ok(row) => row,
            Err(error) => {
                row_errors.push(RowError { row_index, reason: error.to_string() });
                continue;
            }
        };

        if row.iter().all(|field| field.trim().is_empty()) {
            continue;
        }

        match build_record(run_id, &row, &field_positions, &custom_positions, next_record_number) {
            Ok(record) => {
                next_record_number = next_record_number.saturating_add(1);
                records.push(record);
            }
            Err(reason) => row_errors.push(RowError { row_index, reason }),
        }
    }

    if records.is_empty() {
        warn!(run_id = %run_id, row_error_count = row_errors.len(), "csv ingestion produced no usable records");
        return Err(IngestError::NoUsableRecords);
    }

    Ok(ParseOutcome { records, row_errors })
}

fn build_record(
    run_id: RunId,
    row: &StringRecord,
    field_positions: &BTreeMap<CanonicalField, usize>,
    custom_positions: &[(usize, String)],
    record_number: u32,
) -> Result<BillingRecord, String> {
    let get = |field: CanonicalField| -> String {
        field_positions.get(&field).and_then(|&index| row.get(index)).unwrap_or("").trim().to_string()
    };
    let optional = |value: String| -> Option<String> { if value.is_empty() { None } else { Some(value) } };

    let date_service_raw = get(CanonicalField::DateService);
    let date_service = ServiceDate::parse_leading(&date_service_raw).ok();

    let debut_raw = get(CanonicalField::Debut);
    let debut = if debut_raw.is_empty() { None } else { ClockTime::parse(&debut_raw).ok() };
    let fin_raw = get(CanonicalField::Fin);
    let fin = if fin_raw.is_empty() { None } else { ClockTime::parse(&fin_raw).ok() };

    let montant_preliminaire = Money::parse_quebec_locale(&get(CanonicalField::MontantPreliminaire))
        .map_err(|error| error.to_string())?;
    let montant_paye_raw = get(CanonicalField::MontantPaye);
    let montant_paye = if montant_paye_raw.is_empty() {
        None
    } else {
        Some(Money::parse_quebec_locale(&montant_paye_raw).map_err(|error| error.to_string())?)
    };

    let mut custom_fields = BTreeMap::new();
    for (index, name) in custom_positions {
        if let Some(value) = row.get(*index) {
            let value = value.trim();
            if !value.is_empty() {
                custom_fields.insert(name.clone(), value.to_string());
            }
        }
    }

    Ok(BillingRecord {
        validation_run_id: run_id,
        record_number: RecordNumber::from_raw(record_number).ok_or("record number overflow")?,
        facture: get(CanonicalField::Facture),
        id_ramq: get(CanonicalField::IdRamq),
        date_service_raw,
        date_service,
        debut,
        fin,
        periode: get(CanonicalField::Periode),
        lieu_pratique: get(CanonicalField::LieuPratique),
        secteur_activite: get(CanonicalField::SecteurActivite),
        diagnostic: get(CanonicalField::Diagnostic),
        code: get(CanonicalField::Code),
        unites: get(CanonicalField::Unites),
        role: get(CanonicalField::Role),
        element_contexte: optional(get(CanonicalField::ElementContexte)),
        montant_preliminaire,
        montant_paye,
        doctor_info: optional(get(CanonicalField::DoctorInfo)),
        patient: optional(get(CanonicalField::Patient)),
        custom_fields,
    })
}

/// Decodes `bytes` as UTF-8, falling back to a direct Latin-1 byte-to-codepoint
/// mapping on failure (SPEC_FULL.md §4.4 encoding contract).
fn decode_with_latin1_fallback(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&byte| byte as char).collect(),
    }
}
