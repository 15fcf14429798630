// crates/ramq-ingest/src/ssv.rs
// ============================================================================
// Module: SSV Billing Export
// Description: Writes the fixed 26-field semicolon-delimited export format.
// Purpose: Implement SPEC_FULL.md §14 (supplemented feature, named in §6).
// Dependencies: ramq-core, csv
// ============================================================================

//! ## Overview
//! Every row has exactly 26 fields; only five carry data derived from a
//! [`BillingRecord`] (columns 1, 3, 4, 5, 11), the rest are emitted empty.
//! Column 2 (group number) is always `"0"` since group billing is not
//! modeled by this engine's records.

// ============================================================================
// SECTION: Imports
// ============================================================================

use csv::Terminator;
use csv::WriterBuilder;
use ramq_core::BillingRecord;
use thiserror::Error;

/// Number of fields in every SSV row, header included.
const FIELD_COUNT: usize = 26;

/// Fixed header row, in column order.
const HEADER_FIELDS: [&str; FIELD_COUNT] = [
    "noPermis",
    "noGroupe",
    "dateVisite",
    "heureVisite",
    "nam",
    "reserve1",
    "reserve2",
    "reserve3",
    "reserve4",
    "reserve5",
    "secteur",
    "reserve6",
    "reserve7",
    "reserve8",
    "reserve9",
    "reserve10",
    "reserve11",
    "reserve12",
    "reserve13",
    "reserve14",
    "reserve15",
    "reserve16",
    "reserve17",
    "reserve18",
    "reserve19",
    "reserve20",
];

/// Errors produced while writing an SSV export.
#[derive(Debug, Error)]
pub enum SsvError {
    /// The underlying CSV writer failed.
    #[error("ssv write error: {0}")]
    Write(String),
}

/// Writes `records` as an SSV billing export: CRLF line endings, 26
/// semicolon-delimited fields per row, fixed header first.
///
/// # Errors
///
/// Returns [`SsvError`] if the underlying writer fails.
pub fn write_ssv(records: &[BillingRecord]) -> Result<String, SsvError> {
    let mut writer =
        WriterBuilder::new().delimiter(b';').terminator(Terminator::CRLF).from_writer(Vec::new());
    writer.write_record(HEADER_FIELDS).map_err(|error| SsvError::Write(error.to_string()))?;

    for record in records {
        writer.write_record(ssv_row(record)).map_err(|error| SsvError::Write(error.to_string()))?;
    }

    let bytes = writer.into_inner().map_err(|error| SsvError::Write(error.to_string()))?;
    String::from_utf8(bytes).map_err(|error| SsvError::Write(error.to_string()))
}

fn ssv_row(record: &BillingRecord) -> [String; FIELD_COUNT] {
    let mut fields: [String; FIELD_COUNT] = [const { String::new() }; FIELD_COUNT];
    fields[0] = record.doctor_info.clone().unwrap_or_default();
    fields[1] = "0".to_string();
    if let Some(date) = record.date_service {
        fields[2] = date.to_string();
    }
    if let Some(time) = record.debut {
        fields[3] = time.to_string();
    }
    fields[4] = record.patient.clone().unwrap_or_default();
    fields[10] = sector_digit(&record.secteur_activite).to_string();
    fields
}

/// Returns the leading ASCII digit of `secteur_activite`, or `'0'` when
/// absent or non-numeric (SPEC_FULL.md §14).
fn sector_digit(secteur_activite: &str) -> char {
    secteur_activite.trim().chars().next().filter(char::is_ascii_digit).unwrap_or('0')
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use ramq_core::RecordNumber;
    use ramq_core::RunId;
    use ramq_core::ServiceDate;

    use super::*;

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
            secteur_activite: "3".to_string(),
            diagnostic: String::new(),
            code: "8857".to_string(),
            unites: String::new(),
            role: String::new(),
            element_contexte: None,
            montant_preliminaire: ramq_core::Money::ZERO,
            montant_paye: None,
            doctor_info: Some("1234567".to_string()),
            patient: Some("ABCD01020304".to_string()),
            custom_fields: BTreeMap::new(),
        }
    }

    #[test]
    fn header_row_has_26_fields_and_crlf_terminator() {
        let output = write_ssv(&[]).unwrap();
        let header_line = output.lines().next().unwrap();
        assert_eq!(header_line.split(';').count(), 26);
        assert!(output.starts_with("noPermis;noGroupe"));
        assert!(output.contains("\r\n"));
    }

    #[test]
    fn data_row_derives_expected_columns() {
        let output = write_ssv(&[sample_record()]).unwrap();
        let data_line = output.lines().nth(1).unwrap();
        let fields: Vec<&str> = data_line.split(';').collect();
        assert_eq!(fields.len(), 26);
        assert_eq!(fields[0], "1234567");
        assert_eq!(fields[1], "0");
        assert_eq!(fields[2], "2025-02-06");
        assert_eq!(fields[4], "ABCD01020304");
        assert_eq!(fields[10], "3");
    }

    #[test]
    fn missing_sector_digit_defaults_to_zero() {
        let mut record = sample_record();
        record.secteur_activite = String::new();
        let output = write_ssv(&[record]).unwrap();
        let fields: Vec<&str> = output.lines().nth(1).unwrap().split(';').collect();
        assert_eq!(fields[10], "0");
    }
}
