// crates/ramq-ingest/tests/pipeline_scenarios.rs
// ============================================================================
// Black-box tests: full parse_csv -> write_ssv path over realistic input.
// ============================================================================

//! Black-box tests: full parse_csv -> write_ssv path over realistic input.

use ramq_core::RunId;
use ramq_ingest::IngestError;

const HEADER: &str = "Facture;ID RAMQ;Date de Service;Début;Fin;Lieu de pratique;Secteur d'activité;Diagnostic;Code;Unités;Rôle;Élément de contexte;Montant Preliminaire;Montant Payé;Doctor Info;Patient;Notes internes";

#[test]
fn unrecognized_column_is_preserved_into_custom_fields() {
    let csv = format!(
        "{HEADER}\nF1;R1;2025-02-06;10:00;10:30;50012;1;;8857;;;;59,70;59,70;DOC1;PAT1;dossier urgent\n"
    );
    let outcome = ramq_ingest::parse_csv(RunId::new_random(), csv.as_bytes()).expect("valid csv");
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.records[0].custom_fields.get("Notes internes").map(String::as_str), Some("dossier urgent"));
}

#[test]
fn parsed_records_survive_an_ssv_export_round_trip() {
    let csv = format!(
        "{HEADER}\nF1;R1;2025-02-06;10:00;10:30;50012;1;;8857;;;;59,70;59,70;DOC1;PAT1;\nF2;R2;2025-02-06;11:00;11:30;50012;1;;8859;;;;59,70;59,70;DOC1;PAT2;\n"
    );
    let outcome = ramq_ingest::parse_csv(RunId::new_random(), csv.as_bytes()).expect("valid csv");
    let ssv = ramq_ingest::write_ssv(&outcome.records).expect("ssv export");

    let lines: Vec<&str> = ssv.lines().collect();
    assert_eq!(lines.len(), 3, "header plus two data rows");
    assert!(lines[1].contains("PAT1"));
    assert!(lines[2].contains("PAT2"));
}

#[test]
fn a_file_missing_the_code_column_fails_before_any_row_is_parsed() {
    let csv = "Facture;ID RAMQ;Date de Service;Lieu de pratique\nF1;R1;2025-02-06;50012\n";
    let error = ramq_ingest::parse_csv(RunId::new_random(), csv.as_bytes()).unwrap_err();
    assert!(matches!(error, IngestError::MissingCriticalColumn(_)));
}

#[test]
fn a_mix_of_good_and_malformed_rows_keeps_the_good_ones() {
    let csv = format!(
        "{HEADER}\nF1;R1;2025-02-06;10:00;10:30;50012;1;;8857;;;;not_money;;DOC1;PAT1;\nF2;R2;2025-02-06;10:00;10:30;50012;1;;8859;;;;59,70;;DOC1;PAT2;\n"
    );
    let outcome = ramq_ingest::parse_csv(RunId::new_random(), csv.as_bytes()).expect("at least one usable row");
    assert_eq!(outcome.records.len(), 1);
    assert_eq!(outcome.row_errors.len(), 1);
    assert_eq!(outcome.records[0].code, "8859");
}
