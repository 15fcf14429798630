// crates/ramq-core/src/lib.rs
// ============================================================================
// Crate: ramq-core
// Description: Canonical domain model, identifiers, and handler contract.
// Purpose: Shared vocabulary for ingestion, rule handlers, the engine, and storage.
// ============================================================================

//! ## Overview
//! `ramq-core` has no knowledge of CSV, SQLite, or queues. It defines the
//! entities in SPEC_FULL.md §3, the [`handler::RuleHandler`] contract every
//! rule type implements, and the [`reference::ReferenceSnapshot`] those
//! handlers read from.

#![forbid(unsafe_code)]

pub mod error;
pub mod handler;
pub mod identifiers;
pub mod model;
pub mod money;
pub mod reference;
pub mod time_util;

pub use error::CoreError;
pub use handler::HandlerError;
pub use handler::RuleHandler;
pub use identifiers::BillingRecordId;
pub use identifiers::RecordNumber;
pub use identifiers::ResultId;
pub use identifiers::RuleId;
pub use identifiers::RunId;
pub use model::BillingCode;
pub use model::BillingRecord;
pub use model::CodeClassification;
pub use model::ContextElement;
pub use model::Establishment;
pub use model::Rule;
pub use model::RunErrorCode;
pub use model::RunStage;
pub use model::RunTotals;
pub use model::Severity;
pub use model::ValidationResult;
pub use model::ValidationRun;
pub use model::is_cabinet_id;
pub use money::Money;
pub use money::MoneyError;
pub use reference::ReferenceSnapshot;
pub use time_util::ClockTime;
pub use time_util::ServiceDate;
pub use time_util::TimeParseError;
pub use time_util::duration_minutes_crossing_midnight;
