// crates/ramq-rules/src/handlers/mod.rs
// ============================================================================
// Module: Rule-Type Handler Catalogue
// Description: One submodule per `ruleType`, each implementing `RuleHandler`.
// Purpose: Group the handler implementations the registry dispatches to.
// ============================================================================

//! ## Overview
//! One submodule per `ruleType`, each implementing `RuleHandler`.

pub mod annual_limit;
pub mod daily_time_limit;
pub mod declarative;
pub mod office_fee;
pub mod visit_duration;
