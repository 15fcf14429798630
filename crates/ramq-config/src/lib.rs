// crates/ramq-config/src/lib.rs
// ============================================================================
// Crate: ramq-config
// Description: Environment-driven configuration with fail-closed validation.
// Purpose: Implement SPEC_FULL.md §6 (configuration) and §12.
// ============================================================================

//! ## Overview
//! Every option has a validated default, but a value that IS present and
//! fails validation is a hard error rather than a silent fallback — this
//! crate never substitutes a default for a present-but-invalid value.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::env;

use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while loading [`RamqConfig`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A recognized variable was present but not a valid integer.
    #[error("{variable} must be a positive integer, got {value:?}")]
    NotAPositiveInteger {
        /// The environment variable name.
        variable: String,
        /// The raw string value that failed to parse.
        value: String,
    },
    /// A recognized variable was present but out of its valid range.
    #[error("{variable} must be between {min} and {max}, got {value}")]
    OutOfRange {
        /// The environment variable name.
        variable: String,
        /// The parsed value.
        value: u64,
        /// Inclusive minimum.
        min: u64,
        /// Inclusive maximum.
        max: u64,
    },
}

// ============================================================================
// SECTION: Bounds
// ============================================================================

const MAX_UPLOAD_BYTES_DEFAULT: u64 = 50 * 1024 * 1024;
const MAX_UPLOAD_BYTES_MIN: u64 = 1024;
const MAX_UPLOAD_BYTES_MAX: u64 = 1024 * 1024 * 1024;

const VALIDATION_WORKER_CONCURRENCY_DEFAULT: u64 = 2;
const VALIDATION_WORKER_CONCURRENCY_MIN: u64 = 1;
const VALIDATION_WORKER_CONCURRENCY_MAX: u64 = 64;

const RULES_CACHE_TTL_SECONDS_DEFAULT: u64 = 86_400;
const CODES_CACHE_TTL_SECONDS_DEFAULT: u64 = 3_600;
const CACHE_TTL_SECONDS_MIN: u64 = 1;
const CACHE_TTL_SECONDS_MAX: u64 = 7 * 86_400;

const RUN_TIMEOUT_SECONDS_DEFAULT: u64 = 600;
const RUN_TIMEOUT_SECONDS_MIN: u64 = 1;
const RUN_TIMEOUT_SECONDS_MAX: u64 = 24 * 3_600;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Resolved configuration for the validation engine (SPEC_FULL.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RamqConfig {
    /// Maximum accepted upload size, in bytes.
    pub max_upload_bytes: u64,
    /// Bounded concurrency of the validation worker pool.
    pub validation_worker_concurrency: u64,
    /// TTL of the rules reference snapshot, in seconds.
    pub rules_cache_ttl_seconds: u64,
    /// TTL of the codes/contexts/establishments reference snapshots, in seconds.
    pub codes_cache_ttl_seconds: u64,
    /// Hard per-run timeout, in seconds.
    pub run_timeout_seconds: u64,
}

impl Default for RamqConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: MAX_UPLOAD_BYTES_DEFAULT,
            validation_worker_concurrency: VALIDATION_WORKER_CONCURRENCY_DEFAULT,
            rules_cache_ttl_seconds: RULES_CACHE_TTL_SECONDS_DEFAULT,
            codes_cache_ttl_seconds: CODES_CACHE_TTL_SECONDS_DEFAULT,
            run_timeout_seconds: RUN_TIMEOUT_SECONDS_DEFAULT,
        }
    }
}

impl RamqConfig {
    /// Loads configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a present variable is unparseable or out
    /// of range; absent variables fall back to their validated default.
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: BTreeMap<String, String> = [
            "MAX_UPLOAD_BYTES",
            "VALIDATION_WORKER_CONCURRENCY",
            "RULES_CACHE_TTL_SECONDS",
            "CODES_CACHE_TTL_SECONDS",
            "RUN_TIMEOUT_SECONDS",
        ]
        .into_iter()
        .filter_map(|name| env::var(name).ok().map(|value| (name.to_string(), value)))
        .collect();
        Self::from_map(&vars)
    }

    /// Loads configuration from an explicit map, bypassing the process
    /// environment. Used by tests to avoid mutating real process state.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a present key is unparseable or out of range.
    pub fn from_map(vars: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            max_upload_bytes: parse_bounded(
                vars,
                "MAX_UPLOAD_BYTES",
                defaults.max_upload_bytes,
                MAX_UPLOAD_BYTES_MIN,
                MAX_UPLOAD_BYTES_MAX,
            )?,
            validation_worker_concurrency: parse_bounded(
                vars,
                "VALIDATION_WORKER_CONCURRENCY",
                defaults.validation_worker_concurrency,
                VALIDATION_WORKER_CONCURRENCY_MIN,
                VALIDATION_WORKER_CONCURRENCY_MAX,
            )?,
            rules_cache_ttl_seconds: parse_bounded(
                vars,
                "RULES_CACHE_TTL_SECONDS",
                defaults.rules_cache_ttl_seconds,
                CACHE_TTL_SECONDS_MIN,
                CACHE_TTL_SECONDS_MAX,
            )?,
            codes_cache_ttl_seconds: parse_bounded(
                vars,
                "CODES_CACHE_TTL_SECONDS",
                defaults.codes_cache_ttl_seconds,
                CACHE_TTL_SECONDS_MIN,
                CACHE_TTL_SECONDS_MAX,
            )?,
            run_timeout_seconds: parse_bounded(
                vars,
                "RUN_TIMEOUT_SECONDS",
                defaults.run_timeout_seconds,
                RUN_TIMEOUT_SECONDS_MIN,
                RUN_TIMEOUT_SECONDS_MAX,
            )?,
        })
    }
}

/// Parses `variable` from `vars`, falling back to `default` when absent and
/// validating the range when present.
fn parse_bounded(
    vars: &BTreeMap<String, String>,
    variable: &str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let Some(raw) = vars.get(variable) else { return Ok(default) };
    let parsed = raw.trim().parse::<u64>().map_err(|_| ConfigError::NotAPositiveInteger {
        variable: variable.to_string(),
        value: raw.clone(),
    })?;
    if parsed < min || parsed > max {
        return Err(ConfigError::OutOfRange { variable: variable.to_string(), value: parsed, min, max });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn absent_variables_use_validated_defaults() {
        let config = RamqConfig::from_map(&BTreeMap::new()).unwrap();
        assert_eq!(config, RamqConfig::default());
    }

    #[test]
    fn present_valid_value_overrides_default() {
        let config = RamqConfig::from_map(&map(&[("RUN_TIMEOUT_SECONDS", "120")])).unwrap();
        assert_eq!(config.run_timeout_seconds, 120);
    }

    #[test]
    fn present_invalid_value_is_a_hard_error_not_a_silent_default() {
        let err = RamqConfig::from_map(&map(&[("RUN_TIMEOUT_SECONDS", "not_a_number")])).unwrap_err();
        assert!(matches!(err, ConfigError::NotAPositiveInteger { .. }));
    }

    #[test]
    fn present_out_of_range_value_is_rejected() {
        let err = RamqConfig::from_map(&map(&[("VALIDATION_WORKER_CONCURRENCY", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }

    #[test]
    fn upper_bound_out_of_range_is_rejected() {
        let err = RamqConfig::from_map(&map(&[("MAX_UPLOAD_BYTES", "999999999999")])).unwrap_err();
        assert!(matches!(err, ConfigError::OutOfRange { .. }));
    }
}
