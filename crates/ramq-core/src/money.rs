// crates/ramq-core/src/money.rs
// ============================================================================
// Module: RAMQ Money
// Description: Fixed-scale currency amounts backed by integer cents.
// Purpose: Avoid floating-point drift in tariff and monetary-impact arithmetic.
// Dependencies: bigdecimal, serde, thiserror
// ============================================================================

//! ## Overview
//! All monetary values in the engine are represented as whole cents (`i64`)
//! internally. Parsing accepts Quebec-locale decimal strings (`,` as the
//! fractional separator, optional currency symbol and surrounding
//! whitespace) and display always renders two fractional digits with `.` as
//! the separator, matching the canonical wire format used by findings and
//! reference data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::ops::Add;
use std::ops::Neg;
use std::ops::Sub;

use bigdecimal::BigDecimal;
use bigdecimal::ToPrimitive;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while parsing a monetary amount.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The input could not be parsed as a decimal number.
    #[error("invalid monetary amount: {0:?}")]
    InvalidAmount(String),
    /// The amount overflowed the internal cents representation.
    #[error("monetary amount out of range: {0:?}")]
    OutOfRange(String),
}

// ============================================================================
// SECTION: Money
// ============================================================================

/// A monetary amount stored as whole cents.
///
/// # Invariants
/// - Internal representation never loses precision relative to a two
///   fractional-digit decimal amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money {
    cents: i64,
}

impl Money {
    /// The zero amount.
    pub const ZERO: Self = Self { cents: 0 };

    /// Constructs a [`Money`] value from a whole number of cents.
    #[must_use]
    pub const fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Returns the amount as a whole number of cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.cents
    }

    /// Returns true when the amount is strictly greater than zero.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.cents > 0
    }

    /// Parses a Quebec-locale decimal string into a [`Money`] value.
    ///
    /// Accepts an optional leading `$`, a `,` or `.` fractional separator,
    /// thousands separators (spaces or non-breaking spaces), and surrounding
    /// whitespace. An empty or blank string parses as zero, matching the
    /// convention that an absent `montantPaye` means unpaid.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::InvalidAmount`] when the string is not a
    /// recognizable decimal number, and [`MoneyError::OutOfRange`] when the
    /// value cannot be represented in cents.
    pub fn parse_quebec_locale(raw: &str) -> Result<Self, MoneyError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::ZERO);
        }

        let cleaned: String = trimmed
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '$')
            .collect();
        let normalized = cleaned.replace(',', ".");
        if normalized.is_empty() {
            return Ok(Self::ZERO);
        }

        let decimal: BigDecimal = normalized
            .parse()
            .map_err(|_| MoneyError::InvalidAmount(raw.to_string()))?;
        let scaled = decimal * BigDecimal::from(100);
        let rounded = scaled.round(0);
        rounded
            .to_i64()
            .map(Self::from_cents)
            .ok_or_else(|| MoneyError::OutOfRange(raw.to_string()))
    }

    /// Returns the decimal value as an `f64` for reporting-only contexts.
    ///
    /// Never use this for comparisons or further arithmetic; it exists only
    /// to populate JSON `ruleData` payloads whose consumers expect a number.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        reason = "reporting payloads tolerate f64 rounding beyond 2^53 cents, far above any tariff amount"
    )]
    pub fn as_f64(self) -> f64 {
        self.cents as f64 / 100.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let negative = self.cents < 0;
        let magnitude = self.cents.unsigned_abs();
        let whole = magnitude / 100;
        let frac = magnitude % 100;
        if negative {
            write!(f, "-{whole}.{frac:02}")
        } else {
            write!(f, "{whole}.{frac:02}")
        }
    }
}

impl Add for Money {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::from_cents(self.cents + rhs.cents)
    }
}

impl Sub for Money {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::from_cents(self.cents - rhs.cents)
    }
}

impl Neg for Money {
    type Output = Self;

    fn neg(self) -> Self {
        Self::from_cents(-self.cents)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comma_decimal() {
        assert_eq!(Money::parse_quebec_locale("32,40").unwrap(), Money::from_cents(3_240));
    }

    #[test]
    fn parses_dot_decimal_and_currency_symbol() {
        assert_eq!(Money::parse_quebec_locale("$ 64.80").unwrap(), Money::from_cents(6_480));
    }

    #[test]
    fn empty_or_blank_is_zero() {
        assert_eq!(Money::parse_quebec_locale("").unwrap(), Money::ZERO);
        assert_eq!(Money::parse_quebec_locale("   ").unwrap(), Money::ZERO);
    }

    #[test]
    fn rejects_garbage() {
        assert!(Money::parse_quebec_locale("abc").is_err());
    }

    #[test]
    fn display_pads_fraction() {
        assert_eq!(Money::from_cents(3_240).to_string(), "32.40");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-3_240).to_string(), "-32.40");
    }

    #[test]
    fn avoids_float_drift_on_repeated_addition() {
        let unit = Money::parse_quebec_locale("0,10").unwrap();
        let total: Money = std::iter::repeat(unit).take(10).sum();
        assert_eq!(total, Money::from_cents(100));
    }
}
