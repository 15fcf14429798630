// crates/ramq-core/src/time_util.rs
// ============================================================================
// Module: RAMQ Time Model
// Description: Calendar dates, clock times, and duration arithmetic for billings.
// Purpose: Provide deterministic date/time parsing with no timezone conversion.
// Dependencies: time, serde, thiserror
// ============================================================================

//! ## Overview
//! RAMQ billing timestamps are Quebec wall-clock values with no timezone
//! component; this engine never performs timezone conversion anywhere. A
//! `dateService` is grouped by its calendar-date component exactly as
//! written in the source CSV (see `SPEC_FULL.md` §9, the resolved "Open
//! Question" on daily-time-limit grouping).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::Date;
use time::Month;
use time::Time;
use time::macros::format_description;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while parsing calendar dates or clock times.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeParseError {
    /// The date string did not match `YYYY-MM-DD`.
    #[error("invalid service date: {0:?}")]
    InvalidDate(String),
    /// The time string did not match `HH:MM`.
    #[error("invalid clock time: {0:?}")]
    InvalidTime(String),
}

// ============================================================================
// SECTION: Service Date
// ============================================================================

/// A calendar date, e.g. the date component of a `dateService` field.
///
/// # Invariants
/// - Carries no timezone information; equality is by calendar date only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceDate(Date);

impl ServiceDate {
    /// Parses `YYYY-MM-DD`, the canonical ISO form produced by ingestion.
    ///
    /// # Errors
    ///
    /// Returns [`TimeParseError::InvalidDate`] when the string is not a
    /// well-formed ISO calendar date.
    pub fn parse(raw: &str) -> Result<Self, TimeParseError> {
        let format = format_description!("[year]-[month]-[day]");
        Date::parse(raw.trim(), &format)
            .map(Self)
            .map_err(|_| TimeParseError::InvalidDate(raw.to_string()))
    }

    /// Extracts the date component from a `dateService` value that may carry
    /// a trailing time (`YYYY-MM-DDTHH:MM:SS` or `YYYY-MM-DD HH:MM:SS`).
    ///
    /// # Errors
    ///
    /// Returns [`TimeParseError::InvalidDate`] when no leading ISO date can
    /// be extracted.
    pub fn parse_leading(raw: &str) -> Result<Self, TimeParseError> {
        let trimmed = raw.trim();
        let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
        Self::parse(date_part)
    }

    /// Returns the underlying year.
    #[must_use]
    pub const fn year(self) -> i32 {
        self.0.year()
    }

    /// Returns the underlying month.
    #[must_use]
    pub const fn month(self) -> Month {
        self.0.month()
    }

    /// Returns the underlying day of month.
    #[must_use]
    pub const fn day(self) -> u8 {
        self.0.day()
    }
}

impl fmt::Display for ServiceDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year(), self.month() as u8, self.day())
    }
}

impl TryFrom<String> for ServiceDate {
    type Error = TimeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ServiceDate> for String {
    fn from(value: ServiceDate) -> Self {
        value.to_string()
    }
}

// ============================================================================
// SECTION: Clock Time
// ============================================================================

/// A wall-clock time of day with minute precision, e.g. `debut`/`fin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(Time);

impl ClockTime {
    /// Parses `HH:MM`.
    ///
    /// # Errors
    ///
    /// Returns [`TimeParseError::InvalidTime`] when the string is not a
    /// well-formed `HH:MM` value.
    pub fn parse(raw: &str) -> Result<Self, TimeParseError> {
        let format = format_description!("[hour]:[minute]");
        Time::parse(raw.trim(), &format)
            .map(Self)
            .map_err(|_| TimeParseError::InvalidTime(raw.to_string()))
    }

    /// Returns the number of minutes since midnight.
    #[must_use]
    pub const fn minutes_since_midnight(self) -> u32 {
        self.0.hour() as u32 * 60 + self.0.minute() as u32
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

impl TryFrom<String> for ClockTime {
    type Error = TimeParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

/// Computes the duration in minutes between `debut` and `fin`, treating a
/// `fin` earlier than `debut` as crossing midnight (adding 24h).
///
/// Returns `None` when the resulting duration is zero or negative, matching
/// the "no finding" edge case in the visit-duration handler.
#[must_use]
pub fn duration_minutes_crossing_midnight(debut: ClockTime, fin: ClockTime) -> Option<u32> {
    const MINUTES_PER_DAY: u32 = 24 * 60;
    let start = debut.minutes_since_midnight();
    let end = fin.minutes_since_midnight();
    let raw = if end < start { end + MINUTES_PER_DAY - start } else { end - start };
    if raw == 0 { None } else { Some(raw) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_iso_date() {
        let date = ServiceDate::parse("2025-02-06").unwrap();
        assert_eq!(date.to_string(), "2025-02-06");
    }

    #[test]
    fn parse_leading_extracts_date_from_timestamp() {
        let date = ServiceDate::parse_leading("2025-02-06T08:30:00").unwrap();
        assert_eq!(date.to_string(), "2025-02-06");
        let date2 = ServiceDate::parse_leading("2025-02-06 08:30:00").unwrap();
        assert_eq!(date2.to_string(), "2025-02-06");
    }

    #[test]
    fn dec31_and_jan1_are_different_years() {
        let d1 = ServiceDate::parse("2024-12-31").unwrap();
        let d2 = ServiceDate::parse("2025-01-01").unwrap();
        assert_ne!(d1.year(), d2.year());
    }

    #[test]
    fn clock_time_round_trips() {
        let t = ClockTime::parse("08:05").unwrap();
        assert_eq!(t.to_string(), "08:05");
        assert_eq!(t.minutes_since_midnight(), 485);
    }

    #[test]
    fn duration_simple() {
        let start = ClockTime::parse("10:00").unwrap();
        let end = ClockTime::parse("10:30").unwrap();
        assert_eq!(duration_minutes_crossing_midnight(start, end), Some(30));
    }

    #[test]
    fn duration_crossing_midnight() {
        let start = ClockTime::parse("23:45").unwrap();
        let end = ClockTime::parse("00:15").unwrap();
        assert_eq!(duration_minutes_crossing_midnight(start, end), Some(30));
    }

    #[test]
    fn zero_duration_is_none() {
        let t = ClockTime::parse("10:00").unwrap();
        assert_eq!(duration_minutes_crossing_midnight(t, t), None);
    }
}
