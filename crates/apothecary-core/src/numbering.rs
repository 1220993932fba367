//! # Document Numbering
//!
//! Human-readable, day-scoped sequential numbers for sales, prescriptions and
//! lab tests.
//!
//! ## Format
//! ```text
//!   INV 20261016 0007
//!   ─┬─ ───┬──── ──┬─
//!    │     │       └── counter, zero-padded to 4, starts at 0001
//!    │     └────────── local calendar date
//!    └──────────────── kind prefix (INV = sale, RX = prescription, LAB = lab test)
//! ```
//!
//! The storage layer finds the greatest existing number for today's prefix
//! and asks [`next_number`] for its successor. A UNIQUE constraint catches
//! two writers that computed the same number; the loser retries with
//! `floor` set past the number it tried.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

/// Width of the trailing counter.
pub const COUNTER_WIDTH: usize = 4;

/// Highest counter value a single day can reach.
pub const MAX_COUNTER: u32 = 9999;

/// Which document sequence a number belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Sale invoices.
    Invoice,
    Prescription,
    LabTest,
}

impl DocumentKind {
    pub const fn code(self) -> &'static str {
        match self {
            DocumentKind::Invoice => "INV",
            DocumentKind::Prescription => "RX",
            DocumentKind::LabTest => "LAB",
        }
    }

    /// Prefix shared by every number issued for `date`, e.g. `RX20261016`.
    pub fn prefix(self, date: NaiveDate) -> String {
        format!("{}{}", self.code(), date.format("%Y%m%d"))
    }

    /// Formats a complete number.
    pub fn format(self, date: NaiveDate, counter: u32) -> String {
        format!("{}{:0width$}", self.prefix(date), counter, width = COUNTER_WIDTH)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Extracts the trailing counter of a number issued under `prefix`.
///
/// ```rust
/// use apothecary_core::numbering::parse_counter;
///
/// assert_eq!(parse_counter("INV20261016", "INV202610160042").unwrap(), 42);
/// assert!(parse_counter("INV20261016", "INV20261016ABCD").is_err());
/// ```
pub fn parse_counter(prefix: &str, number: &str) -> CoreResult<u32> {
    let malformed = || CoreError::MalformedDocumentNumber(number.to_string());

    let suffix = number.strip_prefix(prefix).ok_or_else(malformed)?;
    if suffix.len() != COUNTER_WIDTH || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    suffix.parse().map_err(|_| malformed())
}

/// Computes the next number for `kind` on `date`.
///
/// - `latest`: greatest number already issued with today's prefix, if any
/// - `floor`: the result's counter is at least this (used after a conflict)
///
/// ```rust
/// use apothecary_core::numbering::{next_number, DocumentKind};
/// use chrono::NaiveDate;
///
/// let day = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();
/// assert_eq!(next_number(DocumentKind::Invoice, day, None, 0).unwrap(), "INV202610160001");
/// assert_eq!(
///     next_number(DocumentKind::Invoice, day, Some("INV202610160001"), 0).unwrap(),
///     "INV202610160002"
/// );
/// ```
pub fn next_number(
    kind: DocumentKind,
    date: NaiveDate,
    latest: Option<&str>,
    floor: u32,
) -> CoreResult<String> {
    let prefix = kind.prefix(date);

    let last = match latest {
        Some(number) => parse_counter(&prefix, number)?,
        None => 0,
    };
    let next = (last + 1).max(floor).max(1);

    if next > MAX_COUNTER {
        return Err(CoreError::NumberSpaceExhausted(prefix));
    }

    Ok(kind.format(date, next))
}

// =============================================================================
// Unit Tests
// =============================================================================
