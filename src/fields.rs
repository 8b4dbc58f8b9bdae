// Field-level parsing for DKB exports
//
// DKB writes German number and date formats:
//   amounts  "-1.234,56" (thousands '.', decimal ',')
//   dates    "30.10.23"  (dd.mm.yy, older exports use dd.mm.yyyy)
// YNAB wants plain decimals ("-1234.56") and ISO dates.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("invalid amount {0:?}")]
    Amount(String),

    #[error("invalid booking date {0:?}")]
    Date(String),
}

// ============================================================================
// AMOUNT
// ============================================================================

/// Money amount in euro cents. Negative values are outflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(i64);

impl Amount {
    pub fn from_cents(cents: i64) -> Self {
        Amount(cents)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

/// Plain decimal form as written to YNAB files ("-1234.56").
impl FromStr for Amount {
    type Err = FieldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (negative, digits) = split_sign(s.trim());
        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };
        to_cents(negative, int_part, frac_part)
            .map(Amount)
            .ok_or_else(|| FieldError::Amount(s.to_string()))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a DKB amount column ("1.234,56", "-12,3", "5 €").
pub fn parse_amount(raw: &str) -> Result<Amount, FieldError> {
    let invalid = || FieldError::Amount(raw.to_string());

    let trimmed = raw.trim().trim_end_matches('€').trim();
    let (negative, digits) = split_sign(trimmed);
    let (int_part, frac_part) = match digits.split_once(',') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };

    // Thousands groups must be well formed, so "12.34" is not silently read as 1234
    let int_digits = if int_part.contains('.') {
        let mut groups = int_part.split('.');
        let first = groups.next().unwrap_or("");
        if first.is_empty() || first.len() > 3 || groups.any(|g| g.len() != 3) {
            return Err(invalid());
        }
        int_part.replace('.', "")
    } else {
        int_part.to_string()
    };

    to_cents(negative, &int_digits, frac_part)
        .map(Amount)
        .ok_or_else(invalid)
}

fn split_sign(s: &str) -> (bool, &str) {
    if let Some(rest) = s.strip_prefix('-') {
        (true, rest.trim_start())
    } else if let Some(rest) = s.strip_prefix('+') {
        (false, rest.trim_start())
    } else {
        (false, s)
    }
}

fn to_cents(negative: bool, int_part: &str, frac_part: &str) -> Option<i64> {
    if int_part.is_empty() || frac_part.len() > 2 {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole: i64 = int_part.parse().ok()?;
    let frac: i64 = match frac_part.len() {
        0 => 0,
        1 => frac_part.parse::<i64>().ok()? * 10,
        _ => frac_part.parse().ok()?,
    };

    let cents = whole.checked_mul(100)?.checked_add(frac)?;
    Some(if negative { -cents } else { cents })
}

// ============================================================================
// DATES
// ============================================================================

/// Parse a DKB booking date. Two-digit years are tried first.
pub fn parse_booking_date(raw: &str) -> Result<NaiveDate, FieldError> {
    let s = raw.trim();
    NaiveDate::parse_from_str(s, "%d.%m.%y")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d.%m.%Y"))
        .map_err(|_| FieldError::Date(raw.to_string()))
}
