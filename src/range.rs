// Date window encoded in an export's file name
//
// Exports saved as "YYYYMMDD-YYYYMMDD.csv" only contribute the
// transactions booked inside that (inclusive) window.

use crate::error::{ConvertError, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

fn file_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{8})-(\d{8})\.csv$").expect("static date range pattern")
    })
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(ConvertError::InvalidRange(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(DateRange { start, end })
    }

    /// Extract a range from a file name like "20240101-20240131.csv".
    ///
    /// Names that do not follow the pattern yield `Ok(None)`; names that
    /// follow it with impossible dates are an error.
    pub fn from_file_name(name: &str) -> Result<Option<Self>> {
        let Some(caps) = file_name_pattern().captures(name) else {
            return Ok(None);
        };

        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, "%Y%m%d").map_err(|_| {
                ConvertError::InvalidRange(format!("{:?} in file name {:?} is not a date", s, name))
            })
        };

        let start = parse(&caps[1])?;
        let end = parse(&caps[2])?;
        DateRange::new(start, end).map(Some)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Suffix used in output file names: "_20240101_20240131".
    pub fn file_suffix(&self) -> String {
        format!(
            "_{}_{}",
            self.start.format("%Y%m%d"),
            self.end.format("%Y%m%d")
        )
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}
