//! Half-year assessment periods.
//!
//! Half 1 covers January through June, half 2 July through December.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::errors::EngineError;

const MONTHS_PER_HALF: u32 = 6;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    pub half: u8,
    pub start_month: String,
    pub end_month: String,
    pub label: String,
}

impl Period {
    pub fn new(year: i32, half: u8) -> Result<Self, EngineError> {
        if !(1..=2).contains(&half) {
            return Err(EngineError::Validation(format!(
                "period half must be 1 or 2, got {half}"
            )));
        }
        if !(1..=9999).contains(&year) {
            return Err(EngineError::Validation(format!(
                "period year must be in range 1..=9999, got {year}"
            )));
        }

        Ok(Self::build(year, half))
    }

    /// The period containing `at`.
    pub fn containing(at: DateTime<Utc>) -> Self {
        let half = if at.month() <= MONTHS_PER_HALF { 1 } else { 2 };
        Self::build(at.year(), half)
    }

    pub fn current(clock: &dyn Clock) -> Self {
        Self::containing(clock.now())
    }

    /// The six `YYYY-MM` keys of this period, in calendar order.
    pub fn months(&self) -> Vec<String> {
        let first = first_month(self.half);
        (first..first + MONTHS_PER_HALF).map(|month| month_key(self.year, month)).collect()
    }

    pub fn contains_month(&self, month: &str) -> bool {
        month >= self.start_month.as_str() && month <= self.end_month.as_str()
    }

    pub fn previous(&self) -> Self {
        match self.half {
            1 => Self::build(self.year - 1, 2),
            _ => Self::build(self.year, 1),
        }
    }

    pub fn next(&self) -> Self {
        match self.half {
            1 => Self::build(self.year, 2),
            _ => Self::build(self.year + 1, 1),
        }
    }

    fn build(year: i32, half: u8) -> Self {
        let first = first_month(half);
        let half_label = if half == 1 { "上期" } else { "下期" };
        Self {
            year,
            half,
            start_month: month_key(year, first),
            end_month: month_key(year, first + MONTHS_PER_HALF - 1),
            label: format!("{year}年{half_label}"),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}H{}", self.year, self.half)
    }
}

/// Parses the `2026H1` form produced by `Display`.
impl FromStr for Period {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            EngineError::Validation(format!("invalid period `{value}` (expected e.g. 2026H1)"))
        };
        let normalized = value.trim().to_ascii_uppercase();
        let (year, half) = normalized.split_once('H').ok_or_else(invalid)?;
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let half = half.parse::<u8>().map_err(|_| invalid())?;
        Self::new(year, half)
    }
}

fn first_month(half: u8) -> u32 {
    if half == 1 {
        1
    } else {
        MONTHS_PER_HALF + 1
    }
}

fn month_key(year: i32, month: u32) -> String {
    format!("{year:04}-{month:02}")
}
