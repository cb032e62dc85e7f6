//! Pay period model.
//!
//! This module contains the [`PayPeriod`] type identifying the calendar month
//! a payroll calculation covers.

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// A monthly pay period.
///
/// Pay periods are always whole calendar months. The month is guaranteed to
/// be in `1..=12`, which is enforced both by [`PayPeriod::new`] and when
/// deserializing.
///
/// # Example
///
/// ```
/// use payroll_engine::models::PayPeriod;
/// use chrono::NaiveDate;
///
/// let period = PayPeriod::new(2, 2028).unwrap();
/// assert_eq!(period.start_date(), NaiveDate::from_ymd_opt(2028, 2, 1).unwrap());
/// assert_eq!(period.end_date(), NaiveDate::from_ymd_opt(2028, 2, 29).unwrap());
/// assert_eq!(period.to_string(), "2028-02");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "PayPeriodFields")]
pub struct PayPeriod {
    year: i32,
    month: u32,
}

#[derive(Deserialize)]
struct PayPeriodFields {
    month: u32,
    year: i32,
}

impl TryFrom<PayPeriodFields> for PayPeriod {
    type Error = EngineError;

    fn try_from(fields: PayPeriodFields) -> Result<Self, Self::Error> {
        PayPeriod::new(fields.month, fields.year)
    }
}

impl PayPeriod {
    /// Creates a pay period for the given month (1-12) and year.
    pub fn new(month: u32, year: i32) -> EngineResult<Self> {
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(EngineError::Validation {
                field: "period".to_string(),
                message: format!("{}-{:02} is not a valid pay period", year, month),
            });
        }
        Ok(Self { year, month })
    }

    /// Returns the month number (1-12).
    pub fn month(&self) -> u32 {
        self.month
    }

    /// Returns the year.
    pub fn year(&self) -> i32 {
        self.year
    }

    /// Returns the first day of the period.
    pub fn start_date(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    /// Returns the last day of the period (inclusive).
    pub fn end_date(&self) -> NaiveDate {
        let next_month_start = if self.month == 12 {
            NaiveDate::from_ymd_opt(self.year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(self.year, self.month + 1, 1)
        };
        next_month_start
            .and_then(|date| date.pred_opt())
            .unwrap_or_default()
    }

    /// Returns the number of calendar days in the period.
    pub fn calendar_days(&self) -> u32 {
        self.end_date().day()
    }

    /// Checks if a given date falls within this pay period.
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for PayPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}
