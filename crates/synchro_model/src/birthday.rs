//! Birthdays as stored on the device and in the CRM.
//!
//! The device keeps year/month/day parts (year optional); the CRM keeps an
//! ISO date string. `YYYY-MM-DD` is used when the year is known and the
//! ISO 8601 truncated form `--MM-DD` otherwise.

use crate::error::{ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A birthday, optionally without a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Birthday {
    /// Year, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Month (1-12).
    pub month: u8,
    /// Day of month (1-31).
    pub day: u8,
}

impl Birthday {
    /// Creates a birthday, validating month and day ranges.
    pub fn new(year: Option<i32>, month: u8, day: u8) -> ModelResult<Self> {
        let candidate = Self { year, month, day };
        candidate.validate(&candidate.to_iso())?;
        Ok(candidate)
    }

    /// Formats as an ISO date string.
    pub fn to_iso(&self) -> String {
        match self.year {
            Some(year) => format!("{:04}-{:02}-{:02}", year, self.month, self.day),
            None => format!("--{:02}-{:02}", self.month, self.day),
        }
    }

    /// Parses an ISO date (`YYYY-MM-DD`, `--MM-DD`, or a date-time whose
    /// date part is one of those).
    pub fn parse_iso(input: &str) -> ModelResult<Self> {
        let trimmed = input.trim();
        let date = trimmed.split('T').next().unwrap_or(trimmed);

        let (year, rest) = if let Some(rest) = date.strip_prefix("--") {
            (None, rest)
        } else {
            let (year, rest) = date
                .split_once('-')
                .ok_or_else(|| ModelError::birthday(input, "expected YYYY-MM-DD"))?;
            if year.len() != 4 {
                return Err(ModelError::birthday(input, "year must have four digits"));
            }
            let year = year
                .parse::<i32>()
                .map_err(|_| ModelError::birthday(input, "year is not a number"))?;
            (Some(year), rest)
        };

        let (month, day) = rest
            .split_once('-')
            .ok_or_else(|| ModelError::birthday(input, "expected month and day"))?;
        let month = parse_part(input, month, "month is not a number")?;
        let day = parse_part(input, day, "day is not a number")?;

        let birthday = Self { year, month, day };
        birthday.validate(input)?;
        Ok(birthday)
    }

    fn validate(&self, input: &str) -> ModelResult<()> {
        if !(1..=12).contains(&self.month) {
            return Err(ModelError::birthday(input, "month out of range"));
        }
        if self.day == 0 || self.day > days_in_month(self.year, self.month) {
            return Err(ModelError::birthday(input, "day out of range"));
        }
        Ok(())
    }
}

fn parse_part(input: &str, part: &str, reason: &'static str) -> ModelResult<u8> {
    if part.len() != 2 {
        return Err(ModelError::birthday(input, reason));
    }
    part.parse::<u8>()
        .map_err(|_| ModelError::birthday(input, reason))
}

fn days_in_month(year: Option<i32>, month: u8) -> u8 {
    match month {
        2 => match year {
            Some(y) if !(y % 4 == 0 && (y % 100 != 0 || y % 400 == 0)) => 28,
            _ => 29,
        },
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

impl FromStr for Birthday {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        Self::parse_iso(s)
    }
}

impl fmt::Display for Birthday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_iso())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_with_and_without_year() {
        let full = Birthday::new(Some(1990), 3, 7).unwrap();
        assert_eq!(full.to_iso(), "1990-03-07");

        let partial = Birthday::new(None, 12, 25).unwrap();
        assert_eq!(partial.to_iso(), "--12-25");
    }

    #[test]
    fn parse_accepts_dates_and_datetimes() {
        assert_eq!(
            Birthday::parse_iso("1990-03-07").unwrap(),
            Birthday::new(Some(1990), 3, 7).unwrap()
        );
        assert_eq!(
            Birthday::parse_iso("--02-29").unwrap(),
            Birthday::new(None, 2, 29).unwrap()
        );
        assert_eq!(
            Birthday::parse_iso("1985-11-02T00:00:00.000Z").unwrap(),
            Birthday::new(Some(1985), 11, 2).unwrap()
        );
    }

    #[test]
    fn parse_rejects_invalid_dates() {
        assert!(Birthday::parse_iso("").is_err());
        assert!(Birthday::parse_iso("1990-13-01").is_err());
        assert!(Birthday::parse_iso("1990-04-31").is_err());
        assert!(Birthday::parse_iso("2023-02-29").is_err());
        assert!(Birthday::parse_iso("March 7").is_err());
        assert!(Birthday::parse_iso("90-03-07").is_err());
    }

    #[test]
    fn leap_day_without_year_is_valid() {
        assert!(Birthday::new(None, 2, 29).is_ok());
        assert!(Birthday::new(Some(2000), 2, 29).is_ok());
        assert!(Birthday::new(Some(1900), 2, 29).is_err());
    }
}
