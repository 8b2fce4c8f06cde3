use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseMonthError {
    #[error("expected YYYY-MM, got {0:?}")]
    Format(String),
    #[error("month out of range: {0}")]
    MonthRange(u32),
}

/// Year-month position of the backward-walking ingestion.
///
/// Ordering follows the calendar, so `cursor < horizon` means the cursor has
/// walked past the oldest month worth fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthCursor {
    year: i32,
    month: u32,
}

impl MonthCursor {
    pub fn new(year: i32, month: u32) -> Result<Self, ParseMonthError> {
        if !(1..=12).contains(&month) {
            return Err(ParseMonthError::MonthRange(month));
        }
        Ok(Self { year, month })
    }

    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    pub fn minus_months(&self, months: u32) -> Self {
        let total = i64::from(self.year) * 12 + i64::from(self.month) - 1 - i64::from(months);
        Self {
            year: total.div_euclid(12) as i32,
            month: (total.rem_euclid(12) + 1) as u32,
        }
    }

    /// Inclusive created-at filter for the GitHub listing API,
    /// e.g. `2026-08-01..2026-08-31`.
    pub fn date_range(&self) -> String {
        format!(
            "{:04}-{:02}-01..{:04}-{:02}-{:02}",
            self.year,
            self.month,
            self.year,
            self.month,
            days_in_month(self.year, self.month)
        )
    }
}

impl fmt::Display for MonthCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthCursor {
    type Err = ParseMonthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| ParseMonthError::Format(s.to_string()))?;
        let year: i32 = year
            .parse()
            .map_err(|_| ParseMonthError::Format(s.to_string()))?;
        let month: u32 = month
            .parse()
            .map_err(|_| ParseMonthError::Format(s.to_string()))?;
        Self::new(year, month)
    }
}

impl Serialize for MonthCursor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MonthCursor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if year % 4 == 0 && (year % 100 != 0 || year % 400 == 0) {
                29
            } else {
                28
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn prev_crosses_year_boundary() {
        let jan = MonthCursor::new(2026, 1).unwrap();
        assert_eq!(jan.prev(), MonthCursor::new(2025, 12).unwrap());
        let aug = MonthCursor::new(2026, 8).unwrap();
        assert_eq!(aug.prev(), MonthCursor::new(2026, 7).unwrap());
    }

    #[test]
    fn minus_months_wraps_years() {
        let aug = MonthCursor::new(2026, 8).unwrap();
        assert_eq!(aug.minus_months(12), MonthCursor::new(2025, 8).unwrap());
        assert_eq!(aug.minus_months(8), MonthCursor::new(2025, 12).unwrap());
        assert_eq!(aug.minus_months(0), aug);
    }

    #[test]
    fn calendar_ordering() {
        let older = MonthCursor::new(2025, 12).unwrap();
        let newer = MonthCursor::new(2026, 1).unwrap();
        assert!(older < newer);
    }

    #[test]
    fn date_range_handles_month_lengths() {
        assert_eq!(
            MonthCursor::new(2026, 8).unwrap().date_range(),
            "2026-08-01..2026-08-31"
        );
        assert_eq!(
            MonthCursor::new(2026, 2).unwrap().date_range(),
            "2026-02-01..2026-02-28"
        );
        assert_eq!(
            MonthCursor::new(2024, 2).unwrap().date_range(),
            "2024-02-01..2024-02-29"
        );
        assert_eq!(
            MonthCursor::new(2026, 4).unwrap().date_range(),
            "2026-04-01..2026-04-30"
        );
    }

    #[test]
    fn parse_and_display_round_trip() {
        let cursor: MonthCursor = "2026-08".parse().unwrap();
        assert_eq!(cursor.to_string(), "2026-08");
        assert!("2026-13".parse::<MonthCursor>().is_err());
        assert!("garbage".parse::<MonthCursor>().is_err());
    }

    #[test]
    fn from_datetime_takes_calendar_month() {
        let at = Utc.with_ymd_and_hms(2026, 8, 24, 12, 30, 0).unwrap();
        assert_eq!(
            MonthCursor::from_datetime(at),
            MonthCursor::new(2026, 8).unwrap()
        );
    }
}
