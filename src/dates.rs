// 📅 Date Ranges - Inclusive calendar-day windows
//
// Ledger queries take inclusive [start, end] ranges. Backward expansion works
// in whole calendar weeks, so the half-open "[new_start, old_start)" slice is
// expressed here as the inclusive range ending the day before old_start.

use crate::error::{SyncError, SyncResult};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DAYS_PER_WEEK: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range, rejecting `end < start`
    pub fn new(start: NaiveDate, end: NaiveDate) -> SyncResult<Self> {
        if end < start {
            return Err(SyncError::InvalidRange { start, end });
        }
        Ok(DateRange { start, end })
    }

    /// The `days`-day window ending on (and including) `end`
    pub fn trailing_days(end: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        DateRange {
            start: end - Duration::days(span),
            end,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days covered (always >= 1)
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// The week immediately before this range: [start - 7d, start - 1d]
    pub fn week_before(&self) -> DateRange {
        DateRange {
            start: self.start - Duration::days(DAYS_PER_WEEK),
            end: self.start - Duration::days(1),
        }
    }

    /// This range grown backward by one week
    pub fn extended_back_one_week(&self) -> DateRange {
        DateRange {
            start: self.start - Duration::days(DAYS_PER_WEEK),
            end: self.end,
        }
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.start, self.end)
    }
}

/// Parse a date as typed by an operator or found in exports
///
/// Supports YYYY-MM-DD, MM/DD/YYYY and DD.MM.YYYY
pub fn parse_date(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    ["%Y-%m-%d", "%m/%d/%Y", "%d.%m.%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::day;

    #[test]
    fn test_rejects_inverted_range() {
        let err = DateRange::new(day(2025, 3, 10), day(2025, 3, 9)).unwrap_err();
        assert!(matches!(err, SyncError::InvalidRange { .. }));

        // Single-day window is fine
        assert!(DateRange::new(day(2025, 3, 10), day(2025, 3, 10)).is_ok());
    }

    #[test]
    fn test_week_before_is_adjacent_and_seven_days() {
        let range = DateRange::new(day(2025, 3, 1), day(2025, 3, 31)).unwrap();
        let week = range.week_before();

        assert_eq!(week.start, day(2025, 2, 22));
        assert_eq!(week.end, day(2025, 2, 28));
        assert_eq!(week.days(), 7);
        assert!(!week.contains(range.start));
    }

    #[test]
    fn test_extend_crosses_year_boundary() {
        let range = DateRange::new(day(2025, 1, 3), day(2025, 1, 10)).unwrap();
        let extended = range.extended_back_one_week();

        assert_eq!(extended.start, day(2024, 12, 27));
        assert_eq!(extended.end, day(2025, 1, 10));
    }

    #[test]
    fn test_trailing_days() {
        let range = DateRange::trailing_days(day(2025, 3, 31), 30);
        assert_eq!(range.start, day(2025, 3, 2));
        assert_eq!(range.days(), 30);
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2025-03-01"), Some(day(2025, 3, 1)));
        assert_eq!(parse_date("03/01/2025"), Some(day(2025, 3, 1)));
        assert_eq!(parse_date("01.03.2025"), Some(day(2025, 3, 1)));
        assert_eq!(parse_date("yesterday"), None);
    }
}
