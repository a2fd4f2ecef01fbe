use chrono::{Datelike, NaiveDate};

use crate::error::{Error, Result};

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Whole days from `start` to `end`. Negative when `end` precedes `start`.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> i64 {
    (end - start).num_days()
}

/// Three-letter English abbreviation for a 1-based month number.
pub fn month_abbreviation(month: u32) -> Option<&'static str> {
    MONTH_ABBREVIATIONS.get(month.checked_sub(1)? as usize).copied()
}

/// Month label used for backup directories and run log grouping, e.g. `"Oct 2026"`.
pub fn month_label(d: NaiveDate) -> String {
    // month() is always 1..=12
    let abbrev = month_abbreviation(d.month()).unwrap_or("???");
    format!("{abbrev} {}", d.year())
}

/// Parse a `YYYY-MM-DD` date given on the command line or in config.
pub fn parse_iso_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| Error::DateParse(format!("expected YYYY-MM-DD, got {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between(d(2024, 1, 1), d(2024, 1, 11)), 10);
        assert_eq!(days_between(d(2024, 1, 11), d(2024, 1, 1)), -10);
        assert_eq!(days_between(d(2024, 2, 28), d(2024, 3, 1)), 2); // Leap year
        assert_eq!(days_between(d(2024, 5, 5), d(2024, 5, 5)), 0);
    }

    #[test]
    fn test_month_abbreviation() {
        assert_eq!(month_abbreviation(1), Some("Jan"));
        assert_eq!(month_abbreviation(12), Some("Dec"));
        assert_eq!(month_abbreviation(0), None);
        assert_eq!(month_abbreviation(13), None);
    }

    #[test]
    fn test_month_label() {
        assert_eq!(month_label(d(2026, 10, 19)), "Oct 2026");
        assert_eq!(month_label(d(2024, 3, 1)), "Mar 2024");
    }

    #[test]
    fn test_parse_iso_date() {
        assert_eq!(parse_iso_date("2024-06-01").unwrap(), d(2024, 6, 1));
        assert_eq!(parse_iso_date(" 2024-06-01 ").unwrap(), d(2024, 6, 1));
        assert!(parse_iso_date("06/01/2024").is_err());
        assert!(parse_iso_date("").is_err());
    }
}
