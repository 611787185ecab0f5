//! Calendar-date parsing for reports, sheets and persisted tables.
//!
//! Everything in the engine is date-only. Timestamps coming from spreadsheet
//! exports are cut to their date so comparisons never drift on time of day.

use chrono::{Days, Duration, NaiveDate, NaiveDateTime};

const ISO_DATE: &str = "%Y-%m-%d";

/// Date formats accepted from pasted reports, day-first where ambiguous.
const DAY_FIRST_DATES: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d %b %Y", "%d-%b-%Y", "%d %B %Y",
    "%b %d, %Y", "%B %d, %Y", "%d/%m/%y",
];

const DATE_TIMES: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

/// Build a date from literal components.
///
/// # Panics
///
/// Panics if the components do not form a calendar date. Only call with
/// literals.
pub fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap_or_else(|| panic!("invalid calendar date {year}-{month}-{day}"))
}

/// Parse a report date, resolving `01/02/2024` as 1 February.
pub fn parse_day_first(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    DAY_FIRST_DATES
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATE_TIMES
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Parse a stored date: ISO first, then a timestamp cut to its date.
pub fn parse_stored_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, ISO_DATE)
        .ok()
        .or_else(|| parse_day_first(s))
}

pub fn format_iso(date: NaiveDate) -> String {
    date.format(ISO_DATE).to_string()
}

/// Signed number of calendar days from `from` to `to`.
pub fn days_between(from: NaiveDate, to: NaiveDate) -> i64 {
    to.signed_duration_since(from).num_days()
}

pub fn add_days(date: NaiveDate, days: i64) -> NaiveDate {
    date + Duration::days(days)
}

/// `date` shifted by `days`, or `None` outside the calendar chrono can represent.
pub fn try_add_days(date: NaiveDate, days: i64) -> Option<NaiveDate> {
    let shift = Days::new(days.unsigned_abs());
    if days >= 0 {
        date.checked_add_days(shift)
    } else {
        date.checked_sub_days(shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_first_resolution() {
        assert_eq!(parse_day_first("01/02/2024"), Some(ymd(2024, 2, 1)));
        assert_eq!(parse_day_first("10-01-2024"), Some(ymd(2024, 1, 10)));
        assert_eq!(parse_day_first("2024-01-10"), Some(ymd(2024, 1, 10)));
        assert_eq!(parse_day_first("15 Mar 2025"), Some(ymd(2025, 3, 15)));
    }

    #[test]
    fn test_timestamps_cut_to_date() {
        assert_eq!(parse_stored_date("2024-08-19 00:00:00"), Some(ymd(2024, 8, 19)));
        assert_eq!(parse_day_first("19/08/2024 13:45"), Some(ymd(2024, 8, 19)));
    }

    #[test]
    fn test_unparseable_dates() {
        assert_eq!(parse_day_first("-"), None);
        assert_eq!(parse_day_first(""), None);
        assert_eq!(parse_stored_date("not a date"), None);
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between(ymd(2024, 1, 10), ymd(2024, 2, 9)), 30);
        assert_eq!(days_between(ymd(2024, 2, 9), ymd(2024, 1, 10)), -30);
        assert_eq!(add_days(ymd(2024, 2, 28), 1), ymd(2024, 2, 29));
    }

    #[test]
    fn test_try_add_days_bounds() {
        assert_eq!(try_add_days(ymd(2024, 1, 10), 30), Some(ymd(2024, 2, 9)));
        assert_eq!(try_add_days(ymd(2024, 1, 10), -10), Some(ymd(2023, 12, 31)));
        assert_eq!(try_add_days(ymd(2024, 1, 10), 99_999_999_999), None);
        assert_eq!(try_add_days(ymd(2024, 1, 10), i64::MIN), None);
    }
}
