// src/services/calendar.rs

//! Local calendar used for every day- and month-bucketed rule.
//!
//! The offset is fixed (see `LOCAL_UTC_OFFSET_HOURS`), so a "day" is the same for every
//! user regardless of where the server runs. Quotas and streaks both go through here.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};

use crate::config::LOCAL_UTC_OFFSET_HOURS;

fn offset() -> Duration {
    Duration::hours(LOCAL_UTC_OFFSET_HOURS)
}

/// Local calendar date of an instant.
pub fn local_date_of(instant: DateTime<Utc>) -> NaiveDate {
    (instant + offset()).date_naive()
}

/// UTC instant at which the local `date` begins.
pub fn start_of_local_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc() - offset()
}

/// `[start, end)` of the local calendar month containing `instant`, as UTC instants.
pub fn local_month_bounds(instant: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = local_date_of(instant);
    let first = today - Duration::days(i64::from(today.day0()));
    // Any day 32 days after the 1st lies in the following month.
    let ahead = first + Duration::days(32);
    let next_first = ahead - Duration::days(i64::from(ahead.day0()));
    (start_of_local_day(first), start_of_local_day(next_first))
}

/// Whole local days from `earlier` to `later` (negative if `later` comes first).
pub fn days_between(earlier: NaiveDate, later: NaiveDate) -> i64 {
    (later - earlier).num_days()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_late_utc_evening_is_next_local_day() {
        // 16:00 UTC is midnight at UTC+8.
        assert_eq!(local_date_of(utc(2024, 3, 9, 15, 59)), date(2024, 3, 9));
        assert_eq!(local_date_of(utc(2024, 3, 9, 16, 0)), date(2024, 3, 10));
    }

    #[test]
    fn test_start_of_local_day() {
        assert_eq!(start_of_local_day(date(2024, 3, 10)), utc(2024, 3, 9, 16, 0));
        assert_eq!(local_date_of(start_of_local_day(date(2024, 3, 10))), date(2024, 3, 10));
    }

    #[test]
    fn test_month_bounds_follow_local_calendar() {
        // 2024-01-31 17:00 UTC is already February 1st locally.
        let (from, to) = local_month_bounds(utc(2024, 1, 31, 17, 0));
        assert_eq!(from, utc(2024, 1, 31, 16, 0));
        assert_eq!(to, utc(2024, 2, 29, 16, 0));

        let (from, to) = local_month_bounds(utc(2024, 12, 15, 4, 0));
        assert_eq!(from, utc(2024, 11, 30, 16, 0));
        assert_eq!(to, utc(2024, 12, 31, 16, 0));
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between(date(2024, 2, 28), date(2024, 3, 1)), 2);
        assert_eq!(days_between(date(2024, 3, 1), date(2024, 3, 1)), 0);
        assert_eq!(days_between(date(2024, 3, 2), date(2024, 3, 1)), -1);
    }
}
