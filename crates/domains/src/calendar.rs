//! Activity-check calendar.
//!
//! Checks happen on the last calendar day of each month. Posts made on or
//! after the cutoff date (check date minus the window) keep a character
//! active through the upcoming check.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Days before the check date at which the posting window opens.
pub const DEFAULT_CUTOFF_WINDOW_DAYS: u32 = 7;

/// The day before the first of the following month.
pub fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next_first| next_first.pred_opt())
        .unwrap_or(date)
}

/// The upcoming check date as seen from `now`.
///
/// The last day of the current month is never in the past relative to
/// `now`, so the date rolls over to the next month exactly when the
/// current check day has fully elapsed.
pub fn next_check_date(now: DateTime<Utc>) -> NaiveDate {
    last_day_of_month(now.date_naive())
}

/// The most recent check date that has already arrived, counting today.
pub fn latest_check_date(now: DateTime<Utc>) -> NaiveDate {
    let today = now.date_naive();
    if today == last_day_of_month(today) {
        return today;
    }
    today
        .with_day(1)
        .and_then(|first| first.pred_opt())
        .unwrap_or(today)
}

pub fn cutoff_date(next_check: NaiveDate, window_days: u32) -> NaiveDate {
    next_check
        .checked_sub_days(Days::new(u64::from(window_days)))
        .unwrap_or(next_check)
}

/// Midnight UTC at the start of `date`.
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Next check and its cutoff, as displayed to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSchedule {
    pub next_check_date: NaiveDate,
    pub cutoff_date: NaiveDate,
}

impl CheckSchedule {
    pub fn at(now: DateTime<Utc>, window_days: u32) -> Self {
        let next_check_date = next_check_date(now);
        Self {
            next_check_date,
            cutoff_date: cutoff_date(next_check_date, window_days),
        }
    }

    /// The check that most recently came due, for passes run after the fact.
    pub fn latest(now: DateTime<Utc>, window_days: u32) -> Self {
        let next_check_date = latest_check_date(now);
        Self {
            next_check_date,
            cutoff_date: cutoff_date(next_check_date, window_days),
        }
    }

    /// First instant that still counts toward the upcoming check.
    pub fn cutoff_instant(&self) -> DateTime<Utc> {
        start_of_day(self.cutoff_date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn next_check_is_last_day_of_current_month() {
        let now = Utc.with_ymd_and_hms(2026, 4, 3, 12, 0, 0).unwrap();
        assert_eq!(next_check_date(now), date(2026, 4, 30));
    }

    #[test]
    fn check_day_itself_is_still_upcoming() {
        let now = Utc.with_ymd_and_hms(2026, 1, 31, 23, 59, 59).unwrap();
        assert_eq!(next_check_date(now), date(2026, 1, 31));
    }

    #[test]
    fn rolls_over_once_check_day_has_elapsed() {
        let now = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        assert_eq!(next_check_date(now), date(2026, 2, 28));

        let new_year = Utc.with_ymd_and_hms(2027, 1, 1, 0, 0, 1).unwrap();
        assert_eq!(next_check_date(new_year), date(2027, 1, 31));
    }

    #[test]
    fn february_respects_leap_years() {
        let leap = Utc.with_ymd_and_hms(2028, 2, 10, 8, 0, 0).unwrap();
        assert_eq!(next_check_date(leap), date(2028, 2, 29));
        assert_eq!(last_day_of_month(date(1900, 2, 1)), date(1900, 2, 28));
        assert_eq!(last_day_of_month(date(2000, 2, 1)), date(2000, 2, 29));
        assert_eq!(last_day_of_month(date(2026, 12, 31)), date(2026, 12, 31));
    }

    #[test]
    fn cutoff_is_one_week_before_check() {
        let schedule = CheckSchedule::at(
            Utc.with_ymd_and_hms(2026, 3, 15, 9, 30, 0).unwrap(),
            DEFAULT_CUTOFF_WINDOW_DAYS,
        );
        assert_eq!(schedule.next_check_date, date(2026, 3, 31));
        assert_eq!(schedule.cutoff_date, date(2026, 3, 24));
        assert_eq!(
            schedule.cutoff_instant(),
            Utc.with_ymd_and_hms(2026, 3, 24, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn latest_check_looks_back_until_check_day() {
        let mid_month = Utc.with_ymd_and_hms(2026, 3, 10, 0, 0, 0).unwrap();
        assert_eq!(latest_check_date(mid_month), date(2026, 2, 28));

        let check_day = Utc.with_ymd_and_hms(2026, 3, 31, 6, 0, 0).unwrap();
        assert_eq!(latest_check_date(check_day), date(2026, 3, 31));
        assert_eq!(CheckSchedule::latest(check_day, 7).cutoff_date, date(2026, 3, 24));
    }

    #[test]
    fn cutoff_can_cross_month_boundary() {
        assert_eq!(cutoff_date(date(2026, 2, 28), 30), date(2026, 1, 29));
    }
}
