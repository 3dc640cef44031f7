//! Business-timezone calendar. The organization runs on a fixed UTC
//! offset (no DST), and every day/week/month window served by the API
//! is derived from these functions so all metrics agree on boundaries.

use chrono::{
    DateTime, Datelike, Days, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_UTC_OFFSET_HOURS: i32 = -5;

/// ISO-8601 week key: Monday-start weeks, week 1 is the week containing
/// the first Thursday of the year. `year` is the ISO week-based year,
/// which differs from the calendar year around January 1st.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IsoWeek {
    pub year: i32,
    pub week: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    offset: FixedOffset,
}

impl Default for Calendar {
    fn default() -> Self {
        Self {
            offset: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_HOURS * 3600)
                .unwrap_or_else(|| Utc.fix()),
        }
    }
}

impl Calendar {
    pub fn from_offset_hours(hours: i32) -> Option<Self> {
        FixedOffset::east_opt(hours * 3600).map(|offset| Self { offset })
    }

    /// Seconds east of UTC; negative for the default UTC-5 offset.
    pub fn offset_seconds(&self) -> i32 {
        self.offset.local_minus_utc()
    }

    pub fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// The local business date an instant falls on.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// 00:00:00 local on the given date, as a UTC instant usable in
    /// range queries against stored timestamps.
    pub fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        let local_midnight = date.and_time(NaiveTime::MIN);
        Utc.from_utc_datetime(&(local_midnight - Duration::seconds(self.offset_seconds() as i64)))
    }

    pub fn today_start_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.day_start(self.local_date(now))
    }

    /// Monday of the week the given local date belongs to. Sunday maps
    /// to the Monday six days earlier.
    pub fn week_start_date(&self, date: NaiveDate) -> NaiveDate {
        let back = date.weekday().num_days_from_monday() as u64;
        date.checked_sub_days(Days::new(back)).unwrap_or(date)
    }

    /// Monday 00:00:00 local of the current local week, as a UTC instant.
    pub fn week_start_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.day_start(self.week_start_date(self.local_date(now)))
    }

    pub fn iso_week_at(&self, instant: DateTime<Utc>) -> IsoWeek {
        let week = self.local_date(instant).iso_week();
        IsoWeek {
            year: week.year(),
            week: week.week(),
        }
    }

    /// January 1st 00:00 local of the current local year, as a UTC
    /// instant. Origin of the year-to-date window.
    pub fn year_start_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let date = self.local_date(now);
        self.day_start(NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date))
    }

    /// Inclusive local-date bounds of the current business year.
    pub fn year_range_at(&self, now: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
        let date = self.local_date(now);
        (
            NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
            NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date),
        )
    }

    pub fn today_start(&self) -> DateTime<Utc> {
        self.today_start_at(Utc::now())
    }

    pub fn week_start(&self) -> DateTime<Utc> {
        self.week_start_at(Utc::now())
    }

    pub fn iso_week(&self) -> IsoWeek {
        self.iso_week_at(Utc::now())
    }

    pub fn year_start(&self) -> DateTime<Utc> {
        self.year_start_at(Utc::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lima() -> Calendar {
        Calendar::from_offset_hours(-5).unwrap()
    }

    fn utc_at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn today_start_shifts_by_offset() {
        let calendar = lima();
        // 02:00 UTC is still the previous local day at UTC-5.
        let now = utc_at("2026-02-10T02:00:00Z");
        assert_eq!(
            calendar.today_start_at(now),
            utc_at("2026-02-09T05:00:00Z")
        );

        let later = utc_at("2026-02-10T12:00:00Z");
        assert_eq!(
            calendar.today_start_at(later),
            utc_at("2026-02-10T05:00:00Z")
        );
    }

    #[test]
    fn week_starts_on_monday_and_sunday_belongs_to_previous_week() {
        let calendar = lima();
        // 2026-02-01 is a Sunday in local time.
        let sunday_noon = utc_at("2026-02-01T17:00:00Z");
        assert_eq!(
            calendar.week_start_at(sunday_noon),
            utc_at("2026-01-26T05:00:00Z")
        );

        // Late Sunday evening local, already Monday in UTC.
        let sunday_night = utc_at("2026-02-02T03:00:00Z");
        assert_eq!(
            calendar.week_start_at(sunday_night),
            utc_at("2026-01-26T05:00:00Z")
        );

        // Monday local maps to itself.
        let monday = utc_at("2026-02-02T12:00:00Z");
        assert_eq!(
            calendar.week_start_at(monday),
            utc_at("2026-02-02T05:00:00Z")
        );
    }

    #[test]
    fn iso_week_follows_the_first_thursday_rule() {
        let calendar = lima();
        // 2026-01-01 is a Thursday, so it opens ISO week 1 of 2026.
        let jan_first = utc_at("2026-01-01T12:00:00Z");
        assert_eq!(
            calendar.iso_week_at(jan_first),
            IsoWeek {
                year: 2026,
                week: 1
            }
        );

        // 2027-01-01 is a Friday and still belongs to ISO week 53 of 2026.
        let next_year = utc_at("2027-01-01T12:00:00Z");
        assert_eq!(
            calendar.iso_week_at(next_year),
            IsoWeek {
                year: 2026,
                week: 53
            }
        );
    }

    #[test]
    fn iso_week_uses_the_local_date_not_the_utc_date() {
        let calendar = lima();
        // Monday 2026-01-05 02:00 UTC is still Sunday 2026-01-04 locally,
        // which belongs to ISO week 1; the UTC date would say week 2.
        let instant = utc_at("2026-01-05T02:00:00Z");
        assert_eq!(
            calendar.iso_week_at(instant),
            IsoWeek {
                year: 2026,
                week: 1
            }
        );
    }

    #[test]
    fn year_window_is_anchored_to_local_january_first() {
        let calendar = lima();
        let now = utc_at("2026-06-15T12:00:00Z");
        assert_eq!(calendar.year_start_at(now), utc_at("2026-01-01T05:00:00Z"));

        let (from, to) = calendar.year_range_at(now);
        assert_eq!(from, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(to, NaiveDate::from_ymd_opt(2026, 12, 31).unwrap());
    }
}
