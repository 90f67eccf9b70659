use std::fmt::Display;

use chrono::{
    DateTime, Datelike, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
    Weekday,
};

/// Fixed point all persisted instants are measured from (2001-01-01T00:00:00Z).
pub const REFERENCE_DATE: NaiveDateTime = NaiveDateTime::new(
    match NaiveDate::from_ymd_opt(2001, 1, 1) {
        Some(v) => v,
        None => panic!("reference date is valid"),
    },
    NaiveTime::MIN,
);

/// Identifies a calendar week by its ISO week-year and week number.
///
/// Ordering is chronological, which plain `"{year}-{week}"` strings are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WeekId {
    pub year: i32,
    pub week: u32,
}

impl WeekId {
    pub fn new(year: i32, week: u32) -> Option<Self> {
        NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).map(|_| Self { year, week })
    }

    /// Week the local calendar date of `moment` falls into.
    pub fn of<Tz: TimeZone>(moment: &DateTime<Tz>) -> Self {
        let iso = moment.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    pub fn monday(&self) -> NaiveDate {
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon)
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn start<Tz: TimeZone>(&self, tz: &Tz) -> DateTime<Tz> {
        day_start(tz, self.monday())
    }

    /// Exclusive end of the week, which is the start of the following one.
    pub fn end<Tz: TimeZone>(&self, tz: &Tz) -> DateTime<Tz> {
        day_start(tz, self.monday() + Days::new(7))
    }

    /// Key used by the persisted archive.
    pub fn archive_key(&self) -> String {
        format!("{}-{}", self.year, self.week)
    }

    pub fn parse_archive_key(key: &str) -> Option<Self> {
        let (year, week) = key.rsplit_once('-')?;
        Self::new(year.parse().ok()?, week.parse().ok()?)
    }
}

impl Display for WeekId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}

/// First instant of a local calendar day. If local midnight is skipped by a DST transition the
/// first instant that exists after it is used instead.
pub fn day_start<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    let midnight = date.and_time(NaiveTime::MIN);
    (0..=24)
        .find_map(|hour| {
            tz.from_local_datetime(&(midnight + Duration::hours(hour)))
                .earliest()
        })
        .unwrap_or_else(|| tz.from_utc_datetime(&midnight))
}

/// Returns the start (Monday, local midnight) of the week containing `now`.
pub fn start_of_week<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    WeekId::of(now).start(&now.timezone())
}

/// Returns January 1st, local midnight, of the calendar year containing `now`.
pub fn start_of_year<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let first = NaiveDate::from_yo_opt(now.year(), 1).unwrap_or(now.date_naive());
    day_start(&now.timezone(), first)
}

pub fn elapsed_since_week_start<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    now.clone() - start_of_week(now)
}

pub fn since_reference(moment: DateTime<Utc>) -> f64 {
    duration_to_seconds(moment - Utc.from_utc_datetime(&REFERENCE_DATE))
}

pub fn from_reference(seconds: f64) -> Option<DateTime<Utc>> {
    Utc.from_utc_datetime(&REFERENCE_DATE)
        .checked_add_signed(seconds_to_duration(seconds)?)
}

pub fn duration_to_seconds(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.
}

/// Converts persisted seconds back into a duration. Resolution is one millisecond.
pub fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    if !seconds.is_finite() {
        return None;
    }
    let millis = (seconds * 1000.).round();
    if millis.abs() >= i64::MAX as f64 {
        return None;
    }
    Duration::try_milliseconds(millis as i64)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_start_of_week_is_monday_midnight() {
        // 2024-07-04 is a Thursday
        let now = utc(2024, 7, 4, 15, 30);
        assert_eq!(start_of_week(&now), utc(2024, 7, 1, 0, 0));
        assert_eq!(elapsed_since_week_start(&now), Duration::hours(3 * 24 + 15) + Duration::minutes(30));
    }

    #[test]
    fn test_start_of_week_on_monday_and_sunday() {
        assert_eq!(start_of_week(&utc(2024, 7, 1, 0, 0)), utc(2024, 7, 1, 0, 0));
        assert_eq!(start_of_week(&utc(2024, 7, 7, 23, 59)), utc(2024, 7, 1, 0, 0));
    }

    #[test]
    fn test_week_id_crosses_year() {
        // 2024-12-30 belongs to ISO week 1 of 2025
        let week = WeekId::of(&utc(2024, 12, 31, 12, 0));
        assert_eq!(week, WeekId { year: 2025, week: 1 });
        assert_eq!(week.start(&Utc), utc(2024, 12, 30, 0, 0));
        assert_eq!(week.end(&Utc) - week.start(&Utc), Duration::days(7));
        assert_eq!(WeekId::of(&utc(2024, 12, 29, 23, 59)), WeekId { year: 2024, week: 52 });
    }

    #[test]
    fn test_start_of_year() {
        assert_eq!(start_of_year(&utc(2024, 7, 4, 15, 30)), utc(2024, 1, 1, 0, 0));
    }

    #[test]
    fn test_archive_key() {
        let week = WeekId::new(2024, 9).unwrap();
        assert_eq!(week.archive_key(), "2024-9");
        assert_eq!(WeekId::parse_archive_key("2024-9"), Some(week));
        assert_eq!(WeekId::parse_archive_key("2024-60"), None);
        assert_eq!(WeekId::parse_archive_key("garbage"), None);
        assert!(WeekId::new(2024, 9).unwrap() < WeekId::new(2024, 10).unwrap());
    }

    #[test]
    fn test_reference_round_trip_millis() {
        let moment = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2024, 7, 4)
                .unwrap()
                .and_hms_milli_opt(10, 0, 0, 250)
                .unwrap(),
        );
        let seconds = since_reference(moment);
        assert_eq!(from_reference(seconds), Some(moment));
        assert_eq!(from_reference(0.), Some(Utc.from_utc_datetime(&REFERENCE_DATE)));
        assert_eq!(from_reference(f64::NAN), None);
    }
}
