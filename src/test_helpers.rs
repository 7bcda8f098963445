use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone as _};
use chrono_tz::Tz;

pub const ONE_MINUTE: TimeDelta = TimeDelta::minutes(1);
pub const ONE_HOUR: TimeDelta = TimeDelta::hours(1);
pub const ONE_DAY: TimeDelta = TimeDelta::days(1);
pub const ONE_WEEK: TimeDelta = TimeDelta::weeks(1);

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn datetime(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> NaiveDateTime {
    date(year, month, day).and_hms_opt(hour, min, sec).unwrap()
}

pub fn utc(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Tz> {
    Tz::UTC
        .with_ymd_and_hms(year, month, day, hour, min, sec)
        .unwrap()
}

/// Thursday, 2021-07-01 09:00 UTC
pub fn july_first() -> DateTime<Tz> {
    utc(2021, 7, 1, 9, 0, 0)
}
