use chrono::{Datelike as _, Days, NaiveDate, Weekday};
use std::{cmp::Ordering, fmt, str::FromStr};

/// A BYDAY entry: a weekday with an optional ordinal.
///
/// An ordinal of `0` means every such weekday in the period, `n > 0` the nth
/// one counted from the start of the period and `n < 0` the nth one counted
/// from its end (`-1` is the last).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekdayNum {
    pub ordinal: i8,
    pub weekday: Weekday,
}

impl WeekdayNum {
    #[must_use]
    pub const fn every(weekday: Weekday) -> Self {
        Self {
            ordinal: 0,
            weekday,
        }
    }

    #[must_use]
    pub const fn nth(ordinal: i8, weekday: Weekday) -> Self {
        Self { ordinal, weekday }
    }

    #[must_use]
    pub const fn is_numbered(&self) -> bool {
        self.ordinal != 0
    }

    /// Dates between `first` and `last` (inclusive) selected by this entry.
    ///
    /// Numbered entries select at most one date.
    pub(crate) fn dates_between(&self, first: NaiveDate, last: NaiveDate) -> Vec<NaiveDate> {
        match self.ordinal.cmp(&0) {
            Ordering::Equal => {
                let offset = days_until(first.weekday(), self.weekday);
                let mut dates = Vec::new();
                let mut cursor = first.checked_add_days(Days::new(offset.into()));
                while let Some(date) = cursor.filter(|date| *date <= last) {
                    dates.push(date);
                    cursor = date.checked_add_days(Days::new(7));
                }
                dates
            }
            Ordering::Greater => {
                let skip = u64::from(days_until(first.weekday(), self.weekday))
                    + 7 * (u64::from(self.ordinal.unsigned_abs()) - 1);
                first
                    .checked_add_days(Days::new(skip))
                    .filter(|date| *date <= last)
                    .into_iter()
                    .collect()
            }
            Ordering::Less => {
                let back = u64::from(days_until(self.weekday, last.weekday()))
                    + 7 * (u64::from(self.ordinal.unsigned_abs()) - 1);
                last.checked_sub_days(Days::new(back))
                    .filter(|date| *date >= first)
                    .into_iter()
                    .collect()
            }
        }
    }
}

impl From<Weekday> for WeekdayNum {
    fn from(weekday: Weekday) -> Self {
        Self::every(weekday)
    }
}

impl From<(i8, Weekday)> for WeekdayNum {
    fn from((ordinal, weekday): (i8, Weekday)) -> Self {
        Self::nth(ordinal, weekday)
    }
}

// Only used to sort and dedup BYDAY lists; generation never relies on it.
impl Ord for WeekdayNum {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.ordinal, self.weekday.num_days_from_monday())
            .cmp(&(other.ordinal, other.weekday.num_days_from_monday()))
    }
}

impl PartialOrd for WeekdayNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for WeekdayNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_numbered() {
            write!(f, "{}", self.ordinal)?;
        }
        f.write_str(weekday_code(self.weekday))
    }
}

impl FromStr for WeekdayNum {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        let invalid = || crate::Error::InvalidValue {
            part: "BYDAY".to_string(),
            value: s.to_string(),
        };

        let split = s.len().checked_sub(2).ok_or_else(invalid)?;
        if !s.is_char_boundary(split) {
            return Err(invalid());
        }
        let (ordinal, code) = s.split_at(split);
        let weekday = parse_weekday_code(code).ok_or_else(invalid)?;
        let ordinal = match ordinal {
            "" => 0,
            n => {
                let n = n.parse::<i8>().map_err(|_| invalid())?;
                if n == 0 {
                    return Err(invalid());
                }
                n
            }
        };

        Ok(Self::nth(ordinal, weekday))
    }
}

/// Two-letter RRULE code of a weekday.
#[must_use]
pub const fn weekday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

/// Parses a two-letter RRULE weekday code (case-insensitive).
#[must_use]
pub fn parse_weekday_code(code: &str) -> Option<Weekday> {
    Some(match code.to_ascii_uppercase().as_str() {
        "MO" => Weekday::Mon,
        "TU" => Weekday::Tue,
        "WE" => Weekday::Wed,
        "TH" => Weekday::Thu,
        "FR" => Weekday::Fri,
        "SA" => Weekday::Sat,
        "SU" => Weekday::Sun,
        _ => return None,
    })
}

/// Position of `weekday` in a week that begins on `week_start`, in `0..=6`.
#[must_use]
pub fn days_from_week_start(week_start: Weekday, weekday: Weekday) -> u32 {
    days_until(week_start, weekday)
}

/// Days to walk forward from `from` until reaching `to`, in `0..=6`.
fn days_until(from: Weekday, to: Weekday) -> u32 {
    (to.num_days_from_monday() + 7 - from.num_days_from_monday()) % 7
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike as _;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn display() {
        assert_eq!(WeekdayNum::every(Weekday::Mon).to_string(), "MO");
        assert_eq!(WeekdayNum::nth(2, Weekday::Fri).to_string(), "2FR");
        assert_eq!(WeekdayNum::nth(-1, Weekday::Sun).to_string(), "-1SU");
    }

    #[test]
    fn parse() {
        assert_eq!("mo".parse::<WeekdayNum>(), Ok(WeekdayNum::every(Weekday::Mon)));
        assert_eq!("+3TU".parse::<WeekdayNum>(), Ok(WeekdayNum::nth(3, Weekday::Tue)));
        assert_eq!("-1SU".parse::<WeekdayNum>(), Ok(WeekdayNum::nth(-1, Weekday::Sun)));
        assert!("0MO".parse::<WeekdayNum>().is_err());
        assert!("X".parse::<WeekdayNum>().is_err());
        assert!("2XX".parse::<WeekdayNum>().is_err());
    }

    #[test]
    fn every_friday_in_january() {
        let fridays =
            WeekdayNum::every(Weekday::Fri).dates_between(date(2021, 1, 1), date(2021, 1, 31));
        let days: Vec<_> = fridays.iter().map(|d| d.day()).collect();
        assert_eq!(days, [1, 8, 15, 22, 29]);
    }

    #[test]
    fn numbered_weekdays() {
        let (first, last) = (date(2021, 2, 1), date(2021, 2, 28));
        let nth = |ordinal, weekday| WeekdayNum::nth(ordinal, weekday).dates_between(first, last);
        assert_eq!(nth(2, Weekday::Mon), vec![date(2021, 2, 8)]);
        assert_eq!(nth(-1, Weekday::Fri), vec![date(2021, 2, 26)]);
        assert_eq!(nth(-1, Weekday::Sun), vec![date(2021, 2, 28)]);
        assert!(WeekdayNum::nth(5, Weekday::Mon).dates_between(first, last).is_empty());
    }

    #[test]
    fn week_start_ordering() {
        assert_eq!(days_from_week_start(Weekday::Mon, Weekday::Mon), 0);
        assert_eq!(days_from_week_start(Weekday::Sun, Weekday::Sat), 6);
        assert_eq!(days_from_week_start(Weekday::Wed, Weekday::Tue), 6);
    }
}
