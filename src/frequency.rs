use chrono::{Months, NaiveDateTime, TimeDelta};
use std::{fmt, str::FromStr};

/// The base period of a recurrence rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Secondly,
    Minutely,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    /// Returns the RRULE spelling of this frequency.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Secondly => "SECONDLY",
            Self::Minutely => "MINUTELY",
            Self::Hourly => "HOURLY",
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }

    /// Moves `start` forward by `periods` units of this frequency.
    ///
    /// Months and years use calendar arithmetic, so the day of the month is
    /// clamped when the target month is shorter (Jan 31 + 1 month = Feb 28/29).
    /// Returns `None` on overflow.
    pub(crate) fn advance(self, start: NaiveDateTime, periods: i64) -> Option<NaiveDateTime> {
        let delta = match self {
            Self::Secondly => TimeDelta::try_seconds(periods)?,
            Self::Minutely => TimeDelta::try_minutes(periods)?,
            Self::Hourly => TimeDelta::try_hours(periods)?,
            Self::Daily => TimeDelta::try_days(periods)?,
            Self::Weekly => TimeDelta::try_weeks(periods)?,
            Self::Monthly => return add_months(start, periods),
            Self::Yearly => return add_months(start, periods.checked_mul(12)?),
        };
        start.checked_add_signed(delta)
    }

    /// Length of one period in seconds, for frequencies whose periods don't
    /// depend on the calendar.
    pub(crate) fn fixed_seconds(self) -> Option<i64> {
        match self {
            Self::Secondly => Some(1),
            Self::Minutely => Some(60),
            Self::Hourly => Some(3_600),
            Self::Daily => Some(86_400),
            Self::Weekly => Some(604_800),
            Self::Monthly | Self::Yearly => None,
        }
    }
}

fn add_months(start: NaiveDateTime, months: i64) -> Option<NaiveDateTime> {
    let months = u32::try_from(months).ok()?;
    start.checked_add_months(Months::new(months))
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "SECONDLY" => Self::Secondly,
            "MINUTELY" => Self::Minutely,
            "HOURLY" => Self::Hourly,
            "DAILY" => Self::Daily,
            "WEEKLY" => Self::Weekly,
            "MONTHLY" => Self::Monthly,
            "YEARLY" => Self::Yearly,
            _ => {
                return Err(crate::Error::InvalidValue {
                    part: "FREQ".to_string(),
                    value: s.to_string(),
                })
            }
        })
    }
}
