//! RFC 5545 recurrence rules expanded into lazy sequences of timezone aware
//! instants.
//!
//! A [`RecurrenceRule`] is built from a frequency and any number of BY*
//! filters, then anchored at a start instant with [`RecurrenceRule::from`]:
//!
//! ```
//! use chrono::{TimeZone, Weekday};
//! use recurrence::RecurrenceRule;
//!
//! let start = chrono_tz::Europe::Paris
//!     .with_ymd_and_hms(2021, 1, 1, 9, 0, 0)
//!     .unwrap();
//! let last_fridays: Vec<_> = RecurrenceRule::monthly()
//!     .by_week_day([(-1, Weekday::Fri)])
//!     .in_zone(chrono_tz::Europe::Paris)
//!     .with_count(3)
//!     .from(&start)
//!     .unwrap()
//!     .collect();
//!
//! assert_eq!(last_fridays[0].to_rfc3339(), "2021-01-29T09:00:00+01:00");
//! assert_eq!(last_fridays.len(), 3);
//! ```
//!
//! Rules can be unioned with [`RecurrenceRule::join`] and subtracted with
//! [`RecurrenceRule::except`], and round-trip through the RRULE text form via
//! `Display` and `FromStr`.
//!
//! # Unbounded sequences
//!
//! A rule without a count or an until bound never ends. Collecting or
//! counting such a sequence does not return; bound it with `take`,
//! `take_while` or a bounded rule.

mod error;
mod expand;
mod frequency;
mod rrule;
mod set;
mod text;
mod tz_date_iterator;
mod weekday;
mod zone;

#[cfg(test)]
mod test_helpers;

use chrono::{DateTime, Utc};

pub use chrono::Weekday;
pub use error::{Error, Result};
pub use frequency::Frequency;
pub use rrule::{Combined, RecurrenceRule};
pub use set::Occurrences;
pub use weekday::{days_from_week_start, parse_weekday_code, weekday_code, WeekdayNum};
pub use zone::is_utc_equivalent;

/// When a rule stops producing instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum End {
    #[default]
    Never,
    /// Stop after this many instants.
    Count(u32),
    /// Stop after the last instant at or before this one.
    Until(DateTime<Utc>),
}
