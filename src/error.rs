use thiserror::Error;

use crate::{Frequency, WeekdayNum};

/// Errors raised when a rule is validated or parsed from RRULE text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("interval must be greater than or equal to 1")]
    ZeroInterval,

    #[error("count must be greater than or equal to 1")]
    ZeroCount,

    #[error("invalid {part} value `{value}` (values must be in range {range})")]
    OutOfRange {
        part: &'static str,
        value: i32,
        range: &'static str,
    },

    #[error("{part} cannot be used with {freq} frequency")]
    UnsupportedPart {
        part: &'static str,
        freq: Frequency,
    },

    #[error("numbered weekday `{0}` requires MONTHLY, or YEARLY without BYWEEKNO")]
    NumberedWeekday(WeekdayNum),

    #[error("BYSETPOS requires at least one other BY* rule part")]
    LoneSetPos,

    #[error("missing FREQ rule part")]
    MissingFrequency,

    #[error("unknown rule part `{0}`")]
    UnknownPart(String),

    #[error("duplicate rule part `{0}`")]
    DuplicatePart(String),

    #[error("invalid value `{value}` for rule part {part}")]
    InvalidValue { part: String, value: String },

    #[error("COUNT and UNTIL are mutually exclusive")]
    CountAndUntil,
}

pub type Result<T> = std::result::Result<T, Error>;
