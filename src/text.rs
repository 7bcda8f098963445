//! RRULE text form of a [`RecurrenceRule`].
//!
//! Only the rule itself is written or read: the zone, joined rules and
//! excepted rules have no place in the grammar.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc, Weekday};
use std::{fmt, str::FromStr};

use crate::{
    parse_weekday_code, weekday_code, End, Error, Frequency, RecurrenceRule, Result, WeekdayNum,
};

const UNTIL_FORMAT: &str = "%Y%m%dT%H%M%S";

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![format!("FREQ={}", self.freq)];

        if self.interval != 1 {
            parts.push(format!("INTERVAL={}", self.interval));
        }

        match self.end {
            End::Count(count) => parts.push(format!("COUNT={count}")),
            End::Until(until) => parts.push(format!("UNTIL={}Z", until.format(UNTIL_FORMAT))),
            End::Never => {}
        }

        if self.week_start != Weekday::Mon {
            parts.push(format!("WKST={}", weekday_code(self.week_start)));
        }

        push_list(&mut parts, "BYSETPOS", &self.by_set_pos);
        push_list(&mut parts, "BYMONTH", &self.by_month);
        push_list(&mut parts, "BYMONTHDAY", &self.by_month_day);
        push_list(&mut parts, "BYYEARDAY", &self.by_year_day);
        push_list(&mut parts, "BYWEEKNO", &self.by_week_no);
        push_list(&mut parts, "BYDAY", &self.by_day);
        push_list(&mut parts, "BYHOUR", &self.by_hour);
        push_list(&mut parts, "BYMINUTE", &self.by_minute);
        push_list(&mut parts, "BYSECOND", &self.by_second);

        write!(f, "{}", parts.join(";"))
    }
}

fn push_list<T: fmt::Display>(parts: &mut Vec<String>, name: &str, values: &[T]) {
    if !values.is_empty() {
        let s: Vec<_> = values.iter().map(ToString::to_string).collect();
        parts.push(format!("{name}={}", s.join(",")));
    }
}

impl FromStr for RecurrenceRule {
    type Err = Error;

    /// Parses an RRULE value such as `FREQ=MONTHLY;BYDAY=-1FR;COUNT=3`.
    ///
    /// An `RRULE:` or `EXRULE:` property prefix is skipped. Names are case
    /// insensitive and parts may come in any order, but each at most once.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let body = strip_prefix_ignore_case(s, "RRULE:")
            .or_else(|| strip_prefix_ignore_case(s, "EXRULE:"))
            .unwrap_or(s);

        let mut parts: Vec<(String, &str)> = Vec::new();
        for part in body.split(';').filter(|part| !part.trim().is_empty()) {
            let (name, value) = part
                .split_once('=')
                .ok_or_else(|| invalid(part.trim(), ""))?;
            let name = name.trim().to_ascii_uppercase();
            if parts.iter().any(|(seen, _)| *seen == name) {
                return Err(Error::DuplicatePart(name));
            }
            parts.push((name, value.trim()));
        }

        let freq = parts
            .iter()
            .find(|(name, _)| name == "FREQ")
            .ok_or(Error::MissingFrequency)?
            .1
            .parse::<Frequency>()?;
        let has = |wanted: &str| parts.iter().any(|(name, _)| name == wanted);
        if has("COUNT") && has("UNTIL") {
            return Err(Error::CountAndUntil);
        }

        let mut rule = RecurrenceRule::new(freq);
        for (name, value) in &parts {
            rule = match name.as_str() {
                "FREQ" => rule,
                "INTERVAL" => rule.with_interval(number(name, value)?),
                "COUNT" => rule.with_count(number(name, value)?),
                "UNTIL" => rule.with_until(parse_until(value)?),
                "WKST" => rule.with_week_start(
                    parse_weekday_code(value).ok_or_else(|| invalid(name, value))?,
                ),
                "BYSETPOS" => rule.by_set_pos(list::<i16>(name, value)?),
                "BYMONTH" => rule.by_month(list::<u8>(name, value)?),
                "BYMONTHDAY" => rule.by_month_day(list::<i8>(name, value)?),
                "BYYEARDAY" => rule.by_year_day(list::<i16>(name, value)?),
                "BYWEEKNO" => rule.by_week_no(list::<i8>(name, value)?),
                "BYDAY" => rule.by_week_day(list::<WeekdayNum>(name, value)?),
                "BYHOUR" => rule.by_hour(list::<u8>(name, value)?),
                "BYMINUTE" => rule.by_minute(list::<u8>(name, value)?),
                "BYSECOND" => rule.by_second(list::<u8>(name, value)?),
                _ => return Err(Error::UnknownPart(name.clone())),
            };
        }

        Ok(rule)
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn invalid(part: &str, value: &str) -> Error {
    Error::InvalidValue {
        part: part.to_string(),
        value: value.to_string(),
    }
}

fn number<T: FromStr>(part: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| invalid(part, value))
}

fn list<T: FromStr>(part: &str, value: &str) -> Result<Vec<T>> {
    value.split(',').map(|v| number(part, v.trim())).collect()
}

/// UNTIL in UTC (`Z` suffix), floating, or as a bare date covering that
/// whole day. Floating values are read as UTC.
fn parse_until(value: &str) -> Result<DateTime<Utc>> {
    let upper = value.to_ascii_uppercase();
    let stamp = upper.strip_suffix('Z').unwrap_or(&upper);

    let civil = if stamp.len() == 8 {
        NaiveDate::parse_from_str(stamp, "%Y%m%d")
            .ok()
            .and_then(|date| date.and_hms_opt(23, 59, 59))
    } else {
        NaiveDateTime::parse_from_str(stamp, UNTIL_FORMAT).ok()
    };

    civil
        .map(|civil| civil.and_utc())
        .ok_or_else(|| invalid("UNTIL", value))
}
