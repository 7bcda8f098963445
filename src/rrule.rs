use chrono::{DateTime, SubsecRound as _, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use std::sync::Arc;

use crate::{End, Error, Frequency, Occurrences, Result, WeekdayNum};

/// An immutable RFC 5545 recurrence rule.
///
/// Rules are built from a frequency constructor followed by any number of
/// `with_*`/`by_*` calls, each of which returns the updated rule. Clone a
/// rule to branch it; the original is never affected.
///
/// A rule only produces instants once it is anchored with [`from`]. The
/// resulting sequence is infinite unless the rule carries a count or an until
/// bound, so unbounded rules must be consumed with `take`, `take_while` or
/// similar.
///
/// [`from`]: RecurrenceRule::from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceRule {
    pub(crate) freq: Frequency,
    pub(crate) interval: u32,
    pub(crate) week_start: Weekday,
    pub(crate) end: End,
    pub(crate) by_set_pos: Vec<i16>,
    pub(crate) by_month: Vec<u8>,
    pub(crate) by_month_day: Vec<i8>,
    pub(crate) by_year_day: Vec<i16>,
    pub(crate) by_week_no: Vec<i8>,
    pub(crate) by_day: Vec<WeekdayNum>,
    pub(crate) by_hour: Vec<u8>,
    pub(crate) by_minute: Vec<u8>,
    pub(crate) by_second: Vec<u8>,
    pub(crate) zone: Tz,
    pub(crate) joins: Vec<Combined>,
    pub(crate) excepts: Vec<Combined>,
}

/// A rule combined into another one, with an optional start of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combined {
    pub rule: Arc<RecurrenceRule>,
    pub start: Option<DateTime<Utc>>,
}

impl RecurrenceRule {
    #[must_use]
    pub fn new(freq: Frequency) -> Self {
        RecurrenceRule {
            freq,
            interval: 1,
            week_start: Weekday::Mon,
            end: End::Never,
            by_set_pos: vec![],
            by_month: vec![],
            by_month_day: vec![],
            by_year_day: vec![],
            by_week_no: vec![],
            by_day: vec![],
            by_hour: vec![],
            by_minute: vec![],
            by_second: vec![],
            zone: Tz::UTC,
            joins: vec![],
            excepts: vec![],
        }
    }

    #[must_use]
    pub fn secondly() -> Self {
        Self::new(Frequency::Secondly)
    }

    #[must_use]
    pub fn minutely() -> Self {
        Self::new(Frequency::Minutely)
    }

    #[must_use]
    pub fn hourly() -> Self {
        Self::new(Frequency::Hourly)
    }

    #[must_use]
    pub fn daily() -> Self {
        Self::new(Frequency::Daily)
    }

    #[must_use]
    pub fn weekly() -> Self {
        Self::new(Frequency::Weekly)
    }

    #[must_use]
    pub fn monthly() -> Self {
        Self::new(Frequency::Monthly)
    }

    #[must_use]
    pub fn yearly() -> Self {
        Self::new(Frequency::Yearly)
    }

    /// Repeat every `interval` periods.
    #[must_use]
    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    /// Stop after `count` occurrences. Clears any until bound.
    #[must_use]
    pub fn with_count(mut self, count: u32) -> Self {
        self.end = End::Count(count);
        self
    }

    /// Stop after the last occurrence at or before `until`. Clears any count.
    ///
    /// Fractions of a second are dropped, as the RRULE text form has no room
    /// for them.
    #[must_use]
    pub fn with_until<Z: TimeZone>(self, until: DateTime<Z>) -> Self {
        self.with_end(End::Until(until.with_timezone(&Utc)))
    }

    /// Replaces the boundary, `End::Never` makes the rule unbounded again.
    #[must_use]
    pub fn with_end(mut self, end: End) -> Self {
        self.end = match end {
            End::Until(until) => End::Until(until.trunc_subsecs(0)),
            end => end,
        };
        self
    }

    #[must_use]
    pub fn with_week_start(mut self, week_start: Weekday) -> Self {
        self.week_start = week_start;
        self
    }

    #[must_use]
    pub fn by_set_pos(mut self, positions: impl IntoIterator<Item = i16>) -> Self {
        self.by_set_pos = positions.into_iter().collect();
        self
    }

    #[must_use]
    pub fn by_month(mut self, months: impl IntoIterator<Item = u8>) -> Self {
        self.by_month = months.into_iter().collect();
        self
    }

    #[must_use]
    pub fn by_month_day(mut self, days: impl IntoIterator<Item = i8>) -> Self {
        self.by_month_day = days.into_iter().collect();
        self
    }

    #[must_use]
    pub fn by_year_day(mut self, days: impl IntoIterator<Item = i16>) -> Self {
        self.by_year_day = days.into_iter().collect();
        self
    }

    #[must_use]
    pub fn by_week_no(mut self, weeks: impl IntoIterator<Item = i8>) -> Self {
        self.by_week_no = weeks.into_iter().collect();
        self
    }

    /// Accepts plain `Weekday`s, `(ordinal, Weekday)` pairs or `WeekdayNum`s.
    #[must_use]
    pub fn by_week_day<W: Into<WeekdayNum>>(mut self, days: impl IntoIterator<Item = W>) -> Self {
        self.by_day = days.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn by_hour(mut self, hours: impl IntoIterator<Item = u8>) -> Self {
        self.by_hour = hours.into_iter().collect();
        self
    }

    #[must_use]
    pub fn by_minute(mut self, minutes: impl IntoIterator<Item = u8>) -> Self {
        self.by_minute = minutes.into_iter().collect();
        self
    }

    #[must_use]
    pub fn by_second(mut self, seconds: impl IntoIterator<Item = u8>) -> Self {
        self.by_second = seconds.into_iter().collect();
        self
    }

    /// Generate and present instants as wall-clock time in `zone`.
    #[must_use]
    pub fn in_zone(mut self, zone: Tz) -> Self {
        self.zone = zone;
        self
    }

    /// Adds the instants of `rule`, anchored at the same start as this rule.
    #[must_use]
    pub fn join(self, rule: RecurrenceRule) -> Self {
        self.join_combined(rule, None)
    }

    /// Adds the instants of `rule`, anchored at `start`.
    #[must_use]
    pub fn join_from<Z: TimeZone>(self, rule: RecurrenceRule, start: DateTime<Z>) -> Self {
        self.join_combined(rule, Some(start.with_timezone(&Utc)))
    }

    /// Removes the instants of `rule`, anchored at the same start as this rule.
    #[must_use]
    pub fn except(self, rule: RecurrenceRule) -> Self {
        self.except_combined(rule, None)
    }

    /// Removes the instants of `rule`, anchored at `start`.
    #[must_use]
    pub fn except_from<Z: TimeZone>(self, rule: RecurrenceRule, start: DateTime<Z>) -> Self {
        self.except_combined(rule, Some(start.with_timezone(&Utc)))
    }

    fn join_combined(mut self, rule: RecurrenceRule, start: Option<DateTime<Utc>>) -> Self {
        self.joins.insert(0, Combined { rule: Arc::new(rule), start });
        self
    }

    fn except_combined(mut self, rule: RecurrenceRule, start: Option<DateTime<Utc>>) -> Self {
        self.excepts.insert(0, Combined { rule: Arc::new(rule), start });
        self
    }

    /// Validates the rule and starts a lazy sequence of its instants at
    /// `start`.
    ///
    /// `start` plays the role of DTSTART: it anchors the periods and supplies
    /// every date/time field no BY* part overrides. Only instants at or after
    /// `start` are produced.
    ///
    /// # Errors
    ///
    /// Returns an error if this rule, or any joined or excepted rule, fails
    /// [`validate`](RecurrenceRule::validate).
    #[tracing::instrument(level = "debug", skip_all, fields(rule = %self, zone = self.zone.name()))]
    pub fn from<Z: TimeZone>(&self, start: &DateTime<Z>) -> Result<Occurrences> {
        self.validate()?;
        let start = start.with_timezone(&self.zone);
        tracing::debug!(start = %start, "Expanding recurrence rule");
        Ok(Occurrences::new(self, start))
    }

    /// Same as [`from`](RecurrenceRule::from), starting at the current instant.
    ///
    /// # Errors
    ///
    /// Returns an error if the rule is invalid.
    pub fn starting_now(&self) -> Result<Occurrences> {
        self.from(&Utc::now())
    }

    /// Checks value ranges and the RFC 5545 restrictions on which BY* parts a
    /// frequency accepts, for this rule and every joined or excepted rule.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(Error::ZeroInterval);
        }
        if let End::Count(0) = self.end {
            return Err(Error::ZeroCount);
        }

        check_range("BYMONTH", &self.by_month, 1..=12, false, "1..=12")?;
        check_range("BYMONTHDAY", &self.by_month_day, 1..=31, true, "1..=31 or -31..=-1")?;
        check_range("BYYEARDAY", &self.by_year_day, 1..=366, true, "1..=366 or -366..=-1")?;
        check_range("BYWEEKNO", &self.by_week_no, 1..=53, true, "1..=53 or -53..=-1")?;
        check_range("BYSETPOS", &self.by_set_pos, 1..=366, true, "1..=366 or -366..=-1")?;
        check_range("BYHOUR", &self.by_hour, 0..=23, false, "0..=23")?;
        check_range("BYMINUTE", &self.by_minute, 0..=59, false, "0..=59")?;
        check_range("BYSECOND", &self.by_second, 0..=59, false, "0..=59")?;

        if !self.by_week_no.is_empty() && self.freq != Frequency::Yearly {
            return Err(self.unsupported("BYWEEKNO"));
        }
        if !self.by_year_day.is_empty()
            && matches!(self.freq, Frequency::Daily | Frequency::Weekly | Frequency::Monthly)
        {
            return Err(self.unsupported("BYYEARDAY"));
        }
        if !self.by_month_day.is_empty() && self.freq == Frequency::Weekly {
            return Err(self.unsupported("BYMONTHDAY"));
        }

        for day in self.by_day.iter().filter(|day| day.is_numbered()) {
            let allowed = match self.freq {
                Frequency::Monthly => true,
                Frequency::Yearly => self.by_week_no.is_empty(),
                _ => false,
            };
            if !allowed {
                return Err(Error::NumberedWeekday(*day));
            }
            // Ordinals count within the month when BYMONTH narrows a yearly rule.
            let (limit, range) = if self.freq == Frequency::Yearly && self.by_month.is_empty() {
                (53, "1..=53 or -53..=-1")
            } else {
                (5, "1..=5 or -5..=-1")
            };
            if day.ordinal.unsigned_abs() > limit {
                return Err(Error::OutOfRange {
                    part: "BYDAY",
                    value: i32::from(day.ordinal),
                    range,
                });
            }
        }

        if !self.by_set_pos.is_empty() && !self.has_by_parts_besides_set_pos() {
            return Err(Error::LoneSetPos);
        }

        for combined in self.joins.iter().chain(&self.excepts) {
            combined.rule.validate()?;
        }

        Ok(())
    }

    fn unsupported(&self, part: &'static str) -> Error {
        Error::UnsupportedPart {
            part,
            freq: self.freq,
        }
    }

    fn has_by_parts_besides_set_pos(&self) -> bool {
        !(self.by_month.is_empty()
            && self.by_month_day.is_empty()
            && self.by_year_day.is_empty()
            && self.by_week_no.is_empty()
            && self.by_day.is_empty()
            && self.by_hour.is_empty()
            && self.by_minute.is_empty()
            && self.by_second.is_empty())
    }

    #[must_use]
    pub fn frequency(&self) -> Frequency {
        self.freq
    }

    #[must_use]
    pub fn interval(&self) -> u32 {
        self.interval
    }

    #[must_use]
    pub fn week_start(&self) -> Weekday {
        self.week_start
    }

    #[must_use]
    pub fn end(&self) -> End {
        self.end
    }

    #[must_use]
    pub fn count(&self) -> Option<u32> {
        match self.end {
            End::Count(count) => Some(count),
            _ => None,
        }
    }

    #[must_use]
    pub fn until(&self) -> Option<DateTime<Utc>> {
        match self.end {
            End::Until(until) => Some(until),
            _ => None,
        }
    }

    #[must_use]
    pub fn set_positions(&self) -> &[i16] {
        &self.by_set_pos
    }

    #[must_use]
    pub fn months(&self) -> &[u8] {
        &self.by_month
    }

    #[must_use]
    pub fn month_days(&self) -> &[i8] {
        &self.by_month_day
    }

    #[must_use]
    pub fn year_days(&self) -> &[i16] {
        &self.by_year_day
    }

    #[must_use]
    pub fn week_numbers(&self) -> &[i8] {
        &self.by_week_no
    }

    #[must_use]
    pub fn week_days(&self) -> &[WeekdayNum] {
        &self.by_day
    }

    #[must_use]
    pub fn hours(&self) -> &[u8] {
        &self.by_hour
    }

    #[must_use]
    pub fn minutes(&self) -> &[u8] {
        &self.by_minute
    }

    #[must_use]
    pub fn seconds(&self) -> &[u8] {
        &self.by_second
    }

    #[must_use]
    pub fn zone(&self) -> Tz {
        self.zone
    }

    #[must_use]
    pub fn joins(&self) -> &[Combined] {
        &self.joins
    }

    #[must_use]
    pub fn excepts(&self) -> &[Combined] {
        &self.excepts
    }
}

fn check_range<T>(
    part: &'static str,
    values: &[T],
    magnitude: std::ops::RangeInclusive<i32>,
    signed: bool,
    range: &'static str,
) -> Result<()>
where
    T: Copy + Into<i32>,
{
    for &value in values {
        let value: i32 = value.into();
        let ok = magnitude.contains(&value) || (signed && magnitude.contains(&-value));
        if !ok {
            return Err(Error::OutOfRange { part, value, range });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let rule = RecurrenceRule::daily();
        assert_eq!(rule.frequency(), Frequency::Daily);
        assert_eq!(rule.interval(), 1);
        assert_eq!(rule.week_start(), Weekday::Mon);
        assert_eq!(rule.end(), End::Never);
        assert_eq!(rule.zone(), Tz::UTC);
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn count_and_until_replace_each_other() {
        let until = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();

        let rule = RecurrenceRule::daily().with_until(until).with_count(3);
        assert_eq!(rule.count(), Some(3));
        assert_eq!(rule.until(), None);

        let rule = rule.with_until(until);
        assert_eq!(rule.count(), None);
        assert_eq!(rule.until(), Some(until));
    }

    #[test]
    fn until_keeps_whole_seconds() {
        let until = Utc.with_ymd_and_hms(2021, 7, 3, 9, 0, 0).unwrap();
        let with_millis = until + chrono::TimeDelta::milliseconds(500);

        assert_eq!(RecurrenceRule::daily().with_until(with_millis).until(), Some(until));
        assert_eq!(
            RecurrenceRule::daily().with_end(End::Until(with_millis)).end(),
            End::Until(until)
        );
    }

    #[test]
    fn branching_leaves_base_untouched() {
        let base = RecurrenceRule::weekly().by_week_day([Weekday::Mon]);
        let branched = base.clone().with_interval(2).by_hour([9]);

        assert_eq!(base.interval(), 1);
        assert!(base.hours().is_empty());
        assert_eq!(branched.interval(), 2);
        assert_eq!(branched.week_days(), base.week_days());
    }

    #[test]
    fn empty_list_clears_filter() {
        let rule = RecurrenceRule::monthly().by_month_day([1, 15]).by_month_day([]);
        assert!(rule.month_days().is_empty());
    }

    #[test]
    fn joins_and_excepts_are_prepended() {
        let rule = RecurrenceRule::daily()
            .join(RecurrenceRule::weekly())
            .join(RecurrenceRule::monthly())
            .except(RecurrenceRule::hourly())
            .except(RecurrenceRule::yearly());

        let joined: Vec<_> = rule.joins().iter().map(|c| c.rule.frequency()).collect();
        let excepted: Vec<_> = rule.excepts().iter().map(|c| c.rule.frequency()).collect();
        assert_eq!(joined, [Frequency::Monthly, Frequency::Weekly]);
        assert_eq!(excepted, [Frequency::Yearly, Frequency::Hourly]);
    }

    #[test]
    fn rejects_zero_interval_and_count() {
        assert_eq!(RecurrenceRule::daily().with_interval(0).validate(), Err(Error::ZeroInterval));
        assert_eq!(RecurrenceRule::daily().with_count(0).validate(), Err(Error::ZeroCount));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = RecurrenceRule::yearly().by_month([13]).validate().unwrap_err();
        assert!(matches!(err, Error::OutOfRange { part: "BYMONTH", value: 13, .. }));

        let err = RecurrenceRule::monthly().by_month_day([0]).validate().unwrap_err();
        assert!(matches!(err, Error::OutOfRange { part: "BYMONTHDAY", value: 0, .. }));

        let err = RecurrenceRule::daily().by_hour([24]).validate().unwrap_err();
        assert!(matches!(err, Error::OutOfRange { part: "BYHOUR", value: 24, .. }));

        assert!(RecurrenceRule::monthly().by_month_day([-31, 31]).validate().is_ok());
    }

    #[test]
    fn rejects_parts_not_allowed_for_frequency() {
        assert!(matches!(
            RecurrenceRule::monthly().by_week_no([1]).validate(),
            Err(Error::UnsupportedPart { part: "BYWEEKNO", .. })
        ));
        assert!(matches!(
            RecurrenceRule::daily().by_year_day([100]).validate(),
            Err(Error::UnsupportedPart { part: "BYYEARDAY", .. })
        ));
        assert!(matches!(
            RecurrenceRule::weekly().by_month_day([1]).validate(),
            Err(Error::UnsupportedPart { part: "BYMONTHDAY", .. })
        ));
    }

    #[test]
    fn numbered_weekdays() {
        assert!(RecurrenceRule::monthly().by_week_day([(-1, Weekday::Fri)]).validate().is_ok());
        assert!(RecurrenceRule::yearly().by_week_day([(20, Weekday::Mon)]).validate().is_ok());
        assert!(matches!(
            RecurrenceRule::weekly().by_week_day([(1, Weekday::Mon)]).validate(),
            Err(Error::NumberedWeekday(_))
        ));
        assert!(matches!(
            RecurrenceRule::monthly().by_week_day([(6, Weekday::Mon)]).validate(),
            Err(Error::OutOfRange { part: "BYDAY", value: 6, .. })
        ));
    }

    #[test]
    fn set_pos_needs_company() {
        assert_eq!(RecurrenceRule::monthly().by_set_pos([-1]).validate(), Err(Error::LoneSetPos));
        assert!(RecurrenceRule::monthly()
            .by_week_day([Weekday::Mon, Weekday::Fri])
            .by_set_pos([-1])
            .validate()
            .is_ok());
    }

    #[test]
    fn validates_combined_rules() {
        let rule = RecurrenceRule::daily().except(RecurrenceRule::daily().with_interval(0));
        assert_eq!(rule.validate(), Err(Error::ZeroInterval));
    }

    #[test]
    fn from_fails_eagerly_on_invalid_rule() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert!(RecurrenceRule::daily().by_minute([60]).from(&start).is_err());
    }
}
