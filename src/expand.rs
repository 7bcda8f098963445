//! Per-period candidate expansion.
//!
//! For each period anchor the rule's BY* parts either *expand* the candidate
//! set (replace every candidate by several derived ones) or *limit* it (drop
//! candidates that don't match), following the table in RFC 5545 §3.3.10.
//! Everything here works on civil datetimes; projecting into a time zone
//! happens afterwards.

use chrono::{Datelike as _, Days, NaiveDate, NaiveDateTime, Timelike as _, Weekday};

use crate::{weekday::days_from_week_start, Frequency, RecurrenceRule};

/// Expands one period of a rule.
pub(crate) struct Expander<'a> {
    pub rule: &'a RecurrenceRule,
    /// The civil start of the whole sequence.
    pub start: NaiveDateTime,
    /// The anchor of the period being expanded.
    pub cur: NaiveDateTime,
}

impl Expander<'_> {
    /// Returns the candidates of this period, sorted and deduplicated.
    pub fn expand(&self) -> Vec<NaiveDateTime> {
        let mut set = CivilSet::default();
        match self.rule.freq {
            Frequency::Yearly => self.yearly(&mut set),
            Frequency::Monthly => self.monthly(&mut set),
            Frequency::Weekly => self.weekly(&mut set),
            Frequency::Daily => self.daily(&mut set),
            Frequency::Hourly | Frequency::Minutely | Frequency::Secondly => {
                self.sub_daily(&mut set)
            }
        }
        set.canonicalize();
        set.0
    }

    fn yearly(&self, set: &mut CivilSet) {
        set.insert(self.cur);
        if self.has_by_week_day() {
            if self.has_by_week_no() {
                self.expand_by_week_no(set);
                set.retain(|dt| self.satisfies_by_week_day(dt));
                self.limit_by_month(set);
            } else if self.has_by_month() {
                self.expand_by_month(set, 1);
                self.expand_by_week_day_monthly(set);
            } else {
                self.expand_by_week_day_yearly(set);
            }
            self.limit_by_year_day(set);
            self.limit_by_month_day(set);
        } else if self.has_by_week_no() {
            self.expand_by_week_no(set);
            self.limit_by_month(set);
            self.limit_by_year_day(set);
            self.limit_by_month_day(set);
        } else if self.has_by_month_day() {
            if self.has_by_month() {
                self.expand_by_month(set, 1);
            } else {
                set.expand(|dt| {
                    (1..=12).filter_map(move |month| {
                        NaiveDate::from_ymd_opt(dt.year(), month, 1).map(|d| d.and_time(dt.time()))
                    })
                });
            }
            self.expand_by_month_day(set);
            self.limit_by_year_day(set);
        } else if self.has_by_year_day() {
            self.expand_by_year_day(set);
            self.limit_by_month(set);
        } else if self.has_by_month() {
            self.expand_by_month(set, self.start.day());
        }
        self.expand_times(set);
    }

    fn monthly(&self, set: &mut CivilSet) {
        if !self.satisfies_by_month(&self.cur) {
            return;
        }
        set.insert(self.cur);
        if self.has_by_week_day() {
            self.expand_by_week_day_monthly(set);
            self.limit_by_month_day(set);
        } else {
            self.expand_by_month_day(set);
        }
        self.expand_times(set);
    }

    fn weekly(&self, set: &mut CivilSet) {
        set.insert(self.cur);
        self.expand_by_week_day_weekly(set);
        self.limit_by_month(set);
        self.expand_times(set);
    }

    fn daily(&self, set: &mut CivilSet) {
        let cur = &self.cur;
        if self.satisfies_by_month(cur)
            && self.satisfies_by_month_day(cur)
            && self.satisfies_by_week_day(cur)
        {
            set.insert(self.cur);
            self.expand_times(set);
        }
    }

    /// HOURLY, MINUTELY and SECONDLY: every BY* part coarser than or equal to
    /// the frequency limits, finer ones expand.
    fn sub_daily(&self, set: &mut CivilSet) {
        let cur = &self.cur;
        let date_ok = self.satisfies_by_month(cur)
            && self.satisfies_by_year_day(cur)
            && self.satisfies_by_month_day(cur)
            && self.satisfies_by_week_day(cur)
            && self.satisfies_by_hour(cur);
        if !date_ok {
            return;
        }
        match self.rule.freq {
            Frequency::Hourly => {
                set.insert(self.cur);
                self.expand_by_minute(set);
                self.expand_by_second(set);
            }
            Frequency::Minutely => {
                if self.satisfies_by_minute(cur) {
                    set.insert(self.cur);
                    self.expand_by_second(set);
                }
            }
            _ => {
                if self.satisfies_by_minute(cur) && self.satisfies_by_second(cur) {
                    set.insert(self.cur);
                }
            }
        }
    }

    /// For DAILY and finer rules whose BY* date parts reject the anchor's
    /// date, the first later date that could pass: the next month when
    /// BYMONTH fails, otherwise the next day. `None` when the date passes.
    pub fn next_viable_date(&self) -> Option<NaiveDate> {
        let cur = &self.cur;
        if !self.satisfies_by_month(cur) {
            let (year, month) = if cur.month() == 12 {
                (cur.year() + 1, 1)
            } else {
                (cur.year(), cur.month() + 1)
            };
            return NaiveDate::from_ymd_opt(year, month, 1);
        }
        let date_ok = self.satisfies_by_year_day(cur)
            && self.satisfies_by_month_day(cur)
            && self.satisfies_by_week_day(cur);
        if date_ok {
            None
        } else {
            cur.date().succ_opt()
        }
    }

    fn expand_times(&self, set: &mut CivilSet) {
        self.expand_by_hour(set);
        self.expand_by_minute(set);
        self.expand_by_second(set);
    }

    fn has_by_month(&self) -> bool {
        !self.rule.by_month.is_empty()
    }

    fn has_by_week_no(&self) -> bool {
        !self.rule.by_week_no.is_empty()
    }

    fn has_by_year_day(&self) -> bool {
        !self.rule.by_year_day.is_empty()
    }

    fn has_by_month_day(&self) -> bool {
        !self.rule.by_month_day.is_empty()
    }

    fn has_by_week_day(&self) -> bool {
        !self.rule.by_day.is_empty()
    }

    fn satisfies_by_month(&self, dt: &NaiveDateTime) -> bool {
        !self.has_by_month() || self.rule.by_month.iter().any(|&m| u32::from(m) == dt.month())
    }

    fn satisfies_by_year_day(&self, dt: &NaiveDateTime) -> bool {
        if !self.has_by_year_day() {
            return true;
        }
        let positive = dt.ordinal();
        let len = days_in_year(dt.year());
        self.rule
            .by_year_day
            .iter()
            .any(|&day| resolve_signed(i32::from(day), len) == Some(positive))
    }

    fn satisfies_by_month_day(&self, dt: &NaiveDateTime) -> bool {
        if !self.has_by_month_day() {
            return true;
        }
        let len = days_in_month(dt.year(), dt.month());
        self.rule
            .by_month_day
            .iter()
            .any(|&day| resolve_signed(i32::from(day), len) == Some(dt.day()))
    }

    /// Plain weekday match, used where BYDAY cannot carry ordinals.
    fn satisfies_by_week_day(&self, dt: &NaiveDateTime) -> bool {
        !self.has_by_week_day() || self.rule.by_day.iter().any(|d| d.weekday == dt.weekday())
    }

    fn satisfies_by_week_no(&self, date: NaiveDate) -> bool {
        let Some((week, weeks_in_year)) = week_number(date, self.rule.week_start) else {
            return false;
        };
        self.rule
            .by_week_no
            .iter()
            .any(|&w| resolve_signed(i32::from(w), weeks_in_year) == Some(week))
    }

    fn satisfies_by_hour(&self, dt: &NaiveDateTime) -> bool {
        self.rule.by_hour.is_empty() || self.rule.by_hour.iter().any(|&h| u32::from(h) == dt.hour())
    }

    fn satisfies_by_minute(&self, dt: &NaiveDateTime) -> bool {
        self.rule.by_minute.is_empty()
            || self.rule.by_minute.iter().any(|&m| u32::from(m) == dt.minute())
    }

    fn satisfies_by_second(&self, dt: &NaiveDateTime) -> bool {
        self.rule.by_second.is_empty()
            || self.rule.by_second.iter().any(|&s| u32::from(s) == dt.second())
    }

    fn limit_by_month(&self, set: &mut CivilSet) {
        if self.has_by_month() {
            set.retain(|dt| self.satisfies_by_month(dt));
        }
    }

    fn limit_by_year_day(&self, set: &mut CivilSet) {
        if self.has_by_year_day() {
            set.retain(|dt| self.satisfies_by_year_day(dt));
        }
    }

    fn limit_by_month_day(&self, set: &mut CivilSet) {
        if self.has_by_month_day() {
            set.retain(|dt| self.satisfies_by_month_day(dt));
        }
    }

    /// Replaces each candidate by the same time on `day` of every BYMONTH
    /// month. Months where `day` doesn't exist are dropped.
    fn expand_by_month(&self, set: &mut CivilSet, day: u32) {
        if !self.has_by_month() {
            return;
        }
        set.expand(|dt| {
            self.rule.by_month.iter().filter_map(move |&month| {
                NaiveDate::from_ymd_opt(dt.year(), u32::from(month), day)
                    .map(|d| d.and_time(dt.time()))
            })
        });
    }

    /// Replaces each candidate by every day of its year whose week number is
    /// listed in BYWEEKNO.
    fn expand_by_week_no(&self, set: &mut CivilSet) {
        set.expand(|dt| {
            let first = NaiveDate::from_ymd_opt(dt.year(), 1, 1);
            first
                .into_iter()
                .flat_map(|first| first.iter_days())
                .take_while(move |date| date.year() == dt.year())
                .filter(move |date| self.satisfies_by_week_no(*date))
                .map(move |date| date.and_time(dt.time()))
        });
    }

    fn expand_by_year_day(&self, set: &mut CivilSet) {
        set.expand(|dt| {
            let len = days_in_year(dt.year());
            self.rule.by_year_day.iter().filter_map(move |&day| {
                let ordinal = resolve_signed(i32::from(day), len)?;
                NaiveDate::from_yo_opt(dt.year(), ordinal).map(|d| d.and_time(dt.time()))
            })
        });
    }

    fn expand_by_month_day(&self, set: &mut CivilSet) {
        if !self.has_by_month_day() {
            return;
        }
        set.expand(|dt| {
            let len = days_in_month(dt.year(), dt.month());
            self.rule.by_month_day.iter().filter_map(move |&day| {
                let day = resolve_signed(i32::from(day), len)?;
                dt.with_day(day)
            })
        });
    }

    fn expand_by_week_day_yearly(&self, set: &mut CivilSet) {
        set.expand(|dt| {
            let bounds = NaiveDate::from_ymd_opt(dt.year(), 1, 1)
                .zip(NaiveDate::from_ymd_opt(dt.year(), 12, 31));
            self.week_days_between(dt, bounds)
        });
    }

    fn expand_by_week_day_monthly(&self, set: &mut CivilSet) {
        set.expand(|dt| {
            let last_day = days_in_month(dt.year(), dt.month());
            let bounds = NaiveDate::from_ymd_opt(dt.year(), dt.month(), 1)
                .zip(NaiveDate::from_ymd_opt(dt.year(), dt.month(), last_day));
            self.week_days_between(dt, bounds)
        });
    }

    fn expand_by_week_day_weekly(&self, set: &mut CivilSet) {
        if !self.has_by_week_day() {
            return;
        }
        let week_start = self.rule.week_start;
        set.expand(|dt| {
            let date = dt.date();
            let into_week = days_from_week_start(week_start, date.weekday());
            let first = date.checked_sub_days(Days::new(into_week.into()));
            let bounds =
                first.and_then(|first| Some((first, first.checked_add_days(Days::new(6))?)));
            self.week_days_between(dt, bounds)
        });
    }

    fn week_days_between(
        &self,
        dt: NaiveDateTime,
        bounds: Option<(NaiveDate, NaiveDate)>,
    ) -> Vec<NaiveDateTime> {
        let Some((first, last)) = bounds else {
            return vec![];
        };
        self.rule
            .by_day
            .iter()
            .flat_map(|day| day.dates_between(first, last))
            .map(|date| date.and_time(dt.time()))
            .collect()
    }

    fn expand_by_hour(&self, set: &mut CivilSet) {
        if self.rule.by_hour.is_empty() {
            return;
        }
        set.expand(|dt| self.rule.by_hour.iter().filter_map(move |&h| dt.with_hour(h.into())));
    }

    fn expand_by_minute(&self, set: &mut CivilSet) {
        if self.rule.by_minute.is_empty() {
            return;
        }
        set.expand(|dt| self.rule.by_minute.iter().filter_map(move |&m| dt.with_minute(m.into())));
    }

    fn expand_by_second(&self, set: &mut CivilSet) {
        if self.rule.by_second.is_empty() {
            return;
        }
        set.expand(|dt| self.rule.by_second.iter().filter_map(move |&s| dt.with_second(s.into())));
    }
}

/// Scratch set of civil candidates for one period.
#[derive(Default)]
struct CivilSet(Vec<NaiveDateTime>);

impl CivilSet {
    fn insert(&mut self, dt: NaiveDateTime) {
        self.0.push(dt);
    }

    fn retain(&mut self, mut keep: impl FnMut(&NaiveDateTime) -> bool) {
        self.0.retain(|dt| keep(dt));
    }

    /// Replaces every candidate with its expansion.
    fn expand<E, I>(&mut self, expand: E)
    where
        E: Fn(NaiveDateTime) -> I,
        I: IntoIterator<Item = NaiveDateTime>,
    {
        let len = self.0.len();
        for i in 0..len {
            let expanded = expand(self.0[i]);
            self.0.extend(expanded);
        }
        self.0.drain(..len);
    }

    fn canonicalize(&mut self) {
        self.0.sort_unstable();
        self.0.dedup();
    }
}

/// Maps a 1-based index that may count from the end (`-1` is the last of
/// `len` items) to its positive form. `None` when it falls outside `1..=len`.
pub(crate) fn resolve_signed(index: i32, len: u32) -> Option<u32> {
    let len = i32::try_from(len).ok()?;
    let positive = if index < 0 { len + index + 1 } else { index };
    if (1..=len).contains(&positive) {
        u32::try_from(positive).ok()
    } else {
        None
    }
}

pub(crate) fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map_or(28, |last| last.day())
}

pub(crate) fn days_in_year(year: i32) -> u32 {
    if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
        366
    } else {
        365
    }
}

/// First day of week 1 of `year`: the first week, starting on `week_start`,
/// with at least four days in the year.
fn week_one_start(year: i32, week_start: Weekday) -> Option<NaiveDate> {
    let jan_1 = NaiveDate::from_ymd_opt(year, 1, 1)?;
    let into_week = days_from_week_start(week_start, jan_1.weekday());
    if into_week <= 3 {
        jan_1.checked_sub_days(Days::new(into_week.into()))
    } else {
        jan_1.checked_add_days(Days::new((7 - into_week).into()))
    }
}

/// Week number of `date` and the number of weeks in its week-numbering year.
pub(crate) fn week_number(date: NaiveDate, week_start: Weekday) -> Option<(u32, u32)> {
    let year = date.year();
    let this_year = week_one_start(year, week_start)?;
    let next_year = week_one_start(year + 1, week_start)?;
    let (first, following) = if date < this_year {
        (week_one_start(year - 1, week_start)?, this_year)
    } else if date >= next_year {
        (next_year, week_one_start(year + 2, week_start)?)
    } else {
        (this_year, next_year)
    };
    let week = date.signed_duration_since(first).num_days() / 7 + 1;
    let weeks = following.signed_duration_since(first).num_days() / 7;
    Some((u32::try_from(week).ok()?, u32::try_from(weeks).ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    fn expand(rule: &RecurrenceRule, start: NaiveDateTime) -> Vec<NaiveDateTime> {
        Expander {
            rule,
            start,
            cur: start,
        }
        .expand()
    }

    #[test]
    fn resolves_negative_indexes() {
        assert_eq!(resolve_signed(-1, 31), Some(31));
        assert_eq!(resolve_signed(-31, 31), Some(1));
        assert_eq!(resolve_signed(-31, 30), None);
        assert_eq!(resolve_signed(31, 30), None);
        assert_eq!(resolve_signed(5, 30), Some(5));
    }

    #[test]
    fn calendar_lengths() {
        assert_eq!(days_in_month(2020, 2), 29);
        assert_eq!(days_in_month(2021, 2), 28);
        assert_eq!(days_in_month(2021, 12), 31);
        assert_eq!(days_in_year(2020), 366);
        assert_eq!(days_in_year(1900), 365);
    }

    #[test]
    fn iso_week_numbers() {
        // 2021-01-01 is a Friday, so it belongs to week 53 of 2020.
        assert_eq!(week_number(date(2021, 1, 1), Weekday::Mon), Some((53, 53)));
        assert_eq!(week_number(date(2021, 1, 4), Weekday::Mon), Some((1, 52)));
        // 2019-12-30 is a Monday in week 1 of 2020.
        assert_eq!(week_number(date(2019, 12, 30), Weekday::Mon), Some((1, 53)));
    }

    #[test]
    fn week_numbers_follow_week_start() {
        // With weeks starting on Sunday, 2021-01-03 opens week 1.
        assert_eq!(week_number(date(2021, 1, 3), Weekday::Sun), Some((1, 52)));
        assert_eq!(week_number(date(2021, 1, 2), Weekday::Sun), Some((53, 53)));
    }

    #[test]
    fn yearly_by_month_keeps_start_day() {
        let rule = RecurrenceRule::yearly().by_month([2, 6]);
        assert_eq!(
            expand(&rule, datetime(2021, 1, 30, 8, 0, 0)),
            vec![datetime(2021, 6, 30, 8, 0, 0)]
        );
    }

    #[test]
    fn yearly_by_month_day_covers_every_month() {
        let rule = RecurrenceRule::yearly().by_month_day([31]);
        let months: Vec<_> = expand(&rule, datetime(2021, 1, 1, 0, 0, 0))
            .iter()
            .map(|dt| dt.month())
            .collect();
        assert_eq!(months, vec![1, 3, 5, 7, 8, 10, 12]);
    }

    #[test]
    fn yearly_by_week_no_and_day() {
        let rule = RecurrenceRule::yearly().by_week_no([20]).by_week_day([Weekday::Mon]);
        assert_eq!(
            expand(&rule, datetime(1997, 1, 1, 9, 0, 0)),
            vec![datetime(1997, 5, 12, 9, 0, 0)]
        );
    }

    #[test]
    fn yearly_by_year_day() {
        let rule = RecurrenceRule::yearly().by_year_day([1, 100, -1]);
        assert_eq!(
            expand(&rule, datetime(2020, 1, 1, 0, 0, 0)),
            vec![
                datetime(2020, 1, 1, 0, 0, 0),
                datetime(2020, 4, 9, 0, 0, 0),
                datetime(2020, 12, 31, 0, 0, 0),
            ]
        );
    }

    #[test]
    fn yearly_numbered_weekday_in_month() {
        // Thanksgiving: fourth Thursday of November.
        let rule = RecurrenceRule::yearly().by_month([11]).by_week_day([(4, Weekday::Thu)]);
        assert_eq!(
            expand(&rule, datetime(2021, 1, 1, 12, 0, 0)),
            vec![datetime(2021, 11, 25, 12, 0, 0)]
        );
    }

    #[test]
    fn monthly_weekday_and_month_day() {
        // Friday the 13th.
        let rule = RecurrenceRule::monthly().by_week_day([Weekday::Fri]).by_month_day([13]);
        assert_eq!(
            expand(&rule, datetime(2021, 8, 1, 0, 0, 0)),
            vec![datetime(2021, 8, 13, 0, 0, 0)]
        );
        assert!(expand(&rule, datetime(2021, 9, 1, 0, 0, 0)).is_empty());
    }

    #[test]
    fn monthly_respects_by_month() {
        let rule = RecurrenceRule::monthly().by_month([3]);
        assert!(expand(&rule, datetime(2021, 2, 1, 0, 0, 0)).is_empty());
        assert_eq!(expand(&rule, datetime(2021, 3, 1, 0, 0, 0)).len(), 1);
    }

    #[test]
    fn weekly_expands_within_week_start() {
        let start = datetime(2021, 7, 7, 10, 0, 0); // Wednesday
        let rule = RecurrenceRule::weekly().by_week_day([Weekday::Mon, Weekday::Sun]);
        assert_eq!(
            expand(&rule, start),
            vec![datetime(2021, 7, 5, 10, 0, 0), datetime(2021, 7, 11, 10, 0, 0)]
        );

        let rule = rule.with_week_start(Weekday::Sun);
        assert_eq!(
            expand(&rule, start),
            vec![datetime(2021, 7, 4, 10, 0, 0), datetime(2021, 7, 5, 10, 0, 0)]
        );
    }

    #[test]
    fn daily_expands_times() {
        let rule = RecurrenceRule::daily().by_hour([17, 9]).by_minute([0, 30]);
        assert_eq!(
            expand(&rule, datetime(2021, 7, 1, 0, 0, 0)),
            vec![
                datetime(2021, 7, 1, 9, 0, 0),
                datetime(2021, 7, 1, 9, 30, 0),
                datetime(2021, 7, 1, 17, 0, 0),
                datetime(2021, 7, 1, 17, 30, 0),
            ]
        );
    }

    #[test]
    fn daily_limits_by_week_day() {
        let rule = RecurrenceRule::daily().by_week_day([Weekday::Sat]);
        assert!(expand(&rule, datetime(2021, 7, 1, 0, 0, 0)).is_empty());
        assert_eq!(expand(&rule, datetime(2021, 7, 3, 0, 0, 0)).len(), 1);
    }

    #[test]
    fn hourly_limits_by_hour_and_expands_minutes() {
        let rule = RecurrenceRule::hourly().by_hour([9]).by_minute([15, 45]);
        assert!(expand(&rule, datetime(2021, 7, 1, 8, 0, 0)).is_empty());
        assert_eq!(
            expand(&rule, datetime(2021, 7, 1, 9, 0, 0)),
            vec![datetime(2021, 7, 1, 9, 15, 0), datetime(2021, 7, 1, 9, 45, 0)]
        );
    }

    #[test]
    fn next_viable_date_skips_rejected_months_and_days() {
        let viable = |rule: &RecurrenceRule, cur: NaiveDateTime| {
            Expander {
                rule,
                start: cur,
                cur,
            }
            .next_viable_date()
        };

        let rule = RecurrenceRule::hourly().by_month([2]).by_month_day([30]);
        assert_eq!(viable(&rule, datetime(2021, 1, 17, 5, 0, 0)), Some(date(2021, 2, 1)));
        assert_eq!(viable(&rule, datetime(2021, 12, 3, 5, 0, 0)), Some(date(2022, 1, 1)));
        assert_eq!(viable(&rule, datetime(2021, 2, 3, 5, 0, 0)), Some(date(2021, 2, 4)));

        let rule = RecurrenceRule::minutely().by_week_day([Weekday::Thu]);
        assert_eq!(viable(&rule, datetime(2021, 7, 1, 5, 0, 0)), None);
    }
}
