use chrono::{
    DateTime, Datelike as _, Days, NaiveDateTime, NaiveTime, Timelike as _, Utc,
};
use chrono_tz::Tz;
use std::{collections::VecDeque, sync::Arc};

use crate::{
    expand::{resolve_signed, Expander},
    weekday::days_from_week_start,
    zone::project,
    End, Frequency, RecurrenceRule,
};

/// Periods anchored past this year end the sequence, so rules that can never
/// match (e.g. February 30th) still terminate.
const MAX_YEAR: i32 = 9999;

/// Timezone aware iterator over the instants of a single rule.
///
/// Joins and excepts of the rule are ignored here; see [`crate::Occurrences`].
pub struct TzDateIterator {
    rule: Arc<RecurrenceRule>,
    start: DateTime<Tz>,
    civil_start: NaiveDateTime,
    end: End,
    /// Civil time after which no period can hold an instant before `until`.
    cutoff: Option<NaiveDateTime>,
    /// Index of the next period to expand, `None` once exhausted.
    period: Option<i64>,
    pending: VecDeque<DateTime<Tz>>,
    last: Option<DateTime<Tz>>,
}

impl TzDateIterator {
    pub(crate) fn new(rule: Arc<RecurrenceRule>, start: DateTime<Tz>) -> Self {
        let civil_start = start.naive_local();
        let cutoff = match rule.end {
            End::Until(until) => until
                .with_timezone(&rule.zone)
                .naive_local()
                .checked_add_days(Days::new(1)),
            _ => None,
        };

        TzDateIterator {
            end: rule.end,
            rule,
            start,
            civil_start,
            cutoff,
            period: Some(0),
            pending: VecDeque::new(),
            last: None,
        }
    }

    fn finish(&mut self) {
        self.period = None;
        self.pending.clear();
    }

    /// Expands the next period into `pending`, possibly adding nothing.
    fn expand_next(&mut self) {
        let Some(index) = self.period else { return };
        let rule = Arc::clone(&self.rule);

        let anchor = index
            .checked_mul(i64::from(rule.interval))
            .and_then(|periods| rule.freq.advance(self.civil_start, periods));
        let Some(anchor) = anchor else {
            tracing::debug!(period = index, "Period arithmetic overflowed, ending sequence");
            return self.finish();
        };
        self.period = index.checked_add(1);

        if anchor.year() > MAX_YEAR {
            tracing::debug!(
                year = anchor.year(),
                "Passed the last supported year, ending sequence"
            );
            return self.finish();
        }
        if let Some(cutoff) = self.cutoff {
            if period_start(&rule, anchor) > cutoff {
                tracing::debug!(period = index, "Period starts after UNTIL, ending sequence");
                return self.finish();
            }
        }
        if self.is_clamped(anchor) {
            tracing::trace!(period = index, %anchor, "Skipping period with a clamped day");
            return;
        }

        let expander = Expander {
            rule: &rule,
            start: self.civil_start,
            cur: anchor,
        };
        if is_day_or_finer(rule.freq) {
            if let Some(date) = expander.next_viable_date() {
                self.skip_to(date.and_time(NaiveTime::MIN));
                return;
            }
        }
        let civil = expander.expand();

        let mut zoned: Vec<_> = civil
            .into_iter()
            .filter_map(|dt| project(rule.zone, dt))
            .collect();
        zoned.sort();
        zoned.dedup();

        // Positions count candidates before the start too; those are only
        // dropped when popped.
        if !rule.by_set_pos.is_empty() {
            let len = u32::try_from(zoned.len()).unwrap_or(u32::MAX);
            let mut position = 0;
            zoned.retain(|_| {
                position += 1;
                rule.by_set_pos
                    .iter()
                    .any(|&pos| resolve_signed(i32::from(pos), len) == Some(position))
            });
        }

        tracing::trace!(period = index, %anchor, candidates = zoned.len(), "Expanded period");
        self.pending.extend(zoned);
    }

    /// Moves the period cursor to the first period anchored at or after
    /// `target`. Every period in between lies on a rejected date.
    fn skip_to(&mut self, target: NaiveDateTime) {
        let Some(next) = self.period else { return };
        let step = self
            .rule
            .freq
            .fixed_seconds()
            .and_then(|unit| unit.checked_mul(i64::from(self.rule.interval)))
            .filter(|&step| step > 0);
        let ahead = (target - self.civil_start).num_seconds();
        let Some(periods) = step.and_then(|step| ahead.checked_add(step - 1).map(|a| a / step))
        else {
            return;
        };
        if periods > next {
            tracing::trace!(
                from = next,
                to = periods,
                %target,
                "Skipping periods on rejected dates"
            );
            self.period = Some(periods);
        }
    }

    /// Adding months or years to a start on the 29th-31st clamps the day to
    /// the end of shorter months. Such anchors are not real occurrences
    /// unless a BY* part picks the day anyway.
    fn is_clamped(&self, anchor: NaiveDateTime) -> bool {
        if anchor.day() == self.civil_start.day() {
            return false;
        }
        let r = &self.rule;
        match r.freq {
            Frequency::Yearly => {
                r.by_month.is_empty()
                    && r.by_week_no.is_empty()
                    && r.by_year_day.is_empty()
                    && r.by_month_day.is_empty()
                    && r.by_day.is_empty()
            }
            Frequency::Monthly => r.by_day.is_empty() && r.by_month_day.is_empty(),
            _ => false,
        }
    }
}

/// Periods that never span more than one date.
fn is_day_or_finer(freq: Frequency) -> bool {
    matches!(
        freq,
        Frequency::Daily | Frequency::Hourly | Frequency::Minutely | Frequency::Secondly
    )
}

/// Earliest civil time any candidate of the period anchored at `anchor` can
/// have.
fn period_start(rule: &RecurrenceRule, anchor: NaiveDateTime) -> NaiveDateTime {
    let date = anchor.date();
    let midnight = |date: chrono::NaiveDate| date.and_time(NaiveTime::MIN);
    match rule.freq {
        Frequency::Yearly => date.with_ordinal(1).map_or(anchor, midnight),
        Frequency::Monthly => date.with_day(1).map_or(anchor, midnight),
        Frequency::Weekly => {
            let into_week = days_from_week_start(rule.week_start, date.weekday());
            date.checked_sub_days(Days::new(into_week.into()))
                .map_or(anchor, midnight)
        }
        Frequency::Daily => midnight(date),
        Frequency::Hourly => anchor
            .with_minute(0)
            .and_then(|dt| dt.with_second(0))
            .and_then(|dt| dt.with_nanosecond(0))
            .unwrap_or(anchor),
        Frequency::Minutely => anchor
            .with_second(0)
            .and_then(|dt| dt.with_nanosecond(0))
            .unwrap_or(anchor),
        Frequency::Secondly => anchor,
    }
}

impl Iterator for TzDateIterator {
    type Item = DateTime<Tz>;

    fn next(&mut self) -> Option<DateTime<Tz>> {
        loop {
            if let End::Count(0) = self.end {
                tracing::debug!("COUNT reached, ending sequence");
                self.finish();
                return None;
            }

            let Some(next) = self.pending.pop_front() else {
                self.period?;
                self.expand_next();
                continue;
            };

            if next < self.start || self.last.as_ref().is_some_and(|last| next <= *last) {
                continue;
            }

            match self.end {
                End::Until(until) if next.with_timezone(&Utc) > until => {
                    tracing::debug!(%until, "UNTIL reached, ending sequence");
                    self.finish();
                    return None;
                }
                End::Count(ref mut count) => *count -= 1,
                _ => {}
            }

            self.last = Some(next);
            return Some(next);
        }
    }
}

impl std::iter::FusedIterator for TzDateIterator {}
