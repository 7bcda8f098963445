use chrono::DateTime;
use chrono_tz::Tz;
use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    iter::{FusedIterator, Peekable},
    sync::Arc,
};

use crate::{rrule::Combined, tz_date_iterator::TzDateIterator, RecurrenceRule};

type Instants = Box<dyn Iterator<Item = DateTime<Tz>> + Send>;

/// The lazy, strictly increasing sequence of instants of a rule, including
/// everything it joins and nothing it excepts.
///
/// Created by [`RecurrenceRule::from`]. Instants are expressed in the rule's
/// zone. The sequence is single pass; call `from` again to restart it.
pub struct Occurrences {
    zone: Tz,
    start: DateTime<Tz>,
    /// Sources not pulled yet; they enter the heap on the first `next`.
    unprimed: Vec<Instants>,
    sources: BinaryHeap<Reverse<IterHolder<Instants>>>,
    excepts: Vec<Peekable<Occurrences>>,
    last: Option<DateTime<Tz>>,
}

impl Occurrences {
    pub(crate) fn new(rule: &RecurrenceRule, start: DateTime<Tz>) -> Self {
        let primary: Instants = Box::new(TzDateIterator::new(
            Arc::new(rule.clone()),
            start.clone(),
        ));
        let joined = rule
            .joins
            .iter()
            .map(|combined| Box::new(Self::combined(combined, &start)) as Instants);

        let unprimed = std::iter::once(primary).chain(joined).collect();

        let excepts = rule
            .excepts
            .iter()
            .map(|combined| Self::combined(combined, &start).peekable())
            .collect();

        Occurrences {
            zone: rule.zone,
            start,
            unprimed,
            sources: BinaryHeap::new(),
            excepts,
            last: None,
        }
    }

    /// A joined or excepted rule starts at its own start when it has one,
    /// otherwise at the primary start.
    fn combined(combined: &Combined, start: &DateTime<Tz>) -> Occurrences {
        let zone = combined.rule.zone;
        let start = combined
            .start
            .map_or_else(|| start.with_timezone(&zone), |own| own.with_timezone(&zone));
        Occurrences::new(&combined.rule, start)
    }

    fn prime(&mut self) {
        let primed = self.unprimed.drain(..).filter_map(|mut iter| {
            iter.next()
                .map(|cursor| Reverse(IterHolder { iter, cursor }))
        });
        self.sources.extend(primed);
    }

    fn is_excluded(&mut self, instant: &DateTime<Tz>) -> bool {
        self.excepts.iter_mut().any(|except| {
            while except.next_if(|excluded| excluded < instant).is_some() {}
            except.peek() == Some(instant)
        })
    }

    #[must_use]
    pub fn zone(&self) -> Tz {
        self.zone
    }

    #[must_use]
    pub fn start(&self) -> &DateTime<Tz> {
        &self.start
    }
}

impl Iterator for Occurrences {
    type Item = DateTime<Tz>;

    fn next(&mut self) -> Option<DateTime<Tz>> {
        if !self.unprimed.is_empty() {
            self.prime();
        }

        while let Some(Reverse(IterHolder { cursor, mut iter })) = self.sources.pop() {
            if let Some(next) = iter.next() {
                self.sources.push(Reverse(IterHolder { cursor: next, iter }));
            }

            let cursor = cursor.with_timezone(&self.zone);
            // Joined rules may start earlier than this one and sources may
            // agree on an instant; both are dropped.
            if cursor < self.start || self.last.as_ref().is_some_and(|last| cursor <= *last) {
                continue;
            }
            self.last = Some(cursor);

            if self.is_excluded(&cursor) {
                tracing::trace!(%cursor, "Instant removed by an excepted rule");
                continue;
            }

            return Some(cursor);
        }

        None
    }
}

impl FusedIterator for Occurrences {}

/// Holds an iterator and the latest date that came out of it.
struct IterHolder<I: Iterator<Item = DateTime<Tz>>> {
    cursor: DateTime<Tz>,
    iter: I,
}

impl<I: Iterator<Item = DateTime<Tz>>> Eq for IterHolder<I> {}

impl<I: Iterator<Item = DateTime<Tz>>> PartialEq for IterHolder<I> {
    fn eq(&self, other: &Self) -> bool {
        self.cursor.eq(&other.cursor)
    }
}

impl<I: Iterator<Item = DateTime<Tz>>> PartialOrd for IterHolder<I> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<I: Iterator<Item = DateTime<Tz>>> Ord for IterHolder<I> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.cursor.cmp(&other.cursor)
    }
}
