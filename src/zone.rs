//! Projection of civil candidates into the rule's time zone.

use chrono::{DateTime, NaiveDateTime, TimeZone as _};
use chrono_tz::Tz;

const UTC_ALIASES: &[&str] = &[
    "UTC",
    "UCT",
    "GMT",
    "GMT0",
    "GMT+0",
    "GMT-0",
    "Greenwich",
    "Universal",
    "Zulu",
    "Etc/UTC",
    "Etc/UCT",
    "Etc/GMT",
    "Etc/GMT0",
    "Etc/GMT+0",
    "Etc/GMT-0",
    "Etc/Greenwich",
    "Etc/Universal",
    "Etc/Zulu",
];

/// True for zones that are UTC under another name: no offset, no DST.
#[must_use]
pub fn is_utc_equivalent(zone: Tz) -> bool {
    UTC_ALIASES.contains(&zone.name())
}

/// Interprets `civil` as wall-clock time in `zone`.
///
/// The fields are rebuilt in the zone rather than shifted by an offset, so a
/// daily 09:00 stays at 09:00 local time on both sides of a DST change. A
/// time repeated by a DST fold resolves to its earlier instant; a time
/// skipped by a DST gap does not exist and yields `None`.
pub(crate) fn project(zone: Tz, civil: NaiveDateTime) -> Option<DateTime<Tz>> {
    if is_utc_equivalent(zone) {
        return Some(zone.from_utc_datetime(&civil));
    }
    let projected = zone.from_local_datetime(&civil).earliest();
    if projected.is_none() {
        tracing::trace!(%civil, zone = zone.name(), "Skipping local time inside a DST gap");
    }
    projected
}
