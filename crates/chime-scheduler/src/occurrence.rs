use chime_core::{ReminderDefinition, TimeOfDay};
use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone};

use crate::error::{Result, SchedulerError};

/// Compute the next instant strictly after `after` at which `def` fires.
///
/// Every calendar day of the coming week is tried; a day whose weekday is in
/// the mask yields a candidate at `def.time` local wall clock. A candidate at
/// or before `after` (today's slot already passed) moves one week ahead. The
/// earliest candidate wins.
///
/// Local-time resolution is the zone's own: no offset arithmetic happens here.
/// Returns `InvalidDefinition` when the day mask is empty.
pub fn next_occurrence<Tz: TimeZone>(
    def: &ReminderDefinition,
    after: &DateTime<Tz>,
) -> Result<DateTime<Tz>> {
    if def.days.is_empty() {
        return Err(SchedulerError::InvalidDefinition(format!(
            "reminder {} has no active day",
            def.id
        )));
    }

    let tz = after.timezone();
    let today = after.date_naive();
    let time = def.time.to_naive_time();

    let mut best: Option<DateTime<Tz>> = None;
    for offset in 0..7 {
        let date = today + Duration::days(offset);
        if !def.days.contains(date.weekday()) {
            continue;
        }

        let mut candidate = resolve_local(&tz, date, time);
        if candidate <= *after {
            candidate = resolve_local(&tz, date + Duration::days(7), time);
        }

        best = match best {
            Some(current) if current <= candidate => Some(current),
            _ => Some(candidate),
        };
    }

    best.ok_or_else(|| {
        SchedulerError::InvalidDefinition(format!("reminder {} has no active day", def.id))
    })
}

/// Turn a local date + wall-clock time into an instant in `tz`.
///
/// A repeated wall-clock time (DST fall-back) resolves to the earlier
/// instant. A skipped one (DST spring-forward gap) resolves an hour later,
/// the first wall-clock reading that exists.
pub fn resolve_local<Tz: TimeZone>(tz: &Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(earliest, _) => earliest,
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .unwrap_or_else(|| tz.from_utc_datetime(&naive)),
    }
}

/// Day/time match: `now`'s weekday is in the mask and its wall-clock time,
/// truncated to the minute, equals the reminder's time.
pub fn matches_minute<Tz: TimeZone>(def: &ReminderDefinition, now: &DateTime<Tz>) -> bool {
    def.days.contains(now.weekday()) && TimeOfDay::from_time(now.time()) == def.time
}
