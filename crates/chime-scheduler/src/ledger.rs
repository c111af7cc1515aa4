use std::collections::{HashMap, HashSet};

use chime_core::{ReminderDefinition, ReminderId};
use chrono::{DateTime, NaiveDate, TimeZone};
use tracing::{debug, info};

use crate::occurrence::matches_minute;
use crate::snooze::{ReminderState, SnoozeDuration, SnoozeWindow};
use crate::types::FireReason;

/// Idempotence record: which occurrences `(reminder, local date)` already fired,
/// plus the active snooze windows.
///
/// Not thread-safe on its own; the engine keeps it behind its single lock so
/// a `should_fire` / `mark_fired` pair is never interleaved with another.
#[derive(Debug, Default)]
pub struct TriggerLedger {
    last_seen: Option<NaiveDate>,
    fired: HashSet<(ReminderId, NaiveDate)>,
    snoozes: HashMap<ReminderId, SnoozeWindow>,
}

impl TriggerLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `def` is due at `now`, and why.
    ///
    /// Pure: repeated calls in the same minute give the same answer until
    /// [`mark_fired`](Self::mark_fired) is called.
    pub fn due_reason<Tz: TimeZone>(
        &self,
        def: &ReminderDefinition,
        now: &DateTime<Tz>,
    ) -> Option<FireReason> {
        if !def.enabled {
            return None;
        }

        if let Some(window) = self.snoozes.get(&def.id) {
            // A resumed snooze bypasses day/time matching and the ledger entry.
            return (!window.is_active(now)).then_some(FireReason::SnoozeResumed);
        }

        if !matches_minute(def, now) {
            return None;
        }
        if self.is_fired(&def.id, now.date_naive()) {
            return None;
        }
        Some(FireReason::Scheduled)
    }

    pub fn should_fire<Tz: TimeZone>(&self, def: &ReminderDefinition, now: &DateTime<Tz>) -> bool {
        self.due_reason(def, now).is_some()
    }

    /// Record today's occurrence of `def` as fired.
    pub fn mark_fired<Tz: TimeZone>(&mut self, def: &ReminderDefinition, now: &DateTime<Tz>) {
        self.mark_fired_on(&def.id, now.date_naive());
    }

    /// Record the occurrence on `date` as fired. Returns false if it already was.
    pub fn mark_fired_on(&mut self, id: &ReminderId, date: NaiveDate) -> bool {
        let inserted = self.fired.insert((id.clone(), date));
        debug!(reminder_id = %id, %date, inserted, "occurrence marked fired");
        inserted
    }

    pub fn is_fired(&self, id: &ReminderId, date: NaiveDate) -> bool {
        // Tuple key needs an owned id for lookup.
        self.fired.contains(&(id.clone(), date))
    }

    /// Clear per-day state when `now`'s local date differs from the last one seen.
    ///
    /// Driven by date comparison, not by a midnight tick, so missed ticks,
    /// suspension and clock jumps in either direction self-correct on the next
    /// call. A snooze window is removed only when its resumed fire happens, so
    /// every window still present here is pending: it survives, together with
    /// the entries of its reminder, and fires on the next check once resumed.
    /// Returns true when a rollover happened.
    pub fn rollover_if_new_day<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> bool {
        let today = now.date_naive();
        let previous = match self.last_seen {
            Some(d) if d == today => return false,
            None => {
                self.last_seen = Some(today);
                return false;
            }
            Some(d) => d,
        };

        let snoozes = &self.snoozes;
        let before = self.fired.len();
        self.fired.retain(|(id, _)| snoozes.contains_key(id));
        self.last_seen = Some(today);

        info!(
            from = %previous,
            to = %today,
            cleared = before - self.fired.len(),
            pending_snoozes = self.snoozes.len(),
            "local date rolled over, ledger cleared"
        );
        true
    }

    /// Start (or replace) a snooze window for `id`.
    ///
    /// The window belongs to the latest occurrence of `id` fired on or before
    /// today, so a resumed fire after midnight is still recorded against it.
    pub fn snooze<Tz: TimeZone>(
        &mut self,
        id: &ReminderId,
        now: &DateTime<Tz>,
        duration: SnoozeDuration,
    ) -> SnoozeWindow {
        let today = now.date_naive();
        let occurrence_date = self
            .fired
            .iter()
            .filter(|(fired_id, date)| fired_id == id && *date <= today)
            .map(|(_, date)| *date)
            .max()
            .unwrap_or(today);
        let window = SnoozeWindow::starting(now, occurrence_date, duration);
        self.snoozes.insert(id.clone(), window);
        info!(
            reminder_id = %id,
            resume_at = %window.resume_at,
            occurrence = %occurrence_date,
            "reminder snoozed"
        );
        window
    }

    pub fn clear_snooze(&mut self, id: &ReminderId) -> Option<SnoozeWindow> {
        self.snoozes.remove(id)
    }

    pub fn snooze_for(&self, id: &ReminderId) -> Option<&SnoozeWindow> {
        self.snoozes.get(id)
    }

    /// Manual state reset (toggle, edit, delete): forget every fired entry and
    /// any snooze for `id`.
    pub fn reset(&mut self, id: &ReminderId) {
        self.fired.retain(|(fired_id, _)| fired_id != id);
        if self.snoozes.remove(id).is_some() {
            debug!(reminder_id = %id, "snooze cleared by reset");
        }
    }

    pub fn state<Tz: TimeZone>(&self, def: &ReminderDefinition, now: &DateTime<Tz>) -> ReminderState {
        if let Some(window) = self.snoozes.get(&def.id).filter(|w| w.is_active(now)) {
            return ReminderState::Snoozed {
                resume_at: window.resume_at,
            };
        }
        if self.is_fired(&def.id, now.date_naive()) {
            ReminderState::Fired
        } else {
            ReminderState::Idle
        }
    }

    pub fn fired_count(&self) -> usize {
        self.fired.len()
    }
}

#[cfg(test)]
mod tests {
    use chime_core::DayMask;
    use chrono::{Duration, Utc, Weekday};

    use super::*;

    fn wed_nine() -> ReminderDefinition {
        ReminderDefinition::new(
            "stand up",
            "09:00".parse().unwrap(),
            DayMask::from_weekdays([Weekday::Wed]),
        )
        .unwrap()
        .with_id("wed-nine")
    }

    fn at(d: u32, h: u32, m: u32, s: u32) -> DateTime<Utc> {
        // October 2026: the 14th and 21st are Wednesdays
        Utc.with_ymd_and_hms(2026, 10, d, h, m, s).unwrap()
    }

    #[test]
    fn fires_on_exact_day_and_minute() {
        let ledger = TriggerLedger::new();
        let def = wed_nine();
        assert!(ledger.should_fire(&def, &at(14, 9, 0, 0)));
        assert!(ledger.should_fire(&def, &at(14, 9, 0, 59)));
        assert!(!ledger.should_fire(&def, &at(14, 9, 1, 0)));
        assert!(!ledger.should_fire(&def, &at(15, 9, 0, 0)));
    }

    #[test]
    fn disabled_never_fires() {
        let ledger = TriggerLedger::new();
        let def = wed_nine().with_enabled(false);
        assert!(!ledger.should_fire(&def, &at(14, 9, 0, 0)));
    }

    #[test]
    fn should_fire_is_pure_until_marked() {
        let mut ledger = TriggerLedger::new();
        let def = wed_nine();
        let now = at(14, 9, 0, 5);
        assert!(ledger.should_fire(&def, &now));
        assert!(ledger.should_fire(&def, &now));

        ledger.mark_fired(&def, &now);
        for secs in [6, 30, 59] {
            assert!(!ledger.should_fire(&def, &at(14, 9, 0, secs)));
        }
        // Rest of the date, at any poll frequency
        assert!(!ledger.should_fire(&def, &at(14, 23, 59, 59)));
        assert_eq!(ledger.state(&def, &now), ReminderState::Fired);
    }

    #[test]
    fn rollover_clears_entries_and_allows_next_occurrence() {
        let mut ledger = TriggerLedger::new();
        let def = wed_nine();
        let first = at(14, 9, 0, 0);
        assert!(!ledger.rollover_if_new_day(&first));
        ledger.mark_fired(&def, &first);
        assert_eq!(ledger.fired_count(), 1);

        // Same day: nothing happens
        assert!(!ledger.rollover_if_new_day(&at(14, 23, 0, 0)));
        assert_eq!(ledger.fired_count(), 1);

        // Ticks for several days were missed entirely
        let next_week = at(21, 9, 0, 0);
        assert!(ledger.rollover_if_new_day(&next_week));
        assert_eq!(ledger.fired_count(), 0);
        assert!(ledger.should_fire(&def, &next_week));
    }

    #[test]
    fn clock_moving_backwards_also_rolls_over() {
        let mut ledger = TriggerLedger::new();
        let def = wed_nine();
        ledger.rollover_if_new_day(&at(15, 0, 5, 0));
        ledger.mark_fired_on(&def.id, at(14, 0, 0, 0).date_naive());
        assert!(ledger.rollover_if_new_day(&at(14, 23, 58, 0)));
        assert_eq!(ledger.fired_count(), 0);
    }

    #[test]
    fn snooze_suppresses_then_forces_due() {
        let mut ledger = TriggerLedger::new();
        let def = wed_nine();
        let fired_at = at(14, 9, 0, 0);
        ledger.mark_fired(&def, &fired_at);
        ledger.snooze(&def.id, &fired_at, SnoozeDuration::clamped(10));

        assert!(!ledger.should_fire(&def, &at(14, 9, 5, 0)));
        assert!(matches!(
            ledger.state(&def, &at(14, 9, 5, 0)),
            ReminderState::Snoozed { .. }
        ));
        // Due at and after resume, although 09:10 matches neither time nor ledger
        assert_eq!(
            ledger.due_reason(&def, &at(14, 9, 10, 0)),
            Some(FireReason::SnoozeResumed)
        );
        assert!(ledger.should_fire(&def, &at(14, 9, 12, 0)));
    }

    #[test]
    fn resnooze_replaces_window() {
        let mut ledger = TriggerLedger::new();
        let id = ReminderId::from("r");
        let now = at(14, 9, 0, 0);
        ledger.snooze(&id, &now, SnoozeDuration::clamped(5));
        let second = ledger.snooze(&id, &now, SnoozeDuration::clamped(20));
        assert_eq!(ledger.snooze_for(&id), Some(&second));
        assert_eq!(second.resume_at, now + Duration::minutes(20));
    }

    #[test]
    fn rollover_keeps_pending_snoozes() {
        let mut ledger = TriggerLedger::new();
        let late = wed_nine().with_id("late");
        let early = wed_nine().with_id("early");
        let other = wed_nine().with_id("other");
        let evening = at(14, 23, 55, 0);
        ledger.rollover_if_new_day(&evening);

        ledger.mark_fired(&late, &evening);
        ledger.snooze(&late.id, &evening, SnoozeDuration::clamped(10));
        ledger.mark_fired(&early, &at(14, 23, 40, 0));
        ledger.snooze(&early.id, &at(14, 23, 40, 0), SnoozeDuration::clamped(5));
        ledger.mark_fired(&other, &evening);

        let after_midnight = at(15, 0, 1, 0);
        assert!(ledger.rollover_if_new_day(&after_midnight));
        // "late" resumes at 00:05: still snoozed
        assert!(ledger.snooze_for(&late.id).is_some());
        assert!(ledger.is_fired(&late.id, evening.date_naive()));
        assert!(!ledger.should_fire(&late, &after_midnight));
        assert!(ledger.should_fire(&late, &at(15, 0, 5, 0)));
        // "early" resumed at 23:45 but no check ran before midnight: still due
        assert_eq!(
            ledger.due_reason(&early, &after_midnight),
            Some(FireReason::SnoozeResumed)
        );
        // No snooze: the entry is gone
        assert!(!ledger.is_fired(&other.id, evening.date_naive()));
    }

    #[test]
    fn snooze_keeps_the_date_of_the_snoozed_occurrence() {
        let mut ledger = TriggerLedger::new();
        let daily = ReminderDefinition::new("pills", "23:55".parse().unwrap(), DayMask::EVERY_DAY)
            .unwrap()
            .with_id("pills");
        let wed = at(14, 23, 55, 0);
        ledger.rollover_if_new_day(&wed);
        ledger.mark_fired(&daily, &wed);
        let window = ledger.snooze(&daily.id, &wed, SnoozeDuration::clamped(10));
        assert_eq!(window.occurrence_date, wed.date_naive());

        // Resumes on Thursday, recorded against Wednesday
        let thu = at(15, 0, 5, 0);
        ledger.rollover_if_new_day(&thu);
        let resumed = ledger.clear_snooze(&daily.id).unwrap();
        ledger.mark_fired_on(&daily.id, resumed.occurrence_date);

        // Thursday's own occurrence is independent
        assert_eq!(ledger.state(&daily, &thu), ReminderState::Idle);
        assert!(ledger.should_fire(&daily, &at(15, 23, 55, 0)));

        // Re-snoozing after midnight still targets Wednesday's occurrence
        let again = ledger.snooze(&daily.id, &thu, SnoozeDuration::clamped(5));
        assert_eq!(again.occurrence_date, wed.date_naive());
    }

    #[test]
    fn reset_forgets_entries_and_snooze() {
        let mut ledger = TriggerLedger::new();
        let def = wed_nine();
        let now = at(14, 9, 0, 0);
        ledger.mark_fired(&def, &now);
        ledger.snooze(&def.id, &now, SnoozeDuration::default());
        ledger.reset(&def.id);
        assert_eq!(ledger.state(&def, &now), ReminderState::Idle);
        assert!(ledger.should_fire(&def, &now));
    }
}
