//! Snooze state machine.
//!
//! ```text
//!            fire                 snooze(d)
//!  Idle ───────────► Fired ───────────────────► Snoozed
//!   ▲                  │                           │
//!   │    date rollover │      now >= resume_at     │
//!   └──────────────────┘      (due immediately,    │
//!   ▲                          fires → Fired)      │
//!   └──────────────────────────────────────────────┘
//! ```
//!
//! While snoozed the reminder ignores its day/time match. Once `resume_at`
//! passes it is due on the next check regardless of day mask or time of day.
//! The resumed fire belongs to the occurrence that was snoozed, even when it
//! lands after midnight, so the next day's own occurrence stays independent.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const MIN_SNOOZE_MINUTES: u32 = 5;
pub const MAX_SNOOZE_MINUTES: u32 = 30;

/// Snooze length, always within 5..=30 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozeDuration(u32);

impl SnoozeDuration {
    /// Out-of-range values are clamped, never rejected.
    pub fn clamped(minutes: u32) -> Self {
        let clamped = minutes.clamp(MIN_SNOOZE_MINUTES, MAX_SNOOZE_MINUTES);
        if clamped != minutes {
            warn!(
                requested = minutes,
                used = clamped,
                "snooze duration out of range, clamped"
            );
        }
        Self(clamped)
    }

    pub fn minutes(self) -> u32 {
        self.0
    }

    pub fn as_duration(self) -> Duration {
        Duration::minutes(self.0 as i64)
    }
}

impl Default for SnoozeDuration {
    fn default() -> Self {
        Self(MIN_SNOOZE_MINUTES)
    }
}

/// Active snooze override for one reminder. Re-snoozing replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozeWindow {
    /// Absolute instant at which the reminder becomes due again.
    pub resume_at: DateTime<Utc>,
    /// Local date of the occurrence being snoozed.
    pub occurrence_date: NaiveDate,
}

impl SnoozeWindow {
    pub fn starting<Tz: TimeZone>(
        now: &DateTime<Tz>,
        occurrence_date: NaiveDate,
        duration: SnoozeDuration,
    ) -> Self {
        Self {
            resume_at: now.with_timezone(&Utc) + duration.as_duration(),
            occurrence_date,
        }
    }

    /// True while `now` is still before `resume_at`.
    pub fn is_active<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        now.with_timezone(&Utc) < self.resume_at
    }
}

/// Where a reminder sits in the snooze state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ReminderState {
    /// Normal day/time matching is active.
    Idle,
    /// Already fired for today; quiet until rollover or snooze.
    Fired,
    /// Suppressed until `resume_at`.
    Snoozed { resume_at: DateTime<Utc> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_clamped_to_range() {
        assert_eq!(SnoozeDuration::clamped(1).minutes(), 5);
        assert_eq!(SnoozeDuration::clamped(10).minutes(), 10);
        assert_eq!(SnoozeDuration::clamped(90).minutes(), 30);
        assert_eq!(SnoozeDuration::default().minutes(), 5);
    }

    #[test]
    fn window_is_active_until_resume_instant() {
        let now = Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap();
        let window = SnoozeWindow::starting(&now, now.date_naive(), SnoozeDuration::clamped(10));
        assert_eq!(window.resume_at, now + Duration::minutes(10));
        assert_eq!(window.occurrence_date, now.date_naive());
        assert!(window.is_active(&(now + Duration::minutes(5))));
        assert!(!window.is_active(&(now + Duration::minutes(10))));
        assert!(!window.is_active(&(now + Duration::minutes(11))));
    }
}
