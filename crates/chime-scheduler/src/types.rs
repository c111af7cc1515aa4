use chime_core::{ReminderDefinition, ReminderId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Why a reminder is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireReason {
    /// Day mask and time of day matched.
    Scheduled,
    /// A snooze window elapsed; day/time matching was bypassed.
    SnoozeResumed,
}

/// Which path made the fire decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireSource {
    Poll,
    Wake,
}

/// Emitted exactly once per occurrence; consumed by the alarm dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FireEvent {
    /// Snapshot of the definition at decision time.
    pub reminder: ReminderDefinition,
    /// Instant the occurrence was scheduled for (or the snooze resume instant).
    pub occurrence_at: DateTime<Utc>,
    /// Local calendar date of the occurrence; the ledger key.
    pub occurrence_date: NaiveDate,
    pub reason: FireReason,
    pub source: FireSource,
}

impl FireEvent {
    pub fn id(&self) -> &ReminderId {
        &self.reminder.id
    }
}

/// Reliability status changes, broadcast to whoever surfaces them to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StatusEvent {
    /// Arming a wake failed; the reminder may not fire while suspended.
    Degraded { id: ReminderId, reason: String },
    /// A later arm succeeded.
    Recovered { id: ReminderId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_events_are_tagged() {
        let ev = StatusEvent::Degraded {
            id: ReminderId::from("r1"),
            reason: "wake quota exceeded (max 512)".into(),
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["id"], "r1");

        let back: StatusEvent =
            serde_json::from_str(r#"{"status":"recovered","id":"r1"}"#).unwrap();
        assert_eq!(back, StatusEvent::Recovered { id: "r1".into() });
    }

    #[test]
    fn fire_event_serializes_reason_and_source() {
        let def = chime_core::ReminderDefinition::new(
            "tea",
            "16:00".parse().unwrap(),
            chime_core::DayMask::EVERY_DAY,
        )
        .unwrap();
        let at = DateTime::parse_from_rfc3339("2026-10-14T16:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let ev = FireEvent {
            reminder: def,
            occurrence_at: at,
            occurrence_date: at.date_naive(),
            reason: FireReason::SnoozeResumed,
            source: FireSource::Wake,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["reason"], "snooze_resumed");
        assert_eq!(json["source"], "wake");
        assert_eq!(json["occurrence_date"], "2026-10-14");
    }
}
