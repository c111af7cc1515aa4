//! Reminder definitions, shared between the store, the scheduling core and
//! the alarm dispatcher.

use serde::{Deserialize, Serialize};

use crate::error::{ChimeError, Result};
use crate::types::{DayMask, Priority, ReminderId, SoundRef, TimeOfDay};

fn bool_true() -> bool {
    true
}

fn default_category() -> String {
    "Reminder".to_string()
}

/// A user-defined recurring reminder.
///
/// Owned by the reminder store; the scheduler only ever holds snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderDefinition {
    pub id: ReminderId,
    /// Text shown when the reminder fires. Never empty.
    pub text: String,
    /// Local wall-clock time to fire at.
    pub time: TimeOfDay,
    /// Weekdays the reminder is eligible on. Never empty once validated.
    pub days: DayMask,
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub sound: SoundRef,
}

impl ReminderDefinition {
    /// Create an enabled, medium-priority reminder with a fresh id.
    ///
    /// Fails with `InvalidDefinition` when `text` is blank or `days` is empty:
    /// a reminder with no active day can never occur.
    pub fn new(text: impl Into<String>, time: TimeOfDay, days: DayMask) -> Result<Self> {
        let def = Self {
            id: ReminderId::new(),
            text: text.into(),
            time,
            days,
            enabled: true,
            priority: Priority::default(),
            category: default_category(),
            note: None,
            sound: SoundRef::default(),
        };
        def.validate()?;
        Ok(def)
    }

    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(ChimeError::InvalidDefinition(
                "reminder text must not be empty".into(),
            ));
        }
        if self.days.is_empty() {
            return Err(ChimeError::InvalidDefinition(format!(
                "reminder {} has no active day",
                self.id
            )));
        }
        Ok(())
    }

    pub fn with_id(mut self, id: impl Into<ReminderId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        self.note = if note.trim().is_empty() { None } else { Some(note) };
        self
    }

    pub fn with_sound(mut self, sound: SoundRef) -> Self {
        self.sound = sound;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    #[test]
    fn new_rejects_empty_days() {
        let err = ReminderDefinition::new("stretch", at("09:00"), DayMask::EMPTY).unwrap_err();
        assert_eq!(err.code(), "INVALID_DEFINITION");
    }

    #[test]
    fn new_rejects_blank_text() {
        assert!(ReminderDefinition::new("   ", at("09:00"), DayMask::EVERY_DAY).is_err());
    }

    #[test]
    fn builder_defaults() {
        let def = ReminderDefinition::new("water plants", at("18:30"), DayMask::WEEKENDS)
            .unwrap()
            .with_priority(Priority::High)
            .with_note("");
        assert!(def.enabled);
        assert_eq!(def.category, "Reminder");
        assert_eq!(def.priority, Priority::High);
        assert_eq!(def.note, None);
        assert_eq!(def.sound, SoundRef::SystemDefault);
    }

    #[test]
    fn json_fills_missing_optional_fields() {
        let json = r#"{"id":"r-1","text":"pills","time":"08:00","days":[0,1,2,3,4,5,6]}"#;
        let def: ReminderDefinition = serde_json::from_str(json).unwrap();
        assert!(def.enabled);
        assert_eq!(def.days, DayMask::EVERY_DAY);
        assert_eq!(def.id.as_str(), "r-1");
        assert_eq!(def.priority, Priority::Medium);
    }
}
