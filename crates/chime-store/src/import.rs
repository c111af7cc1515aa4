//! Import of the legacy `reminders.json` file written by the old mobile app.
//!
//! Entries look like:
//!
//! ```json
//! {"text": "Pills", "time": "08:00", "enabled": true, "days": [0, 1, 2],
//!  "ringtone": "Default System Sound", "ringtone_uri": "SYSTEM_DEFAULT",
//!  "category": "Health", "note": "with water", "priority": "high"}
//! ```
//!
//! Legacy entries are addressed by list position; each imported entry gets a
//! fresh stable id instead.

use std::path::Path;

use chime_core::{ChimeError, DayMask, ReminderDefinition, SoundRef};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::store::ReminderStore;

/// Display name the legacy app used for "no sound, vibration only".
const LEGACY_VIBRATE_ONLY: &str = "Vibrate Only";

#[derive(Debug, Deserialize)]
struct LegacyReminder {
    text: String,
    time: String,
    #[serde(default)]
    enabled: Option<bool>,
    /// Missing means every day; an explicit empty list is invalid.
    #[serde(default)]
    days: Option<Vec<i64>>,
    #[serde(default)]
    ringtone: Option<String>,
    #[serde(default)]
    ringtone_uri: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    note: Option<String>,
    #[serde(default)]
    priority: Option<String>,
}

impl LegacyReminder {
    fn into_definition(self) -> chime_core::Result<ReminderDefinition> {
        let days = match self.days {
            None => DayMask::EVERY_DAY,
            Some(days) => {
                let indices = days
                    .into_iter()
                    .map(|d| {
                        u8::try_from(d).map_err(|_| {
                            ChimeError::InvalidDefinition(format!("day index {d} is outside 0..=6"))
                        })
                    })
                    .collect::<chime_core::Result<Vec<u8>>>()?;
                DayMask::from_indices(&indices)?
            }
        };

        let sound = if self.ringtone.as_deref() == Some(LEGACY_VIBRATE_ONLY) {
            SoundRef::VibrateOnly
        } else {
            self.ringtone_uri.map(SoundRef::from).unwrap_or_default()
        };

        let mut def = ReminderDefinition::new(self.text, self.time.parse()?, days)?
            .with_enabled(self.enabled.unwrap_or(true))
            .with_sound(sound);
        if let Some(category) = self.category.filter(|c| !c.trim().is_empty()) {
            def = def.with_category(category);
        }
        if let Some(note) = self.note {
            def = def.with_note(note);
        }
        if let Some(priority) = self.priority {
            def = def.with_priority(priority.parse()?);
        }
        Ok(def)
    }
}

/// Outcome of an import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

/// Parse legacy JSON into validated definitions. Invalid entries are skipped
/// with a warning and counted.
pub fn parse_legacy_json(json: &str) -> Result<(Vec<ReminderDefinition>, usize)> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let mut defs = Vec::with_capacity(entries.len());
    let mut skipped = 0;

    for (position, entry) in entries.into_iter().enumerate() {
        let parsed = serde_json::from_value::<LegacyReminder>(entry)
            .map_err(ChimeError::from)
            .and_then(LegacyReminder::into_definition);
        match parsed {
            Ok(def) => defs.push(def),
            Err(e) => {
                warn!(position, error = %e, "skipping legacy reminder");
                skipped += 1;
            }
        }
    }
    Ok((defs, skipped))
}

/// Read `path` and create every valid entry in `store`.
pub fn import_legacy_json(path: &Path, store: &dyn ReminderStore) -> Result<ImportReport> {
    let json = std::fs::read_to_string(path)?;
    let (defs, skipped) = parse_legacy_json(&json)?;

    let mut report = ImportReport {
        imported: 0,
        skipped,
    };
    for def in defs {
        store.create(def)?;
        report.imported += 1;
    }
    info!(
        path = %path.display(),
        imported = report.imported,
        skipped = report.skipped,
        "legacy reminders imported"
    );
    Ok(report)
}
