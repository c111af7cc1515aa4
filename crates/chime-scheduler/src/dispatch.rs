use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chime_core::{ReminderId, SoundRef};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::types::FireEvent;

/// Presents a fired reminder to the user (sound, notification, full-screen alarm).
///
/// Called exactly once per occurrence, never while the engine's lock is held.
/// Implementations should return quickly; slow presentation belongs on a task
/// of their own.
#[async_trait]
pub trait AlarmDispatcher: Send + Sync {
    async fn dispatch(&self, event: &FireEvent) -> Result<DispatchReport, DispatchError>;

    /// Stop presenting `id` (user snoozed or dismissed it).
    async fn dismiss(&self, _id: &ReminderId) {}
}

/// The sound actually used for an alarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ResolvedSound {
    SystemDefault,
    Vibrate,
    File(PathBuf),
    /// Opaque platform URI, passed through untouched.
    Uri(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sound: ResolvedSound,
    /// The configured sound was unusable and the system default was used.
    pub degraded: bool,
}

/// Map a configured sound to something playable.
///
/// A local file (bare path or `file://` URI) that no longer exists falls back
/// to the system default sound. Other URI schemes can't be checked from here
/// and are passed through.
pub fn resolve_sound(sound: &SoundRef) -> DispatchReport {
    let custom = match sound {
        SoundRef::SystemDefault => return report(ResolvedSound::SystemDefault, false),
        SoundRef::VibrateOnly => return report(ResolvedSound::Vibrate, false),
        SoundRef::Custom(s) => s.trim(),
    };

    let path = match custom.strip_prefix("file://") {
        Some(p) => Path::new(p),
        None if custom.contains("://") => return report(ResolvedSound::Uri(custom.to_string()), false),
        None => Path::new(custom),
    };

    if custom.is_empty() || !path.is_file() {
        warn!(sound = %custom, "custom sound unavailable, using system default");
        return report(ResolvedSound::SystemDefault, true);
    }
    report(ResolvedSound::File(path.to_path_buf()), false)
}

fn report(sound: ResolvedSound, degraded: bool) -> DispatchReport {
    DispatchReport { sound, degraded }
}

/// Hands fired events to a consumer task over a bounded channel.
///
/// `try_send` keeps the engine from ever blocking on a slow consumer; a full
/// channel is reported as an error and the event is dropped.
pub struct ChannelDispatcher {
    tx: mpsc::Sender<FireEvent>,
}

impl ChannelDispatcher {
    pub fn new(tx: mpsc::Sender<FireEvent>) -> Self {
        Self { tx }
    }

    /// Convenience: a dispatcher plus the receiving end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<FireEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl AlarmDispatcher for ChannelDispatcher {
    async fn dispatch(&self, event: &FireEvent) -> Result<DispatchReport, DispatchError> {
        let sound = resolve_sound(&event.reminder.sound);
        self.tx.try_send(event.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DispatchError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => DispatchError::ChannelClosed,
        })?;
        Ok(sound)
    }
}

/// Headless dispatcher: the alarm is a structured log line.
#[derive(Default)]
pub struct TracingDispatcher {
    ringing: Mutex<HashSet<ReminderId>>,
}

impl TracingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ringing(&self, id: &ReminderId) -> bool {
        self.ringing.lock().expect("ringing set poisoned").contains(id)
    }
}

#[async_trait]
impl AlarmDispatcher for TracingDispatcher {
    async fn dispatch(&self, event: &FireEvent) -> Result<DispatchReport, DispatchError> {
        let report = resolve_sound(&event.reminder.sound);
        let def = &event.reminder;
        info!(
            reminder_id = %def.id,
            text = %def.text,
            category = %def.category,
            priority = %def.priority,
            note = def.note.as_deref().unwrap_or(""),
            sound = ?report.sound,
            sound_degraded = report.degraded,
            reason = ?event.reason,
            source = ?event.source,
            occurrence_at = %event.occurrence_at,
            "ALARM"
        );
        self.ringing
            .lock()
            .expect("ringing set poisoned")
            .insert(def.id.clone());
        Ok(report)
    }

    async fn dismiss(&self, id: &ReminderId) {
        if self.ringing.lock().expect("ringing set poisoned").remove(id) {
            info!(reminder_id = %id, "alarm dismissed");
        }
    }
}

#[cfg(test)]
mod tests {
    use chime_core::{DayMask, ReminderDefinition};
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::types::{FireReason, FireSource};

    fn event(sound: SoundRef) -> FireEvent {
        let def = ReminderDefinition::new("pills", "08:00".parse().unwrap(), DayMask::EVERY_DAY)
            .unwrap()
            .with_id("pills")
            .with_sound(sound);
        let at = Utc.with_ymd_and_hms(2026, 10, 14, 8, 0, 0).unwrap();
        FireEvent {
            reminder: def,
            occurrence_at: at,
            occurrence_date: at.date_naive(),
            reason: FireReason::Scheduled,
            source: FireSource::Poll,
        }
    }

    #[test]
    fn builtin_sounds_resolve_directly() {
        assert_eq!(resolve_sound(&SoundRef::SystemDefault).sound, ResolvedSound::SystemDefault);
        let vib = resolve_sound(&SoundRef::VibrateOnly);
        assert_eq!(vib.sound, ResolvedSound::Vibrate);
        assert!(!vib.degraded);
    }

    #[test]
    fn missing_file_falls_back_to_default() {
        let missing = SoundRef::Custom("/definitely/not/here/bell.ogg".into());
        let r = resolve_sound(&missing);
        assert_eq!(r.sound, ResolvedSound::SystemDefault);
        assert!(r.degraded);

        let missing_uri = SoundRef::Custom("file:///definitely/not/here/bell.ogg".into());
        assert!(resolve_sound(&missing_uri).degraded);
    }

    #[test]
    fn existing_file_is_used() {
        let path = std::env::temp_dir().join(format!("chime-sound-{}.wav", std::process::id()));
        std::fs::write(&path, b"RIFF").unwrap();
        let r = resolve_sound(&SoundRef::Custom(path.display().to_string()));
        assert_eq!(r.sound, ResolvedSound::File(path.clone()));
        assert!(!r.degraded);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn opaque_uri_passes_through() {
        let uri = "content://media/internal/audio/media/12";
        let r = resolve_sound(&SoundRef::Custom(uri.into()));
        assert_eq!(r.sound, ResolvedSound::Uri(uri.into()));
        assert!(!r.degraded);
    }

    #[tokio::test]
    async fn channel_dispatcher_reports_full_and_closed() {
        let (dispatcher, mut rx) = ChannelDispatcher::channel(1);
        let ev = event(SoundRef::SystemDefault);
        assert!(dispatcher.dispatch(&ev).await.is_ok());
        assert!(matches!(
            dispatcher.dispatch(&ev).await,
            Err(DispatchError::ChannelFull)
        ));
        assert_eq!(rx.recv().await.unwrap(), ev);
        drop(rx);
        assert!(matches!(
            dispatcher.dispatch(&ev).await,
            Err(DispatchError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn tracing_dispatcher_rings_until_dismissed() {
        let dispatcher = TracingDispatcher::new();
        let ev = event(SoundRef::VibrateOnly);
        dispatcher.dispatch(&ev).await.unwrap();
        assert!(dispatcher.is_ringing(ev.id()));
        dispatcher.dismiss(ev.id()).await;
        assert!(!dispatcher.is_ringing(ev.id()));
    }
}
