use std::sync::Mutex;

use chrono::{DateTime, Duration, Local, TimeZone};

/// Source of "now" in the zone whose wall clock reminders are matched against.
pub trait Clock<Tz: TimeZone>: Send + Sync {
    fn now(&self) -> DateTime<Tz>;
}

/// The host's local clock. DST and zone changes come from the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock<Local> for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Settable clock for deterministic tests and replay.
pub struct ManualClock<Tz: TimeZone> {
    now: Mutex<DateTime<Tz>>,
}

impl<Tz: TimeZone> ManualClock<Tz> {
    pub fn new(start: DateTime<Tz>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Tz>) {
        *self.now.lock().expect("clock poisoned") = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock poisoned");
        *now = (*now).clone() + by;
    }
}

impl<Tz> Clock<Tz> for ManualClock<Tz>
where
    Tz: TimeZone + Send + Sync,
    Tz::Offset: Send + Sync,
{
    fn now(&self) -> DateTime<Tz> {
        self.now.lock().expect("clock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let start = Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), start + Duration::minutes(90));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
