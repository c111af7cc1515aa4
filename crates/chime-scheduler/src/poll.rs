use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chime_core::ReminderDefinition;
use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, info};

use crate::ledger::TriggerLedger;
use crate::occurrence::resolve_local;
use crate::types::{FireEvent, FireReason, FireSource};

/// Fixed-interval evaluator: the primary path while the process is awake.
///
/// At most one evaluation runs at a time. A tick that arrives while the
/// previous one is still going is skipped, not queued.
pub struct PollScheduler {
    interval: Duration,
    running: AtomicBool,
}

/// Held for the length of one evaluation; releases the slot on drop.
pub struct PollGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

impl PollScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: AtomicBool::new(false),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Claim the evaluation slot. `None` when an evaluation is already running.
    pub fn try_begin(&self) -> Option<PollGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| PollGuard {
                running: &self.running,
            })
    }

    /// One evaluation over a store snapshot.
    ///
    /// Rolls the ledger over on a new local date, then fires every enabled
    /// reminder that is due, marking each in the ledger before it is returned.
    /// A fired snooze is cleared and recorded against the occurrence it
    /// snoozed. Callers must hold the ledger exclusively for
    /// the whole call.
    pub fn evaluate<Tz: TimeZone>(
        ledger: &mut TriggerLedger,
        defs: &[ReminderDefinition],
        now: &DateTime<Tz>,
    ) -> Vec<FireEvent> {
        ledger.rollover_if_new_day(now);

        let today = now.date_naive();
        let mut fired = Vec::new();
        for def in defs.iter().filter(|d| d.enabled) {
            let Some(reason) = ledger.due_reason(def, now) else {
                continue;
            };

            let (occurrence_at, occurrence_date) = match reason {
                FireReason::Scheduled => (
                    resolve_local(&now.timezone(), today, def.time.to_naive_time())
                        .with_timezone(&Utc),
                    today,
                ),
                FireReason::SnoozeResumed => match ledger.clear_snooze(&def.id) {
                    Some(window) => (window.resume_at, window.occurrence_date),
                    None => (now.with_timezone(&Utc), today),
                },
            };

            ledger.mark_fired_on(&def.id, occurrence_date);
            info!(reminder_id = %def.id, ?reason, %occurrence_at, %occurrence_date, "reminder due (poll)");
            fired.push(FireEvent {
                reminder: def.clone(),
                occurrence_at,
                occurrence_date,
                reason,
                source: FireSource::Poll,
            });
        }

        debug!(checked = defs.len(), fired = fired.len(), "poll evaluation done");
        fired
    }
}
