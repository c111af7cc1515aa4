use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chime_core::config::SchedulerConfig;
use chime_core::{ReminderDefinition, ReminderId};
use chime_store::{ChangeListener, ReminderStore, StoreChange, StoreError};
use chrono::{DateTime, Duration as TimeDelta, TimeZone, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::dispatch::AlarmDispatcher;
use crate::error::{Result, SchedulerError};
use crate::ledger::TriggerLedger;
use crate::occurrence::next_occurrence;
use crate::poll::PollScheduler;
use crate::snooze::{ReminderState, SnoozeDuration, SnoozeWindow};
use crate::types::{FireEvent, FireReason, FireSource, StatusEvent};
use crate::wake::{DeliveryVerdict, WakeDelivery, WakeFacility, WakeKind, WakeScheduler};

/// Attempts at reading a store snapshot that no edit raced with.
const SNAPSHOT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub poll_interval: Duration,
    pub snooze: SnoozeDuration,
    /// Arm precise wakes. When false the engine is poll-only.
    pub wake_enabled: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&SchedulerConfig::default())
    }
}

impl From<&SchedulerConfig> for EngineOptions {
    fn from(cfg: &SchedulerConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval(),
            snooze: SnoozeDuration::clamped(cfg.snooze_minutes),
            wake_enabled: cfg.wake_enabled,
        }
    }
}

/// Result of one [`ReminderEngine::poll_tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ran { fired: usize },
    /// The previous evaluation was still running.
    Skipped,
}

/// Everything fire decisions depend on, behind one lock.
#[derive(Default)]
struct CoreState {
    ledger: TriggerLedger,
    wakes: Option<WakeScheduler>,
    /// Bumped on every applied store change.
    revision: u64,
    /// Last definition seen per reminder, to spot edits made by another
    /// process sharing the store.
    seen: HashMap<ReminderId, ReminderDefinition>,
}

impl CoreState {
    /// Compare a full store read with what was last seen. Reminders edited
    /// or removed elsewhere get a manual state reset; new ones are recorded.
    fn observe(&mut self, defs: &[ReminderDefinition]) {
        let live: HashSet<&ReminderId> = defs.iter().map(|d| &d.id).collect();
        let gone: Vec<ReminderId> = self
            .seen
            .keys()
            .filter(|id| !live.contains(id))
            .cloned()
            .collect();
        for id in gone {
            debug!(reminder_id = %id, "reminder removed outside this process, state reset");
            self.seen.remove(&id);
            self.ledger.reset(&id);
        }
        for def in defs {
            self.observe_one(def);
        }
    }

    fn observe_one(&mut self, def: &ReminderDefinition) {
        if let Some(previous) = self.seen.insert(def.id.clone(), def.clone()) {
            if previous != *def {
                info!(reminder_id = %def.id, "reminder changed outside this process, state reset");
                self.ledger.reset(&def.id);
            }
        }
    }
}

/// Drives reminders: poll ticks and wake deliveries in, fire events out.
///
/// Both paths decide under the same lock, so each occurrence reaches the
/// dispatcher at most once. Store reads and dispatch happen outside it.
pub struct ReminderEngine<Tz: TimeZone> {
    store: Arc<dyn ReminderStore>,
    dispatcher: Arc<dyn AlarmDispatcher>,
    clock: Arc<dyn Clock<Tz>>,
    state: Mutex<CoreState>,
    poll: PollScheduler,
    snooze: SnoozeDuration,
    status_tx: broadcast::Sender<StatusEvent>,
}

impl<Tz> ReminderEngine<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    pub fn new(
        store: Arc<dyn ReminderStore>,
        dispatcher: Arc<dyn AlarmDispatcher>,
        clock: Arc<dyn Clock<Tz>>,
        wake: Option<Arc<dyn WakeFacility>>,
        options: EngineOptions,
    ) -> Self {
        let wakes = match wake {
            Some(facility) if options.wake_enabled => Some(WakeScheduler::new(facility)),
            _ => {
                info!("precise wakes disabled, running poll-only");
                None
            }
        };
        let (status_tx, _) = broadcast::channel(64);
        Self {
            store,
            dispatcher,
            clock,
            state: Mutex::new(CoreState {
                wakes,
                ..CoreState::default()
            }),
            poll: PollScheduler::new(options.poll_interval),
            snooze: options.snooze,
            status_tx,
        }
    }

    /// Subscribe to store changes so edits cancel and re-arm immediately.
    ///
    /// The store holds only a weak reference back to the engine.
    pub fn attach(self: &Arc<Self>) {
        self.store.on_change(Arc::new(EngineListener {
            engine: Arc::downgrade(self),
        }));
    }

    /// Arm a wake for every enabled reminder. Call once at startup.
    pub fn prime(&self) -> Result<()> {
        let (defs, mut st) = self.snapshot()?;
        let now = self.clock.now();
        st.observe(&defs);
        let CoreState { ledger, wakes, .. } = &mut *st;
        ledger.rollover_if_new_day(&now);
        let armed = match wakes.as_mut() {
            Some(wakes) => {
                wakes.reconcile(&defs, &now, ledger);
                wakes.armed_count()
            }
            None => 0,
        };
        let status = drain_status(wakes);
        drop(st);

        info!(reminders = defs.len(), armed, "reminder engine primed");
        self.publish(status);
        Ok(())
    }

    /// One poll iteration. Skipped when the previous one is still running.
    ///
    /// Edits made by another process sharing the store show up here as a
    /// changed snapshot and reset that reminder's ledger and snooze state.
    pub async fn poll_tick(&self) -> Result<PollOutcome> {
        let Some(_guard) = self.poll.try_begin() else {
            debug!("poll tick skipped, previous evaluation still running");
            return Ok(PollOutcome::Skipped);
        };

        let (events, status) = {
            let (defs, mut st) = self.snapshot()?;
            let now = self.clock.now();
            st.observe(&defs);
            let CoreState { ledger, wakes, .. } = &mut *st;
            let events = PollScheduler::evaluate(ledger, &defs, &now);
            if let Some(wakes) = wakes.as_mut() {
                // The wake armed for what just fired is now redundant.
                for event in &events {
                    let _ = wakes.rearm(&event.reminder, &now, None);
                }
                wakes.reconcile(&defs, &now, ledger);
            }
            (events, drain_status(wakes))
        };

        self.publish(status);
        for event in &events {
            self.dispatch(event).await;
        }
        Ok(PollOutcome::Ran {
            fired: events.len(),
        })
    }

    /// Handle a delivery from the wake facility. Returns true if it fired.
    ///
    /// Re-arming the successor happens under the lock, before the dispatcher
    /// is called.
    pub async fn on_wake(&self, delivery: WakeDelivery) -> Result<bool> {
        let id = delivery.id().clone();

        let (event, status) = {
            let (stored, mut st) = self.read_one(&id);
            let now = self.clock.now();
            if let Ok(Some(def)) = &stored {
                st.observe_one(def);
            }
            let CoreState { ledger, wakes, seen, .. } = &mut *st;
            let Some(wakes) = wakes.as_mut() else {
                warn!(reminder_id = %id, handle = %delivery.handle, "wake delivered while wakes are disabled, ignored");
                return Ok(false);
            };

            let verdict = wakes.classify(&delivery);
            if verdict == DeliveryVerdict::Stale {
                warn!(reminder_id = %id, handle = %delivery.handle, "stale wake dropped");
                return Ok(false);
            }
            wakes.settle(&delivery);

            let def = match stored {
                Ok(Some(def)) => def,
                Ok(None) => {
                    info!(reminder_id = %id, "wake for deleted reminder dropped");
                    wakes.forget(&id);
                    ledger.reset(&id);
                    seen.remove(&id);
                    return Ok(false);
                }
                Err(e) => {
                    warn!(reminder_id = %id, error = %e, "store unreadable, firing from wake snapshot");
                    delivery.payload.snapshot.clone()
                }
            };
            if !def.enabled {
                debug!(reminder_id = %id, "wake for disabled reminder ignored");
                wakes.cancel(&id);
                return Ok(false);
            }

            ledger.rollover_if_new_day(&now);
            let tz = now.timezone();
            let due_local = delivery.due_at.with_timezone(&tz);
            let (reason, date) = match delivery.payload.kind {
                WakeKind::Occurrence => (FireReason::Scheduled, due_local.date_naive()),
                WakeKind::SnoozeResume { occurrence } => (FireReason::SnoozeResumed, occurrence),
            };
            // An edit made elsewhere may have moved the slot, or reset the
            // snooze, this wake was armed for.
            let still_scheduled = match reason {
                FireReason::Scheduled => {
                    next_occurrence(&def, &(due_local.clone() - TimeDelta::seconds(1)))
                        .is_ok_and(|t| t == due_local)
                }
                FireReason::SnoozeResumed => {
                    verdict == DeliveryVerdict::Unknown || ledger.snooze_for(&id).is_some()
                }
            };

            let event = if !still_scheduled {
                info!(reminder_id = %id, due_at = %delivery.due_at, "wake no longer matches the reminder's schedule, not fired");
                None
            } else if reason == FireReason::Scheduled && ledger.is_fired(&id, date) {
                debug!(reminder_id = %id, %date, ?verdict, "occurrence already fired, wake absorbed");
                None
            } else {
                ledger.mark_fired_on(&id, date);
                ledger.clear_snooze(&id);
                info!(reminder_id = %id, ?reason, ?verdict, due_at = %delivery.due_at, "reminder due (wake)");
                Some(FireEvent {
                    reminder: def.clone(),
                    occurrence_at: delivery.due_at,
                    occurrence_date: date,
                    reason,
                    source: FireSource::Wake,
                })
            };

            // An early delivery must not re-arm the same occurrence.
            let from = if now.with_timezone(&Utc) < delivery.due_at {
                delivery.due_at.with_timezone(&tz)
            } else {
                now
            };
            let _ = wakes.rearm(&def, &from, ledger.snooze_for(&id));
            (event, wakes.drain_status())
        };

        self.publish(status);
        match event {
            Some(event) => {
                self.dispatch(&event).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Snooze `id` for the configured duration.
    pub async fn snooze(&self, id: &ReminderId) -> Result<SnoozeWindow> {
        self.snooze_with(id, self.snooze).await
    }

    /// Snooze `id`, replacing any active snooze, and silence its alarm.
    pub async fn snooze_with(&self, id: &ReminderId, duration: SnoozeDuration) -> Result<SnoozeWindow> {
        let def = self
            .store
            .get(id)?
            .ok_or_else(|| SchedulerError::ReminderNotFound { id: id.to_string() })?;

        let (window, status) = {
            let now = self.clock.now();
            let mut st = self.lock();
            let CoreState { ledger, wakes, .. } = &mut *st;
            let window = ledger.snooze(id, &now, duration);
            if let Some(wakes) = wakes.as_mut() {
                let _ = wakes.rearm(&def, &now, Some(&window));
            }
            (window, drain_status(wakes))
        };

        self.publish(status);
        self.dispatcher.dismiss(id).await;
        Ok(window)
    }

    /// Silence the alarm for `id`. An active snooze is abandoned; the
    /// occurrence stays fired.
    pub async fn dismiss(&self, id: &ReminderId) -> Result<()> {
        let def = self.store.get(id)?;
        let status = {
            let now = self.clock.now();
            let mut st = self.lock();
            let CoreState { ledger, wakes, .. } = &mut *st;
            if ledger.clear_snooze(id).is_some() {
                if let (Some(wakes), Some(def)) = (wakes.as_mut(), def.as_ref()) {
                    let _ = wakes.rearm(def, &now, None);
                }
            }
            drain_status(wakes)
        };

        self.publish(status);
        self.dispatcher.dismiss(id).await;
        info!(reminder_id = %id, "reminder dismissed");
        Ok(())
    }

    /// Apply a committed store change: forget ledger and snooze state for
    /// the reminder, then cancel its wake and re-arm if still enabled.
    ///
    /// Returns `WakeArmFailure` when the new wake could not be armed.
    pub fn apply_change(&self, change: &StoreChange) -> Result<()> {
        let now = self.clock.now();
        let (result, status) = {
            let mut st = self.lock();
            st.revision += 1;
            let CoreState {
                ledger, wakes, seen, ..
            } = &mut *st;
            ledger.reset(change.id());
            match change.definition() {
                Some(def) => {
                    seen.insert(def.id.clone(), def.clone());
                }
                None => {
                    seen.remove(change.id());
                }
            }
            let result = match (wakes.as_mut(), change) {
                (None, _) => Ok(()),
                (Some(wakes), StoreChange::Deleted(id)) => {
                    wakes.forget(id);
                    Ok(())
                }
                (Some(wakes), changed) => match changed.definition() {
                    Some(def) => wakes.rearm(def, &now, None).map(|_| ()),
                    None => Ok(()),
                },
            };
            (result, drain_status(wakes))
        };

        debug!(reminder_id = %change.id(), "store change applied");
        self.publish(status);
        result
    }

    /// Next instant `def` will fire: the snooze resume if snoozed, otherwise
    /// its next occurrence. `None` when disabled.
    pub fn next_fire(&self, def: &ReminderDefinition) -> Option<DateTime<Tz>> {
        if !def.enabled {
            return None;
        }
        let now = self.clock.now();
        let snoozed = self
            .lock()
            .ledger
            .snooze_for(&def.id)
            .filter(|w| w.is_active(&now))
            .map(|w| w.resume_at);
        match snoozed {
            Some(resume_at) => Some(resume_at.with_timezone(&now.timezone())),
            None => next_occurrence(def, &now).ok(),
        }
    }

    pub fn state_of(&self, def: &ReminderDefinition) -> ReminderState {
        let now = self.clock.now();
        self.lock().ledger.state(def, &now)
    }

    /// Instant of the wake currently armed for `id`.
    pub fn armed_at(&self, id: &ReminderId) -> Option<DateTime<Utc>> {
        self.lock()
            .wakes
            .as_ref()
            .and_then(|w| w.armed(id))
            .map(|w| w.due_at)
    }

    /// Reminders that may not fire reliably while the process is suspended.
    pub fn degraded(&self) -> Vec<(ReminderId, String)> {
        self.lock()
            .wakes
            .as_ref()
            .map(|w| w.degraded())
            .unwrap_or_default()
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status_tx.subscribe()
    }

    /// Main loop: poll on the interval, handle wake deliveries as they
    /// arrive, stop when `shutdown` broadcasts `true`.
    pub async fn run(
        self: Arc<Self>,
        mut wake_rx: Option<mpsc::Receiver<WakeDelivery>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            poll_interval_secs = self.poll.interval().as_secs(),
            wakes = wake_rx.is_some(),
            "reminder engine started"
        );
        if let Err(e) = self.prime() {
            error!("reminder engine prime failed: {e}");
        }

        let mut interval = tokio::time::interval(self.poll.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut wakes_open = wake_rx.is_some();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll_tick().await {
                        error!("poll tick error: {e}");
                    }
                }
                delivery = async { wake_rx.as_mut()?.recv().await }, if wakes_open => {
                    match delivery {
                        Some(delivery) => {
                            if let Err(e) = self.on_wake(delivery).await {
                                error!("wake delivery error: {e}");
                            }
                        }
                        None => {
                            warn!("wake channel closed, continuing poll-only");
                            wakes_open = false;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("reminder engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().expect("engine state poisoned")
    }

    /// Store snapshot plus the state lock, with no store change applied
    /// between the read and the lock.
    fn snapshot(&self) -> Result<(Vec<ReminderDefinition>, MutexGuard<'_, CoreState>)> {
        for _ in 0..SNAPSHOT_ATTEMPTS {
            let seen = self.lock().revision;
            let defs = self.store.list()?;
            let st = self.lock();
            if st.revision == seen {
                return Ok((defs, st));
            }
            debug!("store changed during read, retrying");
        }
        let st = self.lock();
        let defs = self.store.list()?;
        Ok((defs, st))
    }

    /// One reminder from the store plus the state lock, with the same
    /// no-intervening-change guarantee as [`snapshot`](Self::snapshot).
    fn read_one(
        &self,
        id: &ReminderId,
    ) -> (
        std::result::Result<Option<ReminderDefinition>, StoreError>,
        MutexGuard<'_, CoreState>,
    ) {
        for _ in 0..SNAPSHOT_ATTEMPTS {
            let seen = self.lock().revision;
            let stored = self.store.get(id);
            let st = self.lock();
            if st.revision == seen {
                return (stored, st);
            }
            debug!(reminder_id = %id, "store changed during read, retrying");
        }
        let st = self.lock();
        let stored = self.store.get(id);
        (stored, st)
    }

    async fn dispatch(&self, event: &FireEvent) {
        match self.dispatcher.dispatch(event).await {
            Ok(report) if report.degraded => {
                warn!(reminder_id = %event.id(), sound = ?report.sound, "alarm presented with fallback sound");
            }
            Ok(_) => {}
            Err(e) => error!(reminder_id = %event.id(), "alarm dispatch failed: {e}"),
        }
    }

    fn publish(&self, status: Vec<StatusEvent>) {
        for event in status {
            // No subscribers is fine.
            let _ = self.status_tx.send(event);
        }
    }
}

fn drain_status(wakes: &mut Option<WakeScheduler>) -> Vec<StatusEvent> {
    wakes
        .as_mut()
        .map(WakeScheduler::drain_status)
        .unwrap_or_default()
}

struct EngineListener<Tz: TimeZone> {
    engine: Weak<ReminderEngine<Tz>>,
}

impl<Tz> ChangeListener for EngineListener<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Send + Sync,
{
    fn on_change(&self, change: &StoreChange) {
        let Some(engine) = self.engine.upgrade() else {
            return;
        };
        if let Err(e) = engine.apply_change(change) {
            warn!(reminder_id = %change.id(), "store change left reminder degraded: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use chime_core::DayMask;
    use chime_store::MemoryReminderStore;
    use chrono::Weekday;

    use super::*;
    use crate::clock::ManualClock;
    use crate::dispatch::TracingDispatcher;

    fn engine_at(
        now: DateTime<Utc>,
        defs: Vec<ReminderDefinition>,
    ) -> (Arc<ReminderEngine<Utc>>, Arc<ManualClock<Utc>>) {
        let store = Arc::new(MemoryReminderStore::with_reminders(defs).unwrap());
        let clock = Arc::new(ManualClock::new(now));
        let engine = Arc::new(ReminderEngine::<Utc>::new(
            store,
            Arc::new(TracingDispatcher::new()),
            clock.clone(),
            None,
            EngineOptions::default(),
        ));
        (engine, clock)
    }

    #[test]
    fn options_follow_config() {
        let cfg = SchedulerConfig {
            poll_interval_secs: 120,
            snooze_minutes: 2,
            wake_enabled: false,
            ..SchedulerConfig::default()
        };
        let opts = EngineOptions::from(&cfg);
        assert_eq!(opts.poll_interval, Duration::from_secs(59));
        assert_eq!(opts.snooze.minutes(), 5);
        assert!(!opts.wake_enabled);
    }

    #[tokio::test]
    async fn poll_only_engine_fires_once() {
        let def = ReminderDefinition::new(
            "stand up",
            "09:00".parse().unwrap(),
            DayMask::from_weekdays([Weekday::Wed]),
        )
        .unwrap();
        let start = Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 1).unwrap();
        let (engine, clock) = engine_at(start, vec![def]);

        engine.prime().unwrap();
        assert_eq!(engine.poll_tick().await.unwrap(), PollOutcome::Ran { fired: 1 });
        clock.advance(chrono::Duration::seconds(10));
        assert_eq!(engine.poll_tick().await.unwrap(), PollOutcome::Ran { fired: 0 });
        assert!(engine.degraded().is_empty());
    }

    #[tokio::test]
    async fn snooze_unknown_reminder_is_not_found() {
        let start = Utc.with_ymd_and_hms(2026, 10, 14, 9, 0, 0).unwrap();
        let (engine, _) = engine_at(start, Vec::new());
        let err = engine.snooze(&"nope".into()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::ReminderNotFound { .. }));
    }
}
