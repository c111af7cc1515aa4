//! Precise one-shot wakes: the path that still fires while the process would
//! otherwise be idle or suspended.
//!
//! Every fire arms its own successor. [`WakeScheduler`] owns the armed-wake
//! bookkeeping and talks to a [`WakeFacility`]; [`TokioWakeFacility`] is the
//! in-process implementation used by the daemon.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chime_core::{ReminderDefinition, ReminderId};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, SchedulerError, WakeFacilityError};
use crate::ledger::TriggerLedger;
use crate::occurrence::next_occurrence;
use crate::snooze::SnoozeWindow;
use crate::types::StatusEvent;

/// How long a degraded reminder waits before reconciliation tries to arm it again.
pub const DEGRADED_RETRY_MINUTES: i64 = 5;

/// How long past its due instant a tombstoned handle is kept waiting for its
/// delivery before reconciliation drops it.
pub const TOMBSTONE_GRACE_MINUTES: i64 = 60;

/// Opaque token identifying one armed wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WakeHandle(pub u64);

impl fmt::Display for WakeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wake-{}", self.0)
    }
}

/// What an armed wake stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeKind {
    /// The next regular occurrence.
    Occurrence,
    /// The end of a snooze window on the occurrence dated `occurrence`.
    SnoozeResume { occurrence: NaiveDate },
}

/// Carried by the facility and handed back on delivery.
///
/// The snapshot lets a revived process fire before it has reloaded the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakePayload {
    pub kind: WakeKind,
    pub snapshot: ReminderDefinition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WakeDelivery {
    pub handle: WakeHandle,
    pub due_at: DateTime<Utc>,
    pub payload: WakePayload,
}

impl WakeDelivery {
    pub fn id(&self) -> &ReminderId {
        &self.payload.snapshot.id
    }
}

/// External exact-wake facility.
///
/// Deliveries arrive at or after `due_at`, possibly on another task and
/// possibly in a process that never armed them.
pub trait WakeFacility: Send + Sync {
    fn arm(
        &self,
        due_at: DateTime<Utc>,
        payload: WakePayload,
    ) -> std::result::Result<WakeHandle, WakeFacilityError>;

    /// Returns false when the wake is unknown or delivery has already begun.
    fn cancel(&self, handle: WakeHandle) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedWake {
    pub handle: WakeHandle,
    pub due_at: DateTime<Utc>,
    pub kind: WakeKind,
    pub snapshot: ReminderDefinition,
}

#[derive(Debug, Clone)]
struct Degraded {
    snapshot: ReminderDefinition,
    reason: String,
    last_attempt: DateTime<Utc>,
}

/// How a delivery relates to what this process armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryVerdict {
    /// The wake currently armed for the reminder.
    Current,
    /// Never armed by this process (e.g. armed before a restart). Authoritative.
    Unknown,
    /// Cancelled after delivery began. Must not fire.
    Stale,
}

/// Armed-wake bookkeeping for every reminder.
///
/// Lives behind the engine's lock next to the ledger, so cancel-and-rearm for
/// one id is atomic with respect to fire decisions.
pub struct WakeScheduler {
    facility: Arc<dyn WakeFacility>,
    armed: HashMap<ReminderId, ArmedWake>,
    /// Handles cancelled too late, with their due instant; their deliveries
    /// are dropped once.
    retired: HashMap<WakeHandle, DateTime<Utc>>,
    degraded: HashMap<ReminderId, Degraded>,
    transitions: Vec<StatusEvent>,
}

impl WakeScheduler {
    pub fn new(facility: Arc<dyn WakeFacility>) -> Self {
        Self {
            facility,
            armed: HashMap::new(),
            retired: HashMap::new(),
            degraded: HashMap::new(),
            transitions: Vec::new(),
        }
    }

    /// Cancel whatever is armed for `def` and arm its next wake.
    ///
    /// With an active snooze the wake targets `resume_at`; otherwise the next
    /// occurrence strictly after `now`. A disabled reminder is left unarmed.
    /// Returns the armed instant. On facility failure the reminder is marked
    /// degraded and `WakeArmFailure` is returned.
    pub fn rearm<Tz: TimeZone>(
        &mut self,
        def: &ReminderDefinition,
        now: &DateTime<Tz>,
        snooze: Option<&SnoozeWindow>,
    ) -> Result<Option<DateTime<Utc>>> {
        self.cancel(&def.id);

        if !def.enabled {
            self.clear_degraded(&def.id);
            return Ok(None);
        }

        let (kind, due_at) = match snooze {
            Some(window) => (
                WakeKind::SnoozeResume {
                    occurrence: window.occurrence_date,
                },
                window.resume_at,
            ),
            None => (
                WakeKind::Occurrence,
                next_occurrence(def, now)?.with_timezone(&Utc),
            ),
        };

        let payload = WakePayload {
            kind,
            snapshot: def.clone(),
        };
        match self.facility.arm(due_at, payload) {
            Ok(handle) => {
                debug!(reminder_id = %def.id, %handle, %due_at, ?kind, "wake armed");
                self.armed.insert(
                    def.id.clone(),
                    ArmedWake {
                        handle,
                        due_at,
                        kind,
                        snapshot: def.clone(),
                    },
                );
                self.clear_degraded(&def.id);
                Ok(Some(due_at))
            }
            Err(e) => {
                let reason = e.to_string();
                let entry = Degraded {
                    snapshot: def.clone(),
                    reason: reason.clone(),
                    last_attempt: now.with_timezone(&Utc),
                };
                if self.degraded.insert(def.id.clone(), entry).is_none() {
                    warn!(reminder_id = %def.id, %reason, "wake arm failed, reminder may not fire reliably");
                    self.transitions.push(StatusEvent::Degraded {
                        id: def.id.clone(),
                        reason: reason.clone(),
                    });
                } else {
                    debug!(reminder_id = %def.id, %reason, "wake arm still failing");
                }
                Err(SchedulerError::WakeArmFailure {
                    id: def.id.to_string(),
                    reason,
                })
            }
        }
    }

    /// Cancel the armed wake for `id`. Returns true if one was armed.
    ///
    /// If the facility has already started delivering it, the handle is
    /// tombstoned so the delivery is recognised as stale.
    pub fn cancel(&mut self, id: &ReminderId) -> bool {
        let Some(wake) = self.armed.remove(id) else {
            return false;
        };
        if !self.facility.cancel(wake.handle) {
            debug!(reminder_id = %id, handle = %wake.handle, "wake already in flight, tombstoned");
            self.retired.insert(wake.handle, wake.due_at);
        }
        true
    }

    /// Drop every trace of `id` (deleted reminder).
    pub fn forget(&mut self, id: &ReminderId) {
        self.cancel(id);
        self.clear_degraded(id);
    }

    /// Classify a delivery. A stale handle's tombstone is consumed.
    pub fn classify(&mut self, delivery: &WakeDelivery) -> DeliveryVerdict {
        if self.retired.remove(&delivery.handle).is_some() {
            return DeliveryVerdict::Stale;
        }
        match self.armed.get(delivery.id()) {
            Some(wake) if wake.handle == delivery.handle => DeliveryVerdict::Current,
            _ => DeliveryVerdict::Unknown,
        }
    }

    /// Forget a delivered wake without asking the facility to cancel it.
    pub fn settle(&mut self, delivery: &WakeDelivery) {
        if self
            .armed
            .get(delivery.id())
            .is_some_and(|w| w.handle == delivery.handle)
        {
            self.armed.remove(delivery.id());
        }
    }

    /// Bring armed wakes in line with a fresh store snapshot.
    ///
    /// Cancels wakes of reminders that were deleted or disabled, and arms
    /// reminders that are unarmed or whose snapshot changed. Degraded
    /// reminders are retried every few minutes. Tombstones whose delivery
    /// never showed up are dropped. Arm failures are recorded, not returned.
    pub fn reconcile<Tz: TimeZone>(
        &mut self,
        defs: &[ReminderDefinition],
        now: &DateTime<Tz>,
        ledger: &TriggerLedger,
    ) {
        let live: HashSet<&ReminderId> = defs.iter().map(|d| &d.id).collect();
        let gone: Vec<ReminderId> = self
            .armed
            .keys()
            .chain(self.degraded.keys())
            .filter(|id| !live.contains(id))
            .cloned()
            .collect();
        for id in gone {
            info!(reminder_id = %id, "reminder gone from store, wake dropped");
            self.forget(&id);
        }

        let now_utc = now.with_timezone(&Utc);
        let grace = Duration::minutes(TOMBSTONE_GRACE_MINUTES);
        self.retired.retain(|handle, due_at| {
            let waiting = now_utc - *due_at < grace;
            if !waiting {
                debug!(%handle, "tombstone expired without a delivery");
            }
            waiting
        });

        for def in defs {
            if !def.enabled {
                if self.armed.contains_key(&def.id) || self.degraded.contains_key(&def.id) {
                    self.cancel(&def.id);
                    self.clear_degraded(&def.id);
                }
                continue;
            }

            let needs_arm = match (self.armed.get(&def.id), self.degraded.get(&def.id)) {
                (Some(wake), _) => wake.snapshot != *def,
                (None, Some(d)) => {
                    d.snapshot != *def
                        || now_utc - d.last_attempt >= Duration::minutes(DEGRADED_RETRY_MINUTES)
                }
                (None, None) => true,
            };
            if needs_arm {
                // Failure is already recorded as degraded.
                let _ = self.rearm(def, now, ledger.snooze_for(&def.id));
            }
        }
    }

    pub fn armed(&self, id: &ReminderId) -> Option<&ArmedWake> {
        self.armed.get(id)
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Reminders that may not fire reliably, with the reason.
    pub fn degraded(&self) -> Vec<(ReminderId, String)> {
        let mut out: Vec<_> = self
            .degraded
            .iter()
            .map(|(id, d)| (id.clone(), d.reason.clone()))
            .collect();
        out.sort();
        out
    }

    pub fn tombstone_count(&self) -> usize {
        self.retired.len()
    }

    pub fn is_degraded(&self, id: &ReminderId) -> bool {
        self.degraded.contains_key(id)
    }

    /// Status transitions since the last call.
    pub fn drain_status(&mut self) -> Vec<StatusEvent> {
        std::mem::take(&mut self.transitions)
    }

    fn clear_degraded(&mut self, id: &ReminderId) {
        if self.degraded.remove(id).is_some() {
            info!(reminder_id = %id, "reminder no longer degraded");
            self.transitions
                .push(StatusEvent::Recovered { id: id.clone() });
        }
    }
}

/// In-process wake facility: one tokio task per armed wake.
///
/// Deliveries go out on the channel returned by [`new`](Self::new). Timers
/// are monotonic, so time spent with the host suspended does not count;
/// the poll path catches up on resume.
pub struct TokioWakeFacility {
    pending: Arc<DashMap<WakeHandle, Option<AbortHandle>>>,
    next_handle: AtomicU64,
    tx: mpsc::Sender<WakeDelivery>,
    max_armed: usize,
}

impl TokioWakeFacility {
    pub const CHANNEL_CAPACITY: usize = 256;

    pub fn new(max_armed: usize) -> (Self, mpsc::Receiver<WakeDelivery>) {
        let (tx, rx) = mpsc::channel(Self::CHANNEL_CAPACITY);
        let facility = Self {
            pending: Arc::new(DashMap::new()),
            next_handle: AtomicU64::new(0),
            tx,
            max_armed,
        };
        (facility, rx)
    }

    /// Wakes armed and not yet delivered or cancelled.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl WakeFacility for TokioWakeFacility {
    fn arm(
        &self,
        due_at: DateTime<Utc>,
        payload: WakePayload,
    ) -> std::result::Result<WakeHandle, WakeFacilityError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WakeFacilityError::Unavailable(e.to_string()))?;
        if self.pending.len() >= self.max_armed {
            return Err(WakeFacilityError::QuotaExceeded {
                limit: self.max_armed,
            });
        }

        let handle = WakeHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.pending.insert(handle, None);

        let delay = (due_at - Utc::now()).to_std().unwrap_or_default();
        let pending = Arc::clone(&self.pending);
        let tx = self.tx.clone();
        let delivery = WakeDelivery {
            handle,
            due_at,
            payload,
        };
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            // Whoever removes the entry first wins: this task or cancel().
            if pending.remove(&handle).is_some() && tx.send(delivery).await.is_err() {
                debug!(%handle, "wake receiver closed, delivery dropped");
            }
        });

        if let Some(mut slot) = self.pending.get_mut(&handle) {
            *slot = Some(task.abort_handle());
        }
        Ok(handle)
    }

    fn cancel(&self, handle: WakeHandle) -> bool {
        match self.pending.remove(&handle) {
            Some((_, abort)) => {
                if let Some(abort) = abort {
                    abort.abort();
                }
                true
            }
            None => false,
        }
    }
}
