//! `chime-scheduler`: decides when reminders fire.
//!
//! # Overview
//!
//! Two paths feed one decision point. The [`poll::PollScheduler`] evaluates
//! every reminder on a fixed interval while the process is awake; the
//! [`wake::WakeScheduler`] keeps one precise wake armed per reminder so it
//! still fires when the process would otherwise be idle. Both go through the
//! [`ledger::TriggerLedger`] under the engine's single lock, so each
//! occurrence reaches the [`dispatch::AlarmDispatcher`] at most once.
//!
//! ```text
//! ReminderStore ──► next_occurrence ──► { poll, wake } ──► TriggerLedger ──► AlarmDispatcher
//!                        ▲                                                        │
//!                        └──────────────────── snooze ◄───────────────────────────┘
//! ```
//!
//! # Timing
//!
//! | Path | Resolution                 | Works while suspended |
//! |------|----------------------------|-----------------------|
//! | Poll | configured interval (1-59s) | no                    |
//! | Wake | facility precision          | facility-dependent    |

pub mod clock;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod occurrence;
pub mod poll;
pub mod snooze;
pub mod types;
pub mod wake;

pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatch::{
    resolve_sound, AlarmDispatcher, ChannelDispatcher, DispatchReport, ResolvedSound,
    TracingDispatcher,
};
pub use engine::{EngineOptions, PollOutcome, ReminderEngine};
pub use error::{DispatchError, Result, SchedulerError, WakeFacilityError};
pub use ledger::TriggerLedger;
pub use occurrence::next_occurrence;
pub use poll::PollScheduler;
pub use snooze::{ReminderState, SnoozeDuration, SnoozeWindow};
pub use types::{FireEvent, FireReason, FireSource, StatusEvent};
pub use wake::{
    TokioWakeFacility, WakeDelivery, WakeFacility, WakeHandle, WakeKind, WakePayload,
    WakeScheduler,
};
