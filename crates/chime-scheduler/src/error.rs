use chime_store::StoreError;
use thiserror::Error;

/// Errors that can occur within the scheduling core.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The definition cannot produce an occurrence (e.g. empty day set).
    #[error("Invalid reminder definition: {0}")]
    InvalidDefinition(String),

    /// The external wake facility refused the arm request. The reminder is
    /// degraded: only the poll path covers it until a later arm succeeds.
    #[error("Wake arm failed for reminder {id}: {reason}")]
    WakeArmFailure { id: String, reason: String },

    /// No reminder with the given ID exists in the store.
    #[error("Reminder not found: {id}")]
    ReminderNotFound { id: String },

    /// Underlying reminder store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors returned by a [`WakeFacility`](crate::wake::WakeFacility).
#[derive(Debug, Error)]
pub enum WakeFacilityError {
    /// The facility cannot accept wakes right now (no runtime, permission revoked).
    #[error("wake facility unavailable: {0}")]
    Unavailable(String),

    /// Too many wakes are armed at once.
    #[error("wake quota exceeded (max {limit})")]
    QuotaExceeded { limit: usize },
}

/// Errors surfaced by an [`AlarmDispatcher`](crate::dispatch::AlarmDispatcher).
///
/// A dispatch error never rolls back the ledger: the occurrence still counts
/// as fired.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("delivery channel full")]
    ChannelFull,

    #[error("delivery channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
