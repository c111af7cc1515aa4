use std::sync::{Arc, RwLock};

use chime_core::{ReminderDefinition, ReminderId};
use tracing::debug;

use crate::error::Result;

/// A committed mutation, delivered to every registered [`ChangeListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Created(ReminderDefinition),
    Updated(ReminderDefinition),
    /// Enabled flag flipped (or re-set) via [`ReminderStore::set_enabled`].
    Toggled(ReminderDefinition),
    Deleted(ReminderId),
}

impl StoreChange {
    pub fn id(&self) -> &ReminderId {
        match self {
            StoreChange::Created(def) | StoreChange::Updated(def) | StoreChange::Toggled(def) => {
                &def.id
            }
            StoreChange::Deleted(id) => id,
        }
    }

    /// The definition after the change, or `None` for deletions.
    pub fn definition(&self) -> Option<&ReminderDefinition> {
        match self {
            StoreChange::Created(def) | StoreChange::Updated(def) | StoreChange::Toggled(def) => {
                Some(def)
            }
            StoreChange::Deleted(_) => None,
        }
    }
}

/// Observer notified synchronously after each committed store mutation.
///
/// Handlers must be cheap and must not call back into the store's
/// mutating methods.
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, change: &StoreChange);
}

/// Source of reminder definitions and sink for user edits.
///
/// The scheduling core only reads snapshots from it; every mutation is
/// announced through [`ReminderStore::on_change`] before the call returns.
pub trait ReminderStore: Send + Sync {
    /// All definitions in stable creation order.
    fn list(&self) -> Result<Vec<ReminderDefinition>>;

    fn get(&self, id: &ReminderId) -> Result<Option<ReminderDefinition>>;

    /// Validate and persist a new definition.
    fn create(&self, def: ReminderDefinition) -> Result<ReminderDefinition>;

    /// Replace an existing definition (matched by id).
    fn update(&self, def: ReminderDefinition) -> Result<ReminderDefinition>;

    fn delete(&self, id: &ReminderId) -> Result<()>;

    fn set_enabled(&self, id: &ReminderId, enabled: bool) -> Result<ReminderDefinition>;

    fn on_change(&self, listener: Arc<dyn ChangeListener>);
}

/// Registry of change listeners shared by the store implementations.
#[derive(Default)]
pub struct Listeners {
    inner: RwLock<Vec<Arc<dyn ChangeListener>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn ChangeListener>) {
        let mut listeners = self.inner.write().expect("listener registry poisoned");
        listeners.push(listener);
        debug!(count = listeners.len(), "store listener registered");
    }

    /// Call every listener in registration order.
    ///
    /// Callers must release their own locks first; listeners may read back.
    pub fn notify(&self, change: &StoreChange) {
        // Snapshot so a listener registering another listener cannot deadlock.
        let listeners: Vec<Arc<dyn ChangeListener>> = self
            .inner
            .read()
            .expect("listener registry poisoned")
            .clone();
        for listener in listeners {
            listener.on_change(change);
        }
    }
}
