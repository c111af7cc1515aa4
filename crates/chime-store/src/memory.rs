use std::sync::{Arc, RwLock};

use chime_core::{ReminderDefinition, ReminderId};
use tracing::info;

use crate::error::{Result, StoreError};
use crate::store::{ChangeListener, Listeners, ReminderStore, StoreChange};

/// Process-local reminder store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryReminderStore {
    reminders: RwLock<Vec<ReminderDefinition>>,
    listeners: Listeners,
}

impl MemoryReminderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with definitions without notifying listeners.
    pub fn with_reminders(defs: Vec<ReminderDefinition>) -> Result<Self> {
        for def in &defs {
            def.validate()?;
        }
        Ok(Self {
            reminders: RwLock::new(defs),
            listeners: Listeners::new(),
        })
    }
}

impl ReminderStore for MemoryReminderStore {
    fn list(&self) -> Result<Vec<ReminderDefinition>> {
        Ok(self.reminders.read().expect("reminder list poisoned").clone())
    }

    fn get(&self, id: &ReminderId) -> Result<Option<ReminderDefinition>> {
        let reminders = self.reminders.read().expect("reminder list poisoned");
        Ok(reminders.iter().find(|d| &d.id == id).cloned())
    }

    fn create(&self, def: ReminderDefinition) -> Result<ReminderDefinition> {
        def.validate()?;
        {
            let mut reminders = self.reminders.write().expect("reminder list poisoned");
            if reminders.iter().any(|d| d.id == def.id) {
                return Err(StoreError::Duplicate {
                    id: def.id.to_string(),
                });
            }
            reminders.push(def.clone());
        }
        info!(id = %def.id, "reminder created");
        self.listeners.notify(&StoreChange::Created(def.clone()));
        Ok(def)
    }

    fn update(&self, def: ReminderDefinition) -> Result<ReminderDefinition> {
        def.validate()?;
        {
            let mut reminders = self.reminders.write().expect("reminder list poisoned");
            let slot = reminders
                .iter_mut()
                .find(|d| d.id == def.id)
                .ok_or_else(|| StoreError::NotFound {
                    id: def.id.to_string(),
                })?;
            *slot = def.clone();
        }
        info!(id = %def.id, "reminder updated");
        self.listeners.notify(&StoreChange::Updated(def.clone()));
        Ok(def)
    }

    fn delete(&self, id: &ReminderId) -> Result<()> {
        {
            let mut reminders = self.reminders.write().expect("reminder list poisoned");
            let before = reminders.len();
            reminders.retain(|d| &d.id != id);
            if reminders.len() == before {
                return Err(StoreError::NotFound { id: id.to_string() });
            }
        }
        info!(id = %id, "reminder deleted");
        self.listeners.notify(&StoreChange::Deleted(id.clone()));
        Ok(())
    }

    fn set_enabled(&self, id: &ReminderId, enabled: bool) -> Result<ReminderDefinition> {
        let def = {
            let mut reminders = self.reminders.write().expect("reminder list poisoned");
            let slot = reminders
                .iter_mut()
                .find(|d| &d.id == id)
                .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
            slot.enabled = enabled;
            slot.clone()
        };
        info!(id = %id, enabled, "reminder toggled");
        self.listeners.notify(&StoreChange::Toggled(def.clone()));
        Ok(def)
    }

    fn on_change(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners.register(listener);
    }
}

#[cfg(test)]
mod tests {
    use chime_core::{DayMask, TimeOfDay};

    use super::*;

    fn sample(text: &str) -> ReminderDefinition {
        ReminderDefinition::new(text, TimeOfDay::new(7, 30).unwrap(), DayMask::EVERY_DAY).unwrap()
    }

    #[test]
    fn crud_cycle() {
        let store = MemoryReminderStore::new();
        let def = store.create(sample("walk")).unwrap();
        assert_eq!(store.list().unwrap().len(), 1);

        let off = store.set_enabled(&def.id, false).unwrap();
        assert!(!off.enabled);
        assert!(!store.get(&def.id).unwrap().unwrap().enabled);

        store.delete(&def.id).unwrap();
        assert!(store.get(&def.id).unwrap().is_none());
        assert!(matches!(
            store.delete(&def.id),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn seeding_validates() {
        let mut bad = sample("x");
        bad.days = DayMask::EMPTY;
        assert!(MemoryReminderStore::with_reminders(vec![bad]).is_err());
    }
}
