use std::sync::{Arc, Mutex};

use chime_core::{ChimeError, DayMask, ReminderDefinition, ReminderId};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use tracing::{info, instrument, warn};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::store::{ChangeListener, Listeners, ReminderStore, StoreChange};

const SELECT_COLUMNS: &str = "SELECT id, text, time, days, enabled, priority, category, note, sound
     FROM reminders";

/// SQLite-backed reminder store.
///
/// Wraps a single connection in a `Mutex`; listeners are notified after the
/// lock is released so they can read back through the store.
pub struct SqliteReminderStore {
    db: Mutex<Connection>,
    listeners: Listeners,
}

impl SqliteReminderStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            listeners: Listeners::new(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    pub fn count(&self) -> Result<usize> {
        let db = self.db.lock().expect("reminder db poisoned");
        let n: i64 = db.query_row("SELECT COUNT(*) FROM reminders", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl ReminderStore for SqliteReminderStore {
    #[instrument(skip(self))]
    fn list(&self) -> Result<Vec<ReminderDefinition>> {
        let db = self.db.lock().expect("reminder db poisoned");
        let mut stmt = db.prepare(&format!("{SELECT_COLUMNS} ORDER BY created_at, id"))?;
        let defs = stmt
            .query_map([], row_to_raw)?
            .filter_map(|r| match r.map_err(StoreError::from).and_then(RawRow::into_definition) {
                Ok(def) => Some(def),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable reminder row");
                    None
                }
            })
            .collect();
        Ok(defs)
    }

    #[instrument(skip(self), fields(id = %id))]
    fn get(&self, id: &ReminderId) -> Result<Option<ReminderDefinition>> {
        let db = self.db.lock().expect("reminder db poisoned");
        let raw = db
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                [id.as_str()],
                row_to_raw,
            )
            .optional()?;
        raw.map(RawRow::into_definition).transpose()
    }

    #[instrument(skip(self, def), fields(id = %def.id))]
    fn create(&self, def: ReminderDefinition) -> Result<ReminderDefinition> {
        def.validate()?;
        let now = chrono::Utc::now().to_rfc3339();
        let days = serde_json::to_string(&def.days)?;
        {
            let db = self.db.lock().expect("reminder db poisoned");
            let inserted = db.execute(
                "INSERT INTO reminders
                 (id, text, time, days, enabled, priority, category, note, sound,
                  created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
                rusqlite::params![
                    def.id.as_str(),
                    def.text,
                    def.time.to_string(),
                    days,
                    def.enabled,
                    def.priority.to_string(),
                    def.category,
                    def.note,
                    String::from(def.sound.clone()),
                    now,
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    return Err(StoreError::Duplicate {
                        id: def.id.to_string(),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!(text = %def.text, time = %def.time, days = %def.days, "reminder created");
        self.listeners.notify(&StoreChange::Created(def.clone()));
        Ok(def)
    }

    #[instrument(skip(self, def), fields(id = %def.id))]
    fn update(&self, def: ReminderDefinition) -> Result<ReminderDefinition> {
        def.validate()?;
        let now = chrono::Utc::now().to_rfc3339();
        let days = serde_json::to_string(&def.days)?;
        let rows_changed = {
            let db = self.db.lock().expect("reminder db poisoned");
            db.execute(
                "UPDATE reminders
                 SET text = ?1, time = ?2, days = ?3, enabled = ?4, priority = ?5,
                     category = ?6, note = ?7, sound = ?8, updated_at = ?9
                 WHERE id = ?10",
                rusqlite::params![
                    def.text,
                    def.time.to_string(),
                    days,
                    def.enabled,
                    def.priority.to_string(),
                    def.category,
                    def.note,
                    String::from(def.sound.clone()),
                    now,
                    def.id.as_str(),
                ],
            )?
        };
        if rows_changed == 0 {
            return Err(StoreError::NotFound {
                id: def.id.to_string(),
            });
        }
        info!("reminder updated");
        self.listeners.notify(&StoreChange::Updated(def.clone()));
        Ok(def)
    }

    #[instrument(skip(self), fields(id = %id))]
    fn delete(&self, id: &ReminderId) -> Result<()> {
        let rows_changed = {
            let db = self.db.lock().expect("reminder db poisoned");
            db.execute("DELETE FROM reminders WHERE id = ?1", [id.as_str()])?
        };
        if rows_changed == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        info!("reminder deleted");
        self.listeners.notify(&StoreChange::Deleted(id.clone()));
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id, enabled))]
    fn set_enabled(&self, id: &ReminderId, enabled: bool) -> Result<ReminderDefinition> {
        let now = chrono::Utc::now().to_rfc3339();
        let rows_changed = {
            let db = self.db.lock().expect("reminder db poisoned");
            db.execute(
                "UPDATE reminders SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![enabled, now, id.as_str()],
            )?
        };
        if rows_changed == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        let def = self
            .get(id)?
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        info!("reminder toggled");
        self.listeners.notify(&StoreChange::Toggled(def.clone()));
        Ok(def)
    }

    fn on_change(&self, listener: Arc<dyn ChangeListener>) {
        self.listeners.register(listener);
    }
}

/// Column values as stored, before domain parsing.
struct RawRow {
    id: String,
    text: String,
    time: String,
    days: String,
    enabled: bool,
    priority: String,
    category: String,
    note: Option<String>,
    sound: String,
}

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        text: row.get(1)?,
        time: row.get(2)?,
        days: row.get(3)?,
        enabled: row.get(4)?,
        priority: row.get(5)?,
        category: row.get(6)?,
        note: row.get(7)?,
        sound: row.get(8)?,
    })
}

impl RawRow {
    fn into_definition(self) -> Result<ReminderDefinition> {
        let indices: Vec<u8> = serde_json::from_str(&self.days)?;
        let def = ReminderDefinition {
            id: ReminderId(self.id),
            text: self.text,
            time: self.time.parse()?,
            days: DayMask::from_indices(&indices)?,
            enabled: self.enabled,
            priority: self.priority.parse()?,
            category: self.category,
            note: self.note,
            sound: self.sound.into(),
        };
        if def.days.is_empty() {
            return Err(StoreError::Invalid(ChimeError::InvalidDefinition(format!(
                "stored reminder {} has no active day",
                def.id
            ))));
        }
        Ok(def)
    }
}
