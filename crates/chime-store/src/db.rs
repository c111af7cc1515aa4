use rusqlite::Connection;

use crate::error::Result;

/// Initialise the reminders table and its index.
///
/// Safe to call on every startup; uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS reminders (
            id          TEXT    NOT NULL PRIMARY KEY,
            text        TEXT    NOT NULL,
            time        TEXT    NOT NULL,   -- HH:MM, local wall clock
            days        TEXT    NOT NULL,   -- JSON array of weekday indices, 0 = Monday
            enabled     INTEGER NOT NULL DEFAULT 1,
            priority    TEXT    NOT NULL DEFAULT 'medium',
            category    TEXT    NOT NULL DEFAULT 'Reminder',
            note        TEXT,
            sound       TEXT    NOT NULL DEFAULT 'SYSTEM_DEFAULT',
            created_at  TEXT    NOT NULL,
            updated_at  TEXT    NOT NULL
        ) STRICT;
        CREATE INDEX IF NOT EXISTS idx_reminders_enabled
            ON reminders (enabled);",
    )?;
    Ok(())
}
