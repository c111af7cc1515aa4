//! `chime-store`: the reminder store, where definitions live and how
//! edits are announced to the scheduling core.

pub mod db;
pub mod error;
pub mod import;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use import::{import_legacy_json, ImportReport};
pub use memory::MemoryReminderStore;
pub use sqlite::SqliteReminderStore;
pub use store::{ChangeListener, ReminderStore, StoreChange};
