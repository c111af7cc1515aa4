//! `chime-core`: domain types, errors and configuration shared by every
//! chime crate.

pub mod config;
pub mod error;
pub mod reminder;
pub mod types;

pub use config::ChimeConfig;
pub use error::{ChimeError, Result};
pub use reminder::ReminderDefinition;
pub use types::{DayMask, Meridiem, Priority, ReminderId, SoundRef, TimeOfDay};
