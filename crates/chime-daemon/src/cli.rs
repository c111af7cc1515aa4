//! Command-line management of the reminder database.
//!
//! Edits made here while `chimed run` is active reach the running engine on
//! its next poll.

use std::path::PathBuf;

use anyhow::Context;
use chime_core::{DayMask, Priority, ReminderDefinition, ReminderId, SoundRef, TimeOfDay};
use chime_scheduler::next_occurrence;
use chime_store::{import_legacy_json, ReminderStore};
use chrono::Local;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "chimed", version, about = "Recurring reminder daemon")]
pub struct Cli {
    /// Config file (defaults to ~/.chime/chime.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the scheduler until Ctrl-C (default)
    Run,
    /// List reminders with their next occurrence
    List(ListArgs),
    /// Add a reminder
    Add(AddArgs),
    /// Delete a reminder
    Remove { id: String },
    /// Enable a reminder
    Enable { id: String },
    /// Disable a reminder without deleting it
    Disable { id: String },
    /// Import a legacy reminders.json file
    Import { path: PathBuf },
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Print JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Text shown when the reminder fires
    #[arg(long)]
    pub text: String,

    /// "HH:MM" or "h:MM AM/PM"
    #[arg(long)]
    pub time: TimeOfDay,

    /// Days: "daily", "weekdays", "weekends" or a list like "mon,wed,fri"
    #[arg(long, default_value = "daily")]
    pub days: DayMask,

    #[arg(long, default_value = "medium")]
    pub priority: Priority,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub note: Option<String>,

    /// SYSTEM_DEFAULT, VIBRATE_ONLY, or a file path / URI
    #[arg(long)]
    pub sound: Option<String>,

    /// Create the reminder disabled
    #[arg(long)]
    pub disabled: bool,
}

impl AddArgs {
    fn into_definition(self) -> anyhow::Result<ReminderDefinition> {
        let mut def = ReminderDefinition::new(self.text, self.time, self.days)?
            .with_priority(self.priority)
            .with_enabled(!self.disabled);
        if let Some(category) = self.category {
            def = def.with_category(category);
        }
        if let Some(note) = self.note {
            def = def.with_note(note);
        }
        if let Some(sound) = self.sound {
            def = def.with_sound(SoundRef::from(sound));
        }
        Ok(def)
    }
}

pub fn list(store: &dyn ReminderStore, args: &ListArgs) -> anyhow::Result<()> {
    let defs = store.list()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&defs)?);
        return Ok(());
    }
    if defs.is_empty() {
        println!("no reminders");
        return Ok(());
    }

    let now = Local::now();
    for def in &defs {
        let next = if def.enabled {
            next_occurrence(def, &now)
                .map(|t| t.format("%a %Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|e| format!("invalid: {e}"))
        } else {
            "disabled".to_string()
        };
        println!(
            "{}  {}  {:<24}  {:<6}  next: {}  {}",
            def.id,
            def.time,
            def.days.to_string(),
            def.priority.to_string(),
            next,
            def.text
        );
    }
    Ok(())
}

pub fn add(store: &dyn ReminderStore, args: AddArgs) -> anyhow::Result<()> {
    let def = store.create(args.into_definition()?)?;
    println!("{}", def.id);
    Ok(())
}

pub fn remove(store: &dyn ReminderStore, id: &str) -> anyhow::Result<()> {
    store
        .delete(&ReminderId::from(id))
        .with_context(|| format!("failed to remove reminder {id}"))?;
    println!("removed {id}");
    Ok(())
}

pub fn set_enabled(store: &dyn ReminderStore, id: &str, enabled: bool) -> anyhow::Result<()> {
    let def = store
        .set_enabled(&ReminderId::from(id), enabled)
        .with_context(|| format!("failed to update reminder {id}"))?;
    println!("{} {}", if def.enabled { "enabled" } else { "disabled" }, def.id);
    Ok(())
}

pub fn import(store: &dyn ReminderStore, path: &std::path::Path) -> anyhow::Result<()> {
    let report = import_legacy_json(path, store)
        .with_context(|| format!("failed to import {}", path.display()))?;
    println!("imported {}, skipped {}", report.imported, report.skipped);
    Ok(())
}

#[cfg(test)]
mod tests {
    use chime_store::MemoryReminderStore;
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::parse_from(["chimed"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn add_parses_12h_time_and_day_list() {
        let cli = Cli::parse_from([
            "chimed", "add", "--text", "meds", "--time", "8:30 pm", "--days", "mon,wed",
            "--priority", "high", "--sound", "VIBRATE_ONLY",
        ]);
        let Some(Command::Add(args)) = cli.command else {
            panic!("expected add");
        };
        let def = args.into_definition().unwrap();
        assert_eq!(def.time, TimeOfDay::new(20, 30).unwrap());
        assert_eq!(def.days.indices(), vec![0, 2]);
        assert_eq!(def.priority, Priority::High);
        assert_eq!(def.sound, SoundRef::VibrateOnly);
        assert!(def.enabled);
    }

    #[test]
    fn add_rejects_bad_time() {
        let res = Cli::try_parse_from(["chimed", "add", "--text", "x", "--time", "25:00"]);
        assert!(res.is_err());
    }

    #[test]
    fn enable_disable_remove_round_trip() {
        let store = MemoryReminderStore::new();
        let def = store
            .create(
                ReminderDefinition::new("walk", TimeOfDay::new(7, 0).unwrap(), DayMask::EVERY_DAY)
                    .unwrap(),
            )
            .unwrap();
        let id = def.id.to_string();

        set_enabled(&store, &id, false).unwrap();
        assert!(!store.get(&def.id).unwrap().unwrap().enabled);
        set_enabled(&store, &id, true).unwrap();
        assert!(store.get(&def.id).unwrap().unwrap().enabled);

        remove(&store, &id).unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(remove(&store, &id).is_err());
    }
}
