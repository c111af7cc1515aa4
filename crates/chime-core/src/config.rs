use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
/// Matching is minute-granular, so the poll gap must stay under a minute.
pub const MAX_POLL_INTERVAL_SECS: u64 = 59;
pub const DEFAULT_SNOOZE_MINUTES: u32 = 5;
pub const DEFAULT_MAX_ARMED_WAKES: usize = 512;

/// Top-level config (chime.toml + CHIME_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChimeConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between poll iterations. Tunable, not correctness-relevant.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Snooze length; clamped to 5..=30 by the scheduler.
    #[serde(default = "default_snooze_minutes")]
    pub snooze_minutes: u32,
    /// When false the engine runs poll-only and never arms wakes.
    #[serde(default = "bool_true")]
    pub wake_enabled: bool,
    /// Quota for the in-process wake facility.
    #[serde(default = "default_max_armed_wakes")]
    pub max_armed_wakes: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            snooze_minutes: DEFAULT_SNOOZE_MINUTES,
            wake_enabled: true,
            max_armed_wakes: DEFAULT_MAX_ARMED_WAKES,
        }
    }
}

impl SchedulerConfig {
    /// Poll interval clamped to `1..=59` seconds.
    pub fn poll_interval(&self) -> Duration {
        let secs = self.poll_interval_secs.clamp(1, MAX_POLL_INTERVAL_SECS);
        if secs != self.poll_interval_secs {
            warn!(
                configured = self.poll_interval_secs,
                used = secs,
                "poll_interval_secs out of range, clamped"
            );
        }
        Duration::from_secs(secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// One-shot import of the legacy `reminders.json` file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Imported at startup only when the database holds no reminders.
    pub reminders_json: Option<String>,
}

fn bool_true() -> bool {
    true
}
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_snooze_minutes() -> u32 {
    DEFAULT_SNOOZE_MINUTES
}
fn default_max_armed_wakes() -> usize {
    DEFAULT_MAX_ARMED_WAKES
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.chime/chime.db", home)
}

impl ChimeConfig {
    /// Load config from a TOML file with CHIME_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.chime/chime.toml
    ///
    /// A missing file is not an error; every field has a default.
    /// Nested keys use a double underscore: `CHIME_SCHEDULER__SNOOZE_MINUTES=10`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::from_figment(
            Figment::new()
                .merge(Toml::file(&path))
                .merge(Env::prefixed("CHIME_").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> crate::error::Result<Self> {
        figment
            .extract()
            .map_err(|e| crate::error::ChimeError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.chime/chime.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_yields_defaults() {
        let cfg = ChimeConfig::from_figment(Figment::from(Toml::string(""))).unwrap();
        assert_eq!(cfg.scheduler.poll_interval_secs, DEFAULT_POLL_INTERVAL_SECS);
        assert_eq!(cfg.scheduler.snooze_minutes, DEFAULT_SNOOZE_MINUTES);
        assert!(cfg.scheduler.wake_enabled);
        assert!(cfg.import.reminders_json.is_none());
        assert!(cfg.database.path.ends_with("chime.db"));
    }

    #[test]
    fn toml_overrides_sections() {
        let toml = r#"
            [scheduler]
            poll_interval_secs = 30
            snooze_minutes = 12
            wake_enabled = false

            [database]
            path = "/tmp/chime-test.db"

            [import]
            reminders_json = "/tmp/reminders.json"
        "#;
        let cfg = ChimeConfig::from_figment(Figment::from(Toml::string(toml))).unwrap();
        assert_eq!(cfg.scheduler.poll_interval(), Duration::from_secs(30));
        assert_eq!(cfg.scheduler.snooze_minutes, 12);
        assert!(!cfg.scheduler.wake_enabled);
        assert_eq!(cfg.database.path, "/tmp/chime-test.db");
        assert_eq!(
            cfg.import.reminders_json.as_deref(),
            Some("/tmp/reminders.json")
        );
    }

    #[test]
    fn poll_interval_is_clamped_below_a_minute() {
        let cfg = SchedulerConfig {
            poll_interval_secs: 300,
            ..SchedulerConfig::default()
        };
        assert_eq!(cfg.poll_interval(), Duration::from_secs(59));
        let cfg = SchedulerConfig {
            poll_interval_secs: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(cfg.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn bad_type_is_config_error() {
        let toml = "[scheduler]\npoll_interval_secs = \"often\"\n";
        let err = ChimeConfig::from_figment(Figment::from(Toml::string(toml))).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
