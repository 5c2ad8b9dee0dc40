//! Configuration and settings management
//!
//! Loads relay settings from config files and environment variables.

use chrono::Duration;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Default sliding window for flood protection (seconds).
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;
/// Default number of messages allowed inside one window.
pub const RATE_LIMIT_MAX_MESSAGES: usize = 6;
/// Default scheduler tick interval (seconds).
pub const SCHEDULE_TICK_SECS: u64 = 30;
/// Default window for counting a user as active in `/users` (days).
pub const ACTIVE_WINDOW_DAYS: i64 = 30;

/// Relay settings loaded from environment variables and config files.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelaySettings {
    /// Comma-separated list of admin identifiers.
    #[serde(rename = "admin_ids")]
    pub admin_ids_str: Option<String>,

    /// Rate limit window length in seconds.
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    /// Messages allowed per window before throttling.
    #[serde(default = "default_rate_limit_max_messages")]
    pub rate_limit_max_messages: usize,

    /// Scheduler tick interval in seconds.
    #[serde(default = "default_schedule_tick_secs")]
    pub schedule_tick_secs: u64,
    /// Offset (minutes east of UTC) used to read `!schedule` wall-clock times.
    #[serde(default)]
    pub schedule_utc_offset_minutes: i32,

    /// Days of inactivity after which a user no longer counts as active.
    #[serde(default = "default_active_window_days")]
    pub active_window_days: i64,

    /// Users table location.
    #[serde(default = "default_users_path")]
    pub users_path: PathBuf,
    /// Schedule table location.
    #[serde(default = "default_schedule_path")]
    pub schedule_path: PathBuf,
    /// Optional YAML file with FAQ, menu and texts.
    pub content_path: Option<PathBuf>,

    /// Handle shown by `/contact`.
    pub contact_handle: Option<String>,
}

const fn default_rate_limit_window_secs() -> u64 {
    RATE_LIMIT_WINDOW_SECS
}

const fn default_rate_limit_max_messages() -> usize {
    RATE_LIMIT_MAX_MESSAGES
}

const fn default_schedule_tick_secs() -> u64 {
    SCHEDULE_TICK_SECS
}

const fn default_active_window_days() -> i64 {
    ACTIVE_WINDOW_DAYS
}

fn default_users_path() -> PathBuf {
    PathBuf::from("users.json")
}

fn default_schedule_path() -> PathBuf {
    PathBuf::from("schedules.json")
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            admin_ids_str: None,
            rate_limit_window_secs: RATE_LIMIT_WINDOW_SECS,
            rate_limit_max_messages: RATE_LIMIT_MAX_MESSAGES,
            schedule_tick_secs: SCHEDULE_TICK_SECS,
            schedule_utc_offset_minutes: 0,
            active_window_days: ACTIVE_WINDOW_DAYS,
            users_path: default_users_path(),
            schedule_path: default_schedule_path(),
            content_path: None,
            contact_handle: None,
        }
    }
}

/// Build the layered configuration source shared by every settings struct.
///
/// Order: `config/default`, `config/{RUN_MODE}`, `config/local`, `APP__*`
/// variables, then plain environment variables (empty values ignored).
///
/// # Errors
///
/// Returns a `ConfigError` if a present file cannot be parsed.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Not checked into git
        .add_source(File::with_name("config/local").required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl RelaySettings {
    /// Create new settings by loading from environment and files.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        build_config()?.try_deserialize()
    }

    /// Returns the set of admin identifiers.
    #[must_use]
    pub fn admin_ids(&self) -> HashSet<String> {
        self.admin_ids_str
            .as_ref()
            .map(|s| {
                s.split(|c: char| c == ',' || c == ';' || c.is_whitespace())
                    .filter(|token| !token.is_empty())
                    .filter(|id| id.parse::<i64>().is_ok())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rate limit window as a duration.
    #[must_use]
    pub fn rate_limit_window(&self) -> Duration {
        i64::try_from(self.rate_limit_window_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    /// Active-user window as a duration.
    #[must_use]
    pub fn active_window(&self) -> Duration {
        Duration::try_days(self.active_window_days).unwrap_or(Duration::MAX)
    }

    /// Scheduler tick interval.
    #[must_use]
    pub const fn schedule_tick(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.schedule_tick_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::RelaySettings;

    #[test]
    fn test_admin_list_parsing() {
        let mut settings = RelaySettings::default();

        settings.admin_ids_str = Some("123,456".to_string());
        let admins = settings.admin_ids();
        assert!(admins.contains("123"));
        assert!(admins.contains("456"));
        assert_eq!(admins.len(), 2);

        // Semicolon, whitespace and junk
        settings.admin_ids_str = Some("333; 444 abc, 555".to_string());
        let admins = settings.admin_ids();
        assert!(admins.contains("333"));
        assert!(admins.contains("444"));
        assert!(admins.contains("555"));
        assert_eq!(admins.len(), 3);

        settings.admin_ids_str = None;
        assert!(settings.admin_ids().is_empty());
    }

    #[test]
    fn test_defaults() {
        let settings = RelaySettings::default();
        assert_eq!(settings.rate_limit_window().num_seconds(), 60);
        assert_eq!(settings.rate_limit_max_messages, 6);
        assert_eq!(settings.active_window().num_days(), 30);
        assert_eq!(settings.schedule_tick().as_secs(), 30);
    }
}
