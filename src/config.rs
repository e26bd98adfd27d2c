//! Daemon configuration.
//!
//! Read from `belltower.json` in the data directory (or the file named by
//! `BELLTOWER_CONFIG`). Missing fields take their defaults, and
//! `BELLTOWER_DB_PATH` / `BELLTOWER_SOUNDS_DIR` override the file.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::playback::PlaybackConfig;
use crate::scheduler::Zone;
use crate::utils::app_data_dir;

pub const CONFIG_FILE_NAME: &str = "belltower.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    /// Where sound files live; `file_name` columns resolve against it.
    pub sounds_dir: PathBuf,
    /// Bundled sounds copied into `sounds_dir` on first start.
    pub built_in_sounds_dir: Option<PathBuf>,
    /// IANA zone name. Unset means the system zone.
    pub timezone: Option<String>,
    pub exact_timers: bool,
    pub inexact_window_secs: u64,
    /// A firing this much later than its slot is logged as missed.
    pub missed_after_secs: u64,
    pub tick_interval_ms: u64,
    pub wake_lock_hours: i64,
    pub upcoming_horizon_minutes: i64,
    pub upcoming_limit: usize,
    /// Re-arm the next bell when the daemon starts.
    pub resume_on_start: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = app_data_dir();
        Self {
            database_url: format!("sqlite:{}", data_dir.join("belltower.db").display()),
            sounds_dir: data_dir.join("sounds"),
            built_in_sounds_dir: Some(PathBuf::from("alarms")),
            timezone: None,
            exact_timers: true,
            inexact_window_secs: 60,
            missed_after_secs: 5,
            tick_interval_ms: 1000,
            wake_lock_hours: 8,
            upcoming_horizon_minutes: 180,
            upcoming_limit: 10,
            resume_on_start: true,
        }
    }
}

impl Config {
    /// Loads the config file if present, then applies environment overrides.
    pub fn load() -> AppResult<Self> {
        let path = env::var("BELLTOWER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| app_data_dir().join(CONFIG_FILE_NAME));

        let mut config = if path.exists() {
            info!("Loading configuration from {:?}", path);
            Self::from_file(&path)?
        } else {
            debug!("No configuration file at {:?}; using defaults", path);
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| AppError::config(format!("invalid {}: {}", CONFIG_FILE_NAME, e)))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(db_path) = env::var("BELLTOWER_DB_PATH") {
            self.database_url = format!("sqlite:{}", db_path);
        }
        if let Ok(dir) = env::var("BELLTOWER_SOUNDS_DIR") {
            self.sounds_dir = PathBuf::from(dir);
        }
    }

    pub fn zone(&self) -> AppResult<Zone> {
        Zone::parse(self.timezone.as_deref())
    }

    pub fn inexact_window(&self) -> Duration {
        Duration::from_secs(self.inexact_window_secs)
    }

    /// Lateness allowed before a firing counts as missed. Inexact timers
    /// may legitimately fire up to one window late.
    pub fn missed_after(&self) -> Duration {
        Duration::from_secs(self.missed_after_secs) + self.inexact_window()
    }

    pub fn playback(&self) -> PlaybackConfig {
        PlaybackConfig {
            tick: Duration::from_millis(self.tick_interval_ms),
            wake_lock_ceiling: chrono::Duration::hours(self.wake_lock_hours),
        }
    }

    pub fn upcoming_horizon(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.upcoming_horizon_minutes)
    }
}

/// Rejects settings the daemon cannot run with.
pub fn validate_config(config: &Config) -> AppResult<()> {
    if config.database_url.trim().is_empty() {
        return Err(AppError::config("database_url must not be empty"));
    }
    if config.sounds_dir.as_os_str().is_empty() {
        return Err(AppError::config("sounds_dir must not be empty"));
    }
    if config.tick_interval_ms == 0 {
        return Err(AppError::config("tick_interval_ms must be positive"));
    }
    if config.wake_lock_hours <= 0 {
        return Err(AppError::config("wake_lock_hours must be positive"));
    }
    if config.upcoming_horizon_minutes <= 0 || config.upcoming_limit == 0 {
        return Err(AppError::config("upcoming horizon and limit must be positive"));
    }
    config.zone()?;

    info!("Configuration validated");
    Ok(())
}
