// file: src/database/mod.rs

use anyhow::{Context, Result};
use log::info;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePool, Sqlite};
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::error::AppResult;
use crate::models::{NewRingLog, NewSchedule, PlaybackInfo, RingLogEntry, Schedule, Sound, StatusSnapshot};

// Declare submodules
pub mod ring_log;
pub mod schedules;
pub mod sounds;
pub mod status;

/// Schedule store handle. Constructed once and passed to every consumer.
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn open(db_url: &str) -> Result<Self> {
        // Create database if it doesn't exist
        let db_exists = Sqlite::database_exists(db_url)
            .await
            .context("Failed to check if database exists")?;
        if !db_exists {
            info!("Creating database at {}", db_url);
            Sqlite::create_database(db_url)
                .await
                .context("Failed to create database")?;
        }

        let pool = SqlitePool::connect(db_url)
            .await
            .context("Failed to connect to database")?;

        run_schema(&pool).await.context("Failed to run database schema")?;

        info!("Database initialized successfully");

        Ok(Database { pool })
    }

    // --- Schedule Delegates ---

    pub async fn list_schedules(&self) -> AppResult<Vec<Schedule>> {
        schedules::list(&self.pool).await
    }

    pub async fn list_enabled_schedules(&self) -> AppResult<Vec<Schedule>> {
        schedules::list_enabled(&self.pool).await
    }

    pub async fn get_schedule(&self, id: i64) -> AppResult<Option<Schedule>> {
        schedules::get(&self.pool, id).await
    }

    pub async fn insert_schedule(&self, schedule: &NewSchedule) -> AppResult<i64> {
        schedules::insert(&self.pool, schedule).await
    }

    pub async fn update_schedule(&self, id: i64, schedule: &NewSchedule) -> AppResult<bool> {
        schedules::update(&self.pool, id, schedule).await
    }

    pub async fn set_schedule_enabled(&self, id: i64, enabled: bool) -> AppResult<bool> {
        schedules::set_enabled(&self.pool, id, enabled).await
    }

    pub async fn delete_schedule(&self, id: i64) -> AppResult<bool> {
        schedules::delete(&self.pool, id).await
    }

    // --- Sound Delegates ---

    pub async fn list_sounds(&self) -> AppResult<Vec<Sound>> {
        sounds::list(&self.pool).await
    }

    pub async fn insert_sound(
        &self,
        name: &str,
        file_name: &str,
        volume_percent: i64,
        built_in: bool,
    ) -> AppResult<i64> {
        sounds::insert(&self.pool, name, file_name, volume_percent, built_in).await
    }

    pub async fn add_user_sound(
        &self,
        source: &Path,
        name_override: Option<&str>,
        volume_percent: i64,
        sounds_dir: &Path,
    ) -> AppResult<i64> {
        sounds::add_user_sound(&self.pool, source, name_override, volume_percent, sounds_dir).await
    }

    pub async fn update_sound(&self, id: i64, name: &str, volume_percent: i64) -> AppResult<bool> {
        sounds::update(&self.pool, id, name, volume_percent).await
    }

    pub async fn remove_user_sound(&self, id: i64, sounds_dir: &Path) -> AppResult<bool> {
        sounds::remove_user_sound(&self.pool, id, sounds_dir).await
    }

    pub async fn seed_built_in_sounds(&self, source_dir: &Path, sounds_dir: &Path) -> AppResult<usize> {
        sounds::seed_built_ins(&self.pool, source_dir, sounds_dir).await
    }

    pub async fn sound_name(&self, sound_id: i64) -> AppResult<String> {
        sounds::name_of(&self.pool, sound_id).await
    }

    pub async fn sound_playback_info(
        &self,
        schedule_id: i64,
        sounds_dir: &Path,
    ) -> AppResult<Option<PlaybackInfo>> {
        sounds::playback_info(&self.pool, schedule_id, sounds_dir).await
    }

    // --- Ring History Delegates ---

    pub async fn insert_ring_log(&self, entry: &NewRingLog) -> AppResult<i64> {
        ring_log::insert(&self.pool, entry).await
    }

    pub async fn list_ring_logs(&self, limit: u32) -> AppResult<Vec<RingLogEntry>> {
        ring_log::list_recent(&self.pool, limit).await
    }

    pub async fn add_skip(&self, schedule_id: i64, run_at: DateTime<Utc>) -> AppResult<()> {
        ring_log::add_skip(&self.pool, schedule_id, run_at).await
    }

    pub async fn is_skipped(&self, schedule_id: i64, run_at: DateTime<Utc>) -> AppResult<bool> {
        ring_log::is_skipped(&self.pool, schedule_id, run_at).await
    }

    pub async fn prune_skips(&self, before: DateTime<Utc>) -> AppResult<u64> {
        ring_log::prune_skips(&self.pool, before).await
    }

    // --- Status Delegates ---

    pub async fn save_status(&self, snapshot: &StatusSnapshot) -> AppResult<()> {
        status::save(&self.pool, snapshot).await
    }

    pub async fn load_status(&self) -> AppResult<StatusSnapshot> {
        status::load(&self.pool).await
    }
}

pub(crate) async fn run_schema(pool: &SqlitePool) -> Result<()> {
    let schema = include_str!("schema.sql");

    let mut current_statement = String::new();
    let mut in_trigger = false;

    for line in schema.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("--") || trimmed.is_empty() {
            continue;
        }

        if trimmed.to_uppercase().starts_with("CREATE TRIGGER") {
            in_trigger = true;
        }

        current_statement.push_str(line);
        current_statement.push('\n');

        if trimmed.ends_with(';') {
            if in_trigger {
                if trimmed.to_uppercase() == "END;" {
                    in_trigger = false;
                    sqlx::query(&current_statement).execute(pool).await?;
                    current_statement.clear();
                }
            } else {
                sqlx::query(&current_statement).execute(pool).await?;
                current_statement.clear();
            }
        }
    }
    Ok(())
}
