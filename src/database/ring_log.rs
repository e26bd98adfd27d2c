// file: src/database/ring_log.rs
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::AppResult;
use crate::models::{NewRingLog, RingLogEntry};

pub async fn insert(pool: &SqlitePool, entry: &NewRingLog) -> AppResult<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO ring_log (occurred_at, schedule_id, scheduled_for, schedule_name, sound_name, result, detail)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.occurred_at)
    .bind(entry.schedule_id)
    .bind(entry.scheduled_for)
    .bind(&entry.schedule_name)
    .bind(&entry.sound_name)
    .bind(entry.result.as_str())
    .bind(&entry.detail)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Newest first.
pub async fn list_recent(pool: &SqlitePool, limit: u32) -> AppResult<Vec<RingLogEntry>> {
    let entries = sqlx::query_as::<_, RingLogEntry>(
        r#"
        SELECT id, occurred_at, schedule_id, scheduled_for, schedule_name, sound_name, result, detail
        FROM ring_log
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

pub async fn add_skip(pool: &SqlitePool, schedule_id: i64, run_at: DateTime<Utc>) -> AppResult<()> {
    sqlx::query("INSERT OR IGNORE INTO skips (schedule_id, run_at) VALUES (?, ?)")
        .bind(schedule_id)
        .bind(run_at)
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn is_skipped(pool: &SqlitePool, schedule_id: i64, run_at: DateTime<Utc>) -> AppResult<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT 1 FROM skips WHERE schedule_id = ? AND run_at = ? LIMIT 1")
            .bind(schedule_id)
            .bind(run_at)
            .fetch_optional(pool)
            .await?;

    Ok(found.is_some())
}

/// Forgets skips for occurrences that are already in the past.
pub async fn prune_skips(pool: &SqlitePool, before: DateTime<Utc>) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM skips WHERE run_at < ?")
        .bind(before)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
