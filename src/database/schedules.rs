// file: src/database/schedules.rs
use sqlx::SqlitePool;

use crate::error::AppResult;
use crate::models::{NewSchedule, Schedule};

const SELECT_SCHEDULE: &str =
    "SELECT id, name, weekday_mask, hour, minute, sound_id, enabled FROM schedules";

pub async fn list(pool: &SqlitePool) -> AppResult<Vec<Schedule>> {
    let schedules = sqlx::query_as::<_, Schedule>(&format!(
        "{SELECT_SCHEDULE} ORDER BY hour ASC, minute ASC, id ASC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(schedules)
}

/// The full enabled set. The resolver always works on everything in memory.
pub async fn list_enabled(pool: &SqlitePool) -> AppResult<Vec<Schedule>> {
    let schedules = sqlx::query_as::<_, Schedule>(&format!(
        "{SELECT_SCHEDULE} WHERE enabled = 1 ORDER BY hour ASC, minute ASC, id ASC"
    ))
    .fetch_all(pool)
    .await?;

    Ok(schedules)
}

pub async fn get(pool: &SqlitePool, id: i64) -> AppResult<Option<Schedule>> {
    let schedule = sqlx::query_as::<_, Schedule>(&format!("{SELECT_SCHEDULE} WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(schedule)
}

pub async fn insert(pool: &SqlitePool, schedule: &NewSchedule) -> AppResult<i64> {
    let name = schedule.validate()?;

    let result = sqlx::query(
        "INSERT INTO schedules (name, weekday_mask, hour, minute, sound_id, enabled) VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(schedule.weekday_mask.bits() as i64)
    .bind(schedule.hour as i64)
    .bind(schedule.minute as i64)
    .bind(schedule.sound_id)
    .bind(schedule.enabled)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

pub async fn update(pool: &SqlitePool, id: i64, schedule: &NewSchedule) -> AppResult<bool> {
    let name = schedule.validate()?;

    let result = sqlx::query(
        "UPDATE schedules SET name = ?, weekday_mask = ?, hour = ?, minute = ?, sound_id = ?, enabled = ? WHERE id = ?",
    )
    .bind(name)
    .bind(schedule.weekday_mask.bits() as i64)
    .bind(schedule.hour as i64)
    .bind(schedule.minute as i64)
    .bind(schedule.sound_id)
    .bind(schedule.enabled)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn set_enabled(pool: &SqlitePool, id: i64, enabled: bool) -> AppResult<bool> {
    let result = sqlx::query("UPDATE schedules SET enabled = ? WHERE id = ?")
        .bind(enabled)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn delete(pool: &SqlitePool, id: i64) -> AppResult<bool> {
    let result = sqlx::query("DELETE FROM schedules WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
