// file: src/database/status.rs
use chrono::{TimeZone, Utc};
use sqlx::SqlitePool;

use crate::error::AppResult;
use crate::models::{NextStatus, NowStatus, StatusEntry, StatusSnapshot};

pub const K_NEXT_AT: &str = "next_at";
pub const K_NEXT_TITLE: &str = "next_title";
pub const K_NEXT_SOUND: &str = "next_sound";
pub const K_NOW_NAME: &str = "now_name";
pub const K_NOW_PLAYING: &str = "now_playing";

pub async fn save(pool: &SqlitePool, snapshot: &StatusSnapshot) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    match &snapshot.next {
        Some(next) => {
            let at = next.at.timestamp_millis().to_string();
            for (key, value) in [
                (K_NEXT_AT, at.as_str()),
                (K_NEXT_TITLE, next.title.as_str()),
                (K_NEXT_SOUND, next.sound_name.as_str()),
            ] {
                upsert(&mut tx, key, value).await?;
            }
        }
        None => remove(&mut tx, &[K_NEXT_AT, K_NEXT_TITLE, K_NEXT_SOUND]).await?,
    }

    match &snapshot.now {
        Some(now) => {
            let playing = now.playing.to_string();
            upsert(&mut tx, K_NOW_NAME, &now.name).await?;
            upsert(&mut tx, K_NOW_PLAYING, &playing).await?;
        }
        None => remove(&mut tx, &[K_NOW_NAME, K_NOW_PLAYING]).await?,
    }

    tx.commit().await?;
    Ok(())
}

pub async fn load(pool: &SqlitePool) -> AppResult<StatusSnapshot> {
    let entries = sqlx::query_as::<_, StatusEntry>("SELECT key, value FROM status")
        .fetch_all(pool)
        .await?;

    let mut next_at = None;
    let mut next_title = String::new();
    let mut next_sound = String::new();
    let mut now_name = String::new();
    let mut now_playing = false;

    for entry in entries {
        match entry.key.as_str() {
            K_NEXT_AT => {
                next_at = entry
                    .value
                    .parse::<i64>()
                    .ok()
                    .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            }
            K_NEXT_TITLE => next_title = entry.value,
            K_NEXT_SOUND => next_sound = entry.value,
            K_NOW_NAME => now_name = entry.value,
            K_NOW_PLAYING => now_playing = entry.value.parse().unwrap_or(false),
            _ => {}
        }
    }

    Ok(StatusSnapshot {
        next: next_at.map(|at| NextStatus {
            at,
            title: next_title,
            sound_name: next_sound,
        }),
        now: (!now_name.is_empty()).then(|| NowStatus {
            name: now_name,
            playing: now_playing,
        }),
    })
}

async fn upsert(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, key: &str, value: &str) -> AppResult<()> {
    sqlx::query(
        "INSERT INTO status (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn remove(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, keys: &[&str]) -> AppResult<()> {
    for key in keys {
        sqlx::query("DELETE FROM status WHERE key = ?")
            .bind(*key)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::create_test_database;

    #[tokio::test]
    async fn test_load_empty_status() {
        let db = create_test_database().await;
        assert_eq!(db.load_status().await.unwrap(), StatusSnapshot::default());
    }

    #[tokio::test]
    async fn test_save_then_clear_fields_independently() {
        let db = create_test_database().await;
        let at = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let snapshot = StatusSnapshot {
            next: Some(NextStatus {
                at,
                title: "Assembly".into(),
                sound_name: "Gong".into(),
            }),
            now: Some(NowStatus {
                name: "Chime".into(),
                playing: true,
            }),
        };

        db.save_status(&snapshot).await.unwrap();
        assert_eq!(db.load_status().await.unwrap(), snapshot);

        let cleared_now = StatusSnapshot {
            now: None,
            ..snapshot.clone()
        };
        db.save_status(&cleared_now).await.unwrap();
        let loaded = db.load_status().await.unwrap();
        assert_eq!(loaded.next, snapshot.next);
        assert!(loaded.now.is_none());

        db.save_status(&StatusSnapshot::default()).await.unwrap();
        let keys: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM status")
            .fetch_one(&db.pool)
            .await
            .unwrap();
        assert_eq!(keys, 0);
    }
}
