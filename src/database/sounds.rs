// file: src/database/sounds.rs
use log::{debug, info, warn};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::models::sound::{clamp_volume_percent, DEFAULT_VOLUME_PERCENT};
use crate::models::{PlaybackInfo, Sound};

/// File extensions accepted as sounds.
pub const ALLOWED_EXTENSIONS: &[&str] = &["wav", "mp3", "ogg", "m4a", "aac", "flac"];

/// Name used when a sound row has no display name.
pub const FALLBACK_SOUND_NAME: &str = "Bell";

pub async fn list(pool: &SqlitePool) -> AppResult<Vec<Sound>> {
    let sounds = sqlx::query_as::<_, Sound>(
        "SELECT id, name, file_name, volume_percent, built_in FROM sounds ORDER BY built_in DESC, id ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(sounds)
}

pub async fn insert(
    pool: &SqlitePool,
    name: &str,
    file_name: &str,
    volume_percent: i64,
    built_in: bool,
) -> AppResult<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("sound name must not be blank"));
    }

    let result = sqlx::query(
        "INSERT INTO sounds (name, file_name, volume_percent, built_in) VALUES (?, ?, ?, ?)",
    )
    .bind(name)
    .bind(file_name)
    .bind(clamp_volume_percent(volume_percent) as i64)
    .bind(built_in)
    .execute(pool)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::validation(format!("sound file '{file_name}' is already registered"))
        }
        other => AppError::Database(other),
    })?;

    Ok(result.last_insert_rowid())
}

pub async fn update(pool: &SqlitePool, id: i64, name: &str, volume_percent: i64) -> AppResult<bool> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::validation("sound name must not be blank"));
    }

    let result = sqlx::query("UPDATE sounds SET name = ?, volume_percent = ? WHERE id = ?")
        .bind(name)
        .bind(clamp_volume_percent(volume_percent) as i64)
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Display name of a sound, or an empty string when it no longer exists.
pub async fn name_of(pool: &SqlitePool, sound_id: i64) -> AppResult<String> {
    let name: Option<String> = sqlx::query_scalar("SELECT name FROM sounds WHERE id = ? LIMIT 1")
        .bind(sound_id)
        .fetch_optional(pool)
        .await?;

    Ok(name.unwrap_or_default())
}

/// Resolves what to play for an enabled schedule. `None` when the schedule is
/// gone, disabled, or its sound row was removed.
pub async fn playback_info(
    pool: &SqlitePool,
    schedule_id: i64,
    sounds_dir: &Path,
) -> AppResult<Option<PlaybackInfo>> {
    let row = sqlx::query(
        r#"
        SELECT sc.name AS schedule_name, so.name, so.file_name, so.volume_percent
        FROM schedules sc
        JOIN sounds so ON so.id = sc.sound_id
        WHERE sc.id = ? AND sc.enabled = 1
        LIMIT 1
        "#,
    )
    .bind(schedule_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let schedule_name: String = row.try_get("schedule_name")?;
    let name: String = row.try_get("name")?;
    let file_name: String = row.try_get("file_name")?;
    let volume: i64 = row.try_get("volume_percent")?;

    Ok(Some(PlaybackInfo {
        path: sounds_dir.join(file_name),
        name: if name.trim().is_empty() {
            FALLBACK_SOUND_NAME.to_string()
        } else {
            name
        },
        volume_percent: clamp_volume_percent(volume),
        schedule_name,
    }))
}

/// Copies a user file into the sounds directory and registers it.
pub async fn add_user_sound(
    pool: &SqlitePool,
    source: &Path,
    name_override: Option<&str>,
    volume_percent: i64,
    sounds_dir: &Path,
) -> AppResult<i64> {
    if !has_allowed_extension(source) {
        return Err(AppError::validation(format!(
            "unsupported sound file type: {}",
            source.display()
        )));
    }
    let file_name = source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::validation("sound path has no file name"))?;

    std::fs::create_dir_all(sounds_dir)?;
    let target = unique_target(sounds_dir, file_name);
    std::fs::copy(source, &target)?;

    let stored_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name)
        .to_string();
    let display = name_override
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| file_stem(&stored_name));

    match insert(pool, &display, &stored_name, volume_percent, false).await {
        Ok(id) => {
            info!("Added sound '{}' as {}", display, stored_name);
            Ok(id)
        }
        Err(e) => {
            let _ = std::fs::remove_file(&target);
            Err(e)
        }
    }
}

/// Deletes a user sound and its file. Built-in sounds are never removed.
pub async fn remove_user_sound(pool: &SqlitePool, id: i64, sounds_dir: &Path) -> AppResult<bool> {
    let sound = sqlx::query_as::<_, Sound>(
        "SELECT id, name, file_name, volume_percent, built_in FROM sounds WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(sound) = sound else {
        return Ok(false);
    };
    if sound.built_in {
        debug!("Refusing to remove built-in sound {}", sound.name);
        return Ok(false);
    }

    sqlx::query("DELETE FROM sounds WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    let path = sounds_dir.join(&sound.file_name);
    if path.exists() {
        if let Err(e) = std::fs::remove_file(&path) {
            warn!("Failed to delete sound file {:?}: {}", path, e);
        }
    }

    Ok(true)
}

/// Registers every supported file in `source_dir` as a built-in sound, copying
/// it into `sounds_dir` when missing. Already seeded files are skipped.
pub async fn seed_built_ins(pool: &SqlitePool, source_dir: &Path, sounds_dir: &Path) -> AppResult<usize> {
    if !source_dir.is_dir() {
        debug!("No built-in sound directory at {:?}", source_dir);
        return Ok(0);
    }

    let existing: HashSet<String> =
        sqlx::query_scalar::<_, String>("SELECT file_name FROM sounds WHERE built_in = 1")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();

    let mut entries: Vec<PathBuf> = std::fs::read_dir(source_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_allowed_extension(path))
        .collect();
    entries.sort();

    std::fs::create_dir_all(sounds_dir)?;

    let mut seeded = 0;
    for path in entries {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if existing.contains(file_name) {
            continue;
        }

        let target = sounds_dir.join(file_name);
        if !target.exists() {
            std::fs::copy(&path, &target)?;
        }

        let result = sqlx::query(
            "INSERT OR IGNORE INTO sounds (name, file_name, volume_percent, built_in) VALUES (?, ?, ?, 1)",
        )
        .bind(file_stem(file_name))
        .bind(file_name)
        .bind(DEFAULT_VOLUME_PERCENT as i64)
        .execute(pool)
        .await?;
        seeded += result.rows_affected() as usize;
    }

    if seeded > 0 {
        info!("Seeded {} built-in sounds", seeded);
    }
    Ok(seeded)
}

fn has_allowed_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| ALLOWED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn file_stem(file_name: &str) -> String {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
        .to_string()
}

fn unique_target(dir: &Path, file_name: &str) -> PathBuf {
    let candidate = dir.join(file_name);
    if !candidate.exists() {
        return candidate;
    }

    let path = Path::new(file_name);
    let stem = file_stem(file_name);
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    (1..)
        .map(|n| dir.join(format!("{stem}_{n}.{ext}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::create_test_database;
    use crate::models::{NewSchedule, WeekdayMask};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_insert_clamps_volume_and_enforces_unique_file() {
        let db = create_test_database().await;
        let id = db.insert_sound("Loud", "loud.wav", 350, false).await.unwrap();

        let sounds = db.list_sounds().await.unwrap();
        assert_eq!(sounds[0].id, id);
        assert_eq!(sounds[0].volume_percent, 200);

        let dup = db.insert_sound("Again", "loud.wav", 100, false).await;
        assert!(matches!(dup, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_puts_built_ins_first() {
        let db = create_test_database().await;
        db.insert_sound("Mine", "mine.mp3", 100, false).await.unwrap();
        db.insert_sound("Stock", "stock.wav", 100, true).await.unwrap();

        let sounds = db.list_sounds().await.unwrap();
        assert_eq!(sounds[0].name, "Stock");
        assert!(sounds[0].built_in);
        assert_eq!(sounds[1].name, "Mine");
    }

    #[tokio::test]
    async fn test_sound_name_missing_is_empty() {
        let db = create_test_database().await;
        let id = db.insert_sound("Chime", "chime.ogg", 100, true).await.unwrap();

        assert_eq!(db.sound_name(id).await.unwrap(), "Chime");
        assert_eq!(db.sound_name(id + 100).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_playback_info_requires_enabled_schedule() {
        let db = create_test_database().await;
        let sounds_dir = TempDir::new().unwrap();
        let sound_id = db.insert_sound("Gong", "gong.wav", 150, true).await.unwrap();
        let schedule_id = db
            .insert_schedule(&NewSchedule {
                name: "Gong".into(),
                weekday_mask: WeekdayMask::EVERY_DAY,
                hour: 9,
                minute: 0,
                sound_id,
                enabled: true,
            })
            .await
            .unwrap();

        let info = db
            .sound_playback_info(schedule_id, sounds_dir.path())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.path, sounds_dir.path().join("gong.wav"));
        assert_eq!(info.name, "Gong");
        assert_eq!(info.volume_percent, 150);

        db.set_schedule_enabled(schedule_id, false).await.unwrap();
        assert!(db
            .sound_playback_info(schedule_id, sounds_dir.path())
            .await
            .unwrap()
            .is_none());
        assert!(db.sound_playback_info(999, sounds_dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_seed_built_ins_is_idempotent() {
        let db = create_test_database().await;
        let assets = TempDir::new().unwrap();
        let sounds_dir = TempDir::new().unwrap();
        std::fs::write(assets.path().join("school_bell.wav"), b"RIFF").unwrap();
        std::fs::write(assets.path().join("chime.MP3"), b"ID3").unwrap();
        std::fs::write(assets.path().join("notes.txt"), b"skip").unwrap();

        let first = db.seed_built_in_sounds(assets.path(), sounds_dir.path()).await.unwrap();
        assert_eq!(first, 2);
        assert!(sounds_dir.path().join("school_bell.wav").exists());

        let second = db.seed_built_in_sounds(assets.path(), sounds_dir.path()).await.unwrap();
        assert_eq!(second, 0);

        let names: Vec<String> = db.list_sounds().await.unwrap().into_iter().map(|s| s.name).collect();
        assert!(names.contains(&"school_bell".to_string()));
        assert!(names.contains(&"chime".to_string()));
    }

    #[tokio::test]
    async fn test_add_and_remove_user_sound() {
        let db = create_test_database().await;
        let source_dir = TempDir::new().unwrap();
        let sounds_dir = TempDir::new().unwrap();
        let source = source_dir.path().join("custom.wav");
        std::fs::write(&source, b"RIFF").unwrap();

        let first = db
            .add_user_sound(&source, None, 80, sounds_dir.path())
            .await
            .unwrap();
        let second = db
            .add_user_sound(&source, Some(" Custom two "), 80, sounds_dir.path())
            .await
            .unwrap();

        let sounds = db.list_sounds().await.unwrap();
        assert_eq!(sounds.len(), 2);
        assert_eq!(sounds[0].name, "custom");
        assert_eq!(sounds[1].name, "Custom two");
        assert_eq!(sounds[1].file_name, "custom_1.wav");

        assert!(db.remove_user_sound(first, sounds_dir.path()).await.unwrap());
        assert!(!sounds_dir.path().join("custom.wav").exists());
        assert!(sounds_dir.path().join("custom_1.wav").exists());
        assert!(db.remove_user_sound(second, sounds_dir.path()).await.unwrap());
        assert!(!db.remove_user_sound(second, sounds_dir.path()).await.unwrap());
    }

    #[tokio::test]
    async fn test_built_in_sound_is_not_removed() {
        let db = create_test_database().await;
        let sounds_dir = TempDir::new().unwrap();
        let id = db.insert_sound("Stock", "stock.wav", 100, true).await.unwrap();

        assert!(!db.remove_user_sound(id, sounds_dir.path()).await.unwrap());
        assert_eq!(db.list_sounds().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_add_user_sound_rejects_unknown_extension() {
        let db = create_test_database().await;
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("readme.txt");
        std::fs::write(&source, b"text").unwrap();

        let result = db.add_user_sound(&source, None, 100, dir.path()).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
