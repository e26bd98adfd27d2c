// Belltower - weekly bell daemon
// Main entry point

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info, warn};

use belltower::config::{validate_config, Config};
use belltower::utils::logging::{init_logging, log_error_with_context};
use belltower::utils::ensure_directory;
use belltower::{Database, Runtime};

const RECENT_HISTORY: u32 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    info!("Starting Belltower v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().context("Failed to load configuration")?;
    validate_config(&config)?;

    ensure_directory(&config.sounds_dir)?;
    if let Some(parent) = config
        .database_url
        .strip_prefix("sqlite:")
        .and_then(|path| Path::new(path).parent())
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        ensure_directory(parent)?;
    }

    let db = Arc::new(
        Database::open(&config.database_url)
            .await
            .context("Failed to open database")?,
    );

    if let Some(dir) = &config.built_in_sounds_dir {
        match db.seed_built_in_sounds(dir, &config.sounds_dir).await {
            Ok(0) => {}
            Ok(count) => info!("Seeded {} built-in sounds", count),
            Err(e) => warn!("Failed to seed built-in sounds: {}", e.to_safe_string()),
        }
    }

    let runtime = Runtime::start(&config, db).await?;

    if config.resume_on_start {
        if let Err(e) = runtime.resume().await {
            log_error_with_context(&e.into(), "Resume");
        }
    } else {
        info!("Resume on start disabled; no bell is armed for this run");
    }

    match runtime.db.list_ring_logs(RECENT_HISTORY).await {
        Ok(history) => {
            for entry in history.iter().rev() {
                info!(
                    "History: {} '{}' ({}) for {} {}",
                    entry.result, entry.schedule_name, entry.sound_name, entry.scheduled_for, entry.detail
                );
            }
        }
        Err(e) => warn!("Failed to read ring history: {}", e.to_safe_string()),
    }

    if runtime.dispatcher.take_permission_prompt() {
        warn!("Exact wake timers are unavailable; bells may ring late. Enable exact_timers to fix this.");
    }

    match runtime
        .dispatcher
        .list_upcoming(config.upcoming_horizon(), config.upcoming_limit)
        .await
    {
        Ok(upcoming) if upcoming.is_empty() => info!("No bells in the next {} minutes", config.upcoming_horizon_minutes),
        Ok(upcoming) => {
            for occurrence in upcoming {
                info!("Upcoming: '{}' at {}", occurrence.title, occurrence.run_at);
            }
        }
        Err(e) => error!("Failed to list upcoming bells: {}", e.to_safe_string()),
    }

    let mut notifications = runtime.notifications.clone();
    let mut last_detail = String::new();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
            changed = notifications.changed() => {
                if changed.is_err() {
                    warn!("Playback service stopped unexpectedly");
                    break;
                }
                let detail = notifications
                    .borrow_and_update()
                    .as_ref()
                    .map(|n| n.detail.clone())
                    .unwrap_or_default();
                if detail != last_detail {
                    info!("{}", detail.replace('\n', " | "));
                    last_detail = detail;
                }
            }
        }
    }

    runtime.shutdown().await;
    info!("Belltower stopped");
    Ok(())
}
