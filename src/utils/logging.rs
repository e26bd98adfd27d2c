use log::{LevelFilter, SetLoggerError, Level};
use env_logger::{Builder, Target};
use chrono::{DateTime, Utc};
use std::env;
use std::io::Write;

use crate::scheduler::RingOutcome;

pub fn parse_level(value: &str) -> LevelFilter {
    match value.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

pub fn init_logging() -> Result<(), SetLoggerError> {
    let log_level = parse_level(&env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()));

    let mut builder = Builder::from_default_env();

    builder.format(|buf, record| {
        let timestamp = buf.timestamp();
        let target = record.target();
        let file = record.file().unwrap_or("unknown");
        let line = record.line().unwrap_or(0);

        match record.level() {
            Level::Info => {
                writeln!(buf, "{} [INFO] [{}]: {}", timestamp, target, record.args())
            }
            level => {
                writeln!(buf,
                    "{} [{}] [{}:{}] {}: {}",
                    timestamp, level, file, line, target, record.args()
                )
            }
        }
    });

    // Filter out noisy modules in production
    if env::var("RUST_ENV").unwrap_or_else(|_| "development".to_string()) == "production" {
        builder.filter_module("tokio", LevelFilter::Info);
        builder.filter_module("sqlx", LevelFilter::Warn);
        builder.filter_module("symphonia", LevelFilter::Warn);
    }

    builder.filter_level(log_level)
           .target(Target::Stdout)
           .try_init()
}

pub fn log_error_with_context(error: &anyhow::Error, context: &str) {
    log::error!("[{}] {}", context, error);

    let mut source = error.source();
    while let Some(err) = source {
        log::error!("  Caused by: {}", err);
        source = err.source();
    }
}

pub fn log_ring_event(schedule_id: i64, at: DateTime<Utc>, outcome: RingOutcome) {
    match outcome {
        RingOutcome::Rang => log::info!("[Ring] Schedule {} rang for {}", schedule_id, at),
        RingOutcome::Missed => log::warn!("[Ring] Schedule {} missed its slot at {}", schedule_id, at),
        RingOutcome::Skipped => log::info!("[Ring] Schedule {} skipped once at {}", schedule_id, at),
        RingOutcome::Failed => log::warn!("[Ring] Schedule {} failed to ring for {}", schedule_id, at),
        RingOutcome::Obsolete => log::debug!("[Ring] Schedule {} no longer rings ({})", schedule_id, at),
        RingOutcome::Duplicate => log::debug!("[Ring] Schedule {} already handled for {}", schedule_id, at),
    }
}
