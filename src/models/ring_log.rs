// file: src/models/ring_log.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

use crate::error::AppError;

/// How a firing ended, as recorded in the ring history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RingResult {
    Played,
    Failed,
    /// Fired too long after its slot to be worth ringing.
    Missed,
    /// Suppressed by a skip-once override.
    Skipped,
}

impl RingResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            RingResult::Played => "PLAYED",
            RingResult::Failed => "FAILED",
            RingResult::Missed => "MISSED",
            RingResult::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for RingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for RingResult {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "PLAYED" => Ok(RingResult::Played),
            "FAILED" => Ok(RingResult::Failed),
            "MISSED" => Ok(RingResult::Missed),
            "SKIPPED" => Ok(RingResult::Skipped),
            other => Err(AppError::validation(format!("unknown ring result '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RingLogEntry {
    pub id: i64,
    pub occurred_at: DateTime<Utc>,
    pub schedule_id: i64,
    /// The slot the firing was armed for.
    pub scheduled_for: DateTime<Utc>,
    pub schedule_name: String,
    pub sound_name: String,
    #[sqlx(try_from = "String")]
    pub result: RingResult,
    pub detail: String,
}

/// A history row before it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRingLog {
    pub occurred_at: DateTime<Utc>,
    pub schedule_id: i64,
    pub scheduled_for: DateTime<Utc>,
    pub schedule_name: String,
    pub sound_name: String,
    pub result: RingResult,
    pub detail: String,
}
