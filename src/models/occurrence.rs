// file: src/models/occurrence.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One resolved future firing of a schedule. Computed, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub schedule_id: i64,
    pub run_at: DateTime<Utc>,
    pub title: String,
    pub sound_id: i64,
}
