// file: src/models/status.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Key/value row of the persisted status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StatusEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextStatus {
    pub at: DateTime<Utc>,
    pub title: String,
    pub sound_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NowStatus {
    pub name: String,
    pub playing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub next: Option<NextStatus>,
    pub now: Option<NowStatus>,
}
