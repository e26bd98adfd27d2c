// file: src/models/sound.rs
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::path::PathBuf;

pub const MAX_VOLUME_PERCENT: u32 = 200;
pub const DEFAULT_VOLUME_PERCENT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Sound {
    pub id: i64,
    pub name: String,
    pub file_name: String,
    #[sqlx(try_from = "i64")]
    pub volume_percent: u32,
    pub built_in: bool,
}

/// What the playback service needs to ring one schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackInfo {
    pub path: PathBuf,
    pub name: String,
    pub volume_percent: u32,
    /// Title of the schedule being rung, for the ring history.
    pub schedule_name: String,
}

pub fn clamp_volume_percent(volume_percent: i64) -> u32 {
    volume_percent.clamp(0, MAX_VOLUME_PERCENT as i64) as u32
}

/// Output gain for a volume percent, clamped to 0.0..=2.0.
pub fn gain_for(volume_percent: u32) -> f32 {
    (volume_percent as f32 / 100.0).clamp(0.0, 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_volume_percent() {
        assert_eq!(clamp_volume_percent(-20), 0);
        assert_eq!(clamp_volume_percent(150), 150);
        assert_eq!(clamp_volume_percent(999), 200);
    }

    #[test]
    fn test_gain_for() {
        assert_eq!(gain_for(0), 0.0);
        assert_eq!(gain_for(100), 1.0);
        assert_eq!(gain_for(200), 2.0);
        assert_eq!(gain_for(450), 2.0);
    }
}
