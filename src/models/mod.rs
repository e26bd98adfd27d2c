// file: src/models/mod.rs

pub mod occurrence;
pub mod ring_log;
pub mod schedule;
pub mod sound;
pub mod status;

// Flattened so callers can write `use crate::models::Schedule`.
pub use occurrence::Occurrence;
pub use ring_log::{NewRingLog, RingLogEntry, RingResult};
pub use schedule::{NewSchedule, Schedule, WeekdayMask};
pub use sound::{PlaybackInfo, Sound};
pub use status::{NextStatus, NowStatus, StatusEntry, StatusSnapshot};
