// Belltower Library
// Weekly bell schedules, one armed wake timer, and a playback service

pub mod app;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod playback;
pub mod scheduler;
pub mod status;
pub mod utils;

// Re-export commonly used types
pub use app::Runtime;
pub use clock::{Clock, ManualClock, SystemClock};
pub use database::Database;
pub use error::{AppError, AppResult};
pub use models::*;
pub use playback::{PlaybackAction, PlaybackHandle, PlaybackState, StatusNotification};
pub use scheduler::{AlarmDispatcher, RingHandler, Zone};
pub use status::StatusStore;
