use chrono::{DateTime, Utc};

use super::PlaybackState;
use crate::models::NextStatus;

/// Ongoing status notification shown while the playback service runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusNotification {
    pub title: String,
    pub text: String,
    pub detail: String,
}

pub fn render(next: Option<&NextStatus>, state: &PlaybackState, now: DateTime<Utc>) -> StatusNotification {
    let title = match next {
        Some(next) => format!("Next bell in {}", format_remaining(next.at - now)),
        None => "No upcoming bell".to_string(),
    };

    let text = match next {
        Some(next) => format!("Next: {} / {}", or_dash(&next.title), or_dash(&next.sound_name)),
        None => "Next: -".to_string(),
    };

    let playing = match state {
        PlaybackState::Preparing(session) => format!("Preparing: {}", or_dash(&session.name)),
        PlaybackState::Playing(session) => format!("Playing: {}", or_dash(&session.name)),
        PlaybackState::Idle | PlaybackState::Stopped => "Playing: -".to_string(),
    };

    StatusNotification {
        title,
        detail: format!("{}\n{}", text, playing),
        text,
    }
}

/// HH:MM:SS, clamped at zero. Hours are not wrapped at 24.
pub fn format_remaining(remaining: chrono::Duration) -> String {
    let secs = remaining.num_seconds().max(0);
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

fn or_dash(value: &str) -> &str {
    if value.trim().is_empty() {
        "-"
    } else {
        value
    }
}
