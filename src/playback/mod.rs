//! Foreground playback service.
//!
//! A single actor task owns the media backend, the wake lock and the status
//! notification. Everything else talks to it through [`PlaybackHandle`].

pub mod backend;
pub mod notification;
pub mod service;
pub mod wake_lock;

use std::path::PathBuf;

use log::debug;
use tokio::sync::mpsc;

pub use backend::{MediaBackend, RodioBackend};
pub use notification::StatusNotification;
pub use service::{PlaybackConfig, PlaybackService};
pub use wake_lock::WakeLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackAction {
    /// Bring the service up (idempotent) and refresh the notification.
    Start,
    Play {
        path: PathBuf,
        name: String,
        volume_percent: u32,
    },
    Stop,
    Quit,
}

/// Identifies one play request. Strictly increasing per service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionToken(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: SessionToken,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Preparing(Session),
    Playing(Session),
    Stopped,
}

impl PlaybackState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            PlaybackState::Preparing(s) | PlaybackState::Playing(s) => Some(s),
            PlaybackState::Idle | PlaybackState::Stopped => None,
        }
    }
}

/// Progress reported by a [`MediaBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    Started(SessionToken),
    Ended(SessionToken),
    Failed(SessionToken, String),
}

/// Cheap, cloneable sender side of the playback actor.
#[derive(Debug, Clone)]
pub struct PlaybackHandle {
    tx: mpsc::UnboundedSender<PlaybackAction>,
}

impl PlaybackHandle {
    /// A handle plus the receiver the actor (or a test) drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PlaybackAction>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false when the service is no longer running.
    pub fn send(&self, action: PlaybackAction) -> bool {
        match self.tx.send(action) {
            Ok(()) => true,
            Err(e) => {
                debug!("Playback service not running, dropped {:?}", e.0);
                false
            }
        }
    }

    pub fn start(&self) -> bool {
        self.send(PlaybackAction::Start)
    }

    pub fn play(&self, path: PathBuf, name: impl Into<String>, volume_percent: u32) -> bool {
        self.send(PlaybackAction::Play {
            path,
            name: name.into(),
            volume_percent,
        })
    }

    pub fn stop(&self) -> bool {
        self.send(PlaybackAction::Stop)
    }

    pub fn quit(&self) -> bool {
        self.send(PlaybackAction::Quit)
    }
}
