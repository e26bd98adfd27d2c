use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::notification::{self, StatusNotification};
use super::{MediaBackend, MediaEvent, PlaybackAction, PlaybackHandle, PlaybackState, Session, SessionToken, WakeLock};
use crate::clock::Clock;
use crate::error::AppError;
use crate::models::sound::gain_for;
use crate::status::StatusStore;

const WAKE_LOCK_TAG: &str = "belltower:playback";

#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    pub tick: Duration,
    pub wake_lock_ceiling: chrono::Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            wake_lock_ceiling: chrono::Duration::hours(8),
        }
    }
}

pub struct PlaybackService<B: MediaBackend> {
    backend: B,
    status: StatusStore,
    clock: Arc<dyn Clock>,
    tick: Duration,
    state: PlaybackState,
    last_token: u64,
    /// Token of the most recent play request handed to the backend.
    dispatched: Option<SessionToken>,
    wake_lock: WakeLock,
    media_tx: mpsc::UnboundedSender<MediaEvent>,
    notifications: watch::Sender<Option<StatusNotification>>,
}

impl<B: MediaBackend> PlaybackService<B> {
    /// Starts the actor on the current runtime.
    ///
    /// The returned receiver carries the status notification; it becomes
    /// `None` once the service has quit.
    pub fn spawn(
        backend: B,
        status: StatusStore,
        clock: Arc<dyn Clock>,
        config: PlaybackConfig,
    ) -> (PlaybackHandle, watch::Receiver<Option<StatusNotification>>, JoinHandle<()>) {
        let (handle, actions) = PlaybackHandle::channel();
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let (notifications, notification_rx) = watch::channel(None);

        let service = Self {
            backend,
            status,
            clock,
            tick: config.tick,
            state: PlaybackState::Idle,
            last_token: 0,
            dispatched: None,
            wake_lock: WakeLock::new(WAKE_LOCK_TAG, config.wake_lock_ceiling),
            media_tx,
            notifications,
        };

        let task = tokio::spawn(service.run(actions, media_rx));
        (handle, notification_rx, task)
    }

    async fn run(
        mut self,
        mut actions: mpsc::UnboundedReceiver<PlaybackAction>,
        mut media: mpsc::UnboundedReceiver<MediaEvent>,
    ) {
        info!("Playback service started");
        self.wake_lock.acquire(self.clock.now());
        self.publish_notification();

        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                action = actions.recv() => match action {
                    Some(PlaybackAction::Quit) => {
                        info!("Playback service quitting");
                        break;
                    }
                    Some(action) => self.handle_action(action),
                    None => {
                        debug!("All playback handles dropped");
                        break;
                    }
                },
                Some(event) = media.recv() => self.handle_media_event(event),
                _ = ticker.tick() => self.on_tick(),
            }
        }

        self.teardown();
    }

    fn handle_action(&mut self, action: PlaybackAction) {
        match action {
            PlaybackAction::Start => debug!("Playback service start requested"),
            PlaybackAction::Play { path, name, volume_percent } => self.play(&path, name, volume_percent),
            PlaybackAction::Stop => self.stop(),
            PlaybackAction::Quit => {}
        }
        self.publish_notification();
    }

    fn play(&mut self, path: &Path, name: String, volume_percent: u32) {
        if !path.exists() {
            let e = AppError::resource(format!("sound file missing: {:?}", path));
            warn!("Ignoring play request for '{}': {}", name, e);
            return;
        }

        if self.state.session().is_some() {
            self.backend.stop();
        }

        self.last_token += 1;
        let token = SessionToken(self.last_token);
        self.dispatched = Some(token);

        match self.backend.play(token, path, gain_for(volume_percent), self.media_tx.clone()) {
            Ok(()) => {
                info!("Playing '{}' (session {})", name, token.0);
                self.status.set_now(&name, false);
                self.state = PlaybackState::Preparing(Session { token, name });
            }
            Err(e) => {
                error!("Failed to start playback of '{}': {}", name, e.to_safe_string());
                self.dispatched = None;
                self.state = PlaybackState::Idle;
                self.status.clear_now();
            }
        }
    }

    fn stop(&mut self) {
        self.backend.stop();
        self.dispatched = None;
        self.state = PlaybackState::Stopped;
        self.status.clear_now();
        debug!("Playback stopped");
    }

    fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::Started(token) => {
                let PlaybackState::Preparing(session) = &self.state else {
                    debug!("Ignoring start of session {} outside preparing", token.0);
                    return;
                };
                if session.token != token {
                    debug!("Ignoring start of stale session {}", token.0);
                    return;
                }
                self.status.set_now(&session.name, true);
                self.state = PlaybackState::Playing(session.clone());
            }
            MediaEvent::Ended(token) | MediaEvent::Failed(token, _) if self.dispatched != Some(token) => {
                debug!("Ignoring end of stale session {}", token.0);
                return;
            }
            MediaEvent::Ended(token) => {
                debug!("Session {} finished", token.0);
                self.finish_session();
            }
            MediaEvent::Failed(token, reason) => {
                warn!("Session {} failed: {}", token.0, reason);
                self.finish_session();
            }
        }
        self.publish_notification();
    }

    fn finish_session(&mut self) {
        self.dispatched = None;
        self.state = PlaybackState::Idle;
        self.status.clear_now();
    }

    fn on_tick(&mut self) {
        self.wake_lock.refresh(self.clock.now());
        self.publish_notification();
    }

    fn publish_notification(&self) {
        let next = self.status.get_next();
        let rendered = notification::render(next.as_ref(), &self.state, self.clock.now());
        self.notifications.send_if_modified(|current| {
            if current.as_ref() == Some(&rendered) {
                return false;
            }
            *current = Some(rendered);
            true
        });
    }

    fn teardown(&mut self) {
        self.backend.stop();
        if let Err(e) = self.backend.release() {
            warn!("Failed to release media backend: {}", e.to_safe_string());
        }
        self.wake_lock.release_all();
        self.dispatched = None;
        self.state = PlaybackState::Idle;
        self.status.clear_now();
        self.notifications.send_replace(None);
        info!("Playback service stopped");
    }
}
