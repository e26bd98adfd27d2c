//! Wiring of the long-running pieces: status persister, playback service,
//! dispatcher and ring listener.

use std::sync::Arc;

use log::{info, warn};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::database::Database;
use crate::error::AppResult;
use crate::models::{Occurrence, StatusSnapshot};
use crate::playback::{MediaBackend, PlaybackHandle, PlaybackService, RodioBackend, StatusNotification};
use crate::scheduler::{run_ring_listener, AlarmDispatcher, AlarmHost, RingHandler, TokioAlarmHost, WakeEvent};
use crate::status::{persist_changes, StatusStore};

/// Application state shared across the daemon.
pub struct Runtime {
    pub db: Arc<Database>,
    pub status: StatusStore,
    pub playback: PlaybackHandle,
    pub notifications: watch::Receiver<Option<StatusNotification>>,
    pub dispatcher: Arc<AlarmDispatcher>,
    pub ring: Arc<RingHandler>,
    pub shutdown: CancellationToken,
    persist_stop: CancellationToken,
    listener: JoinHandle<()>,
    playback_task: JoinHandle<()>,
    persister: JoinHandle<()>,
}

impl Runtime {
    /// Starts with the rodio backend, tokio timers and the system clock.
    pub async fn start(config: &Config, db: Arc<Database>) -> AppResult<Self> {
        let (host, wake_events) = TokioAlarmHost::new(config.exact_timers, config.inexact_window());
        Self::start_with(
            config,
            db,
            RodioBackend::new(),
            Arc::new(host),
            wake_events,
            Arc::new(SystemClock),
        )
        .await
    }

    pub async fn start_with<B: MediaBackend>(
        config: &Config,
        db: Arc<Database>,
        backend: B,
        host: Arc<dyn AlarmHost>,
        wake_events: mpsc::UnboundedReceiver<WakeEvent>,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        let zone = config.zone()?;

        // Whatever was playing before a restart is gone; keep only `next`
        let restored = match db.load_status().await {
            Ok(snapshot) => StatusSnapshot { next: snapshot.next, now: None },
            Err(e) => {
                warn!("Could not restore status snapshot: {}", e.to_safe_string());
                StatusSnapshot::default()
            }
        };
        let status = StatusStore::new(restored);

        let shutdown = CancellationToken::new();
        let persist_stop = CancellationToken::new();
        let persister = tokio::spawn(persist_changes(status.clone(), db.clone(), persist_stop.clone()));

        let (playback, notifications, playback_task) =
            PlaybackService::spawn(backend, status.clone(), clock.clone(), config.playback());

        let dispatcher = Arc::new(AlarmDispatcher::new(
            db.clone(),
            host,
            status.clone(),
            playback.clone(),
            clock.clone(),
            zone,
        ));
        let ring = Arc::new(
            RingHandler::new(
                db.clone(),
                dispatcher.clone(),
                playback.clone(),
                clock,
                config.sounds_dir.clone(),
            )
            .with_missed_after(config.missed_after()),
        );
        let listener = tokio::spawn(run_ring_listener(ring.clone(), wake_events, shutdown.clone()));

        info!("Runtime started");
        Ok(Self {
            db,
            status,
            playback,
            notifications,
            dispatcher,
            ring,
            shutdown,
            persist_stop,
            listener,
            playback_task,
            persister,
        })
    }

    /// Re-arms the next bell, as after a reboot or app upgrade.
    pub async fn resume(&self) -> AppResult<Option<Occurrence>> {
        self.dispatcher.reschedule_next().await
    }

    /// Stops firing, disarms, quits playback and flushes status, in that order.
    pub async fn shutdown(self) {
        info!("Shutting down runtime");
        self.shutdown.cancel();
        if let Err(e) = self.listener.await {
            warn!("Ring listener ended abnormally: {}", e);
        }

        self.ring.wait_idle().await;
        self.dispatcher.shutdown().await;

        self.playback.quit();
        if let Err(e) = self.playback_task.await {
            warn!("Playback service ended abnormally: {}", e);
        }

        self.persist_stop.cancel();
        if let Err(e) = self.persister.await {
            warn!("Status persister ended abnormally: {}", e);
        }
        info!("Runtime stopped");
    }
}
