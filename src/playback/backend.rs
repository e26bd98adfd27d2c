use rodio::{Decoder, OutputStream, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use log::{debug, error, warn};
use anyhow::{Context, Result};
use tokio::sync::mpsc;

use super::{MediaEvent, SessionToken};
use crate::error::AppResult;

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Media player driven by the playback service.
///
/// Implementations report progress for a session through `events`, tagged
/// with the session token they were started with.
pub trait MediaBackend: Send + 'static {
    fn play(
        &mut self,
        session: SessionToken,
        path: &Path,
        gain: f32,
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> AppResult<()>;

    /// Stops whatever is playing. No-op when idle.
    fn stop(&mut self);

    /// Frees the output device. Called once on teardown.
    fn release(&mut self) -> AppResult<()>;
}

/// The running session's sink, reachable from `stop()` on the caller's thread.
#[derive(Default)]
struct SharedSink(Mutex<Option<Arc<Sink>>>);

impl SharedSink {
    /// Publishes the sink unless the session was already stopped.
    fn install(&self, sink: Arc<Sink>, stop: &AtomicBool) -> bool {
        let mut slot = self.0.lock().unwrap_or_else(|e| e.into_inner());
        if stop.load(Ordering::SeqCst) {
            return false;
        }
        *slot = Some(sink);
        true
    }

    /// Silences the sink right away. The playback thread notices the stop
    /// flag on its next poll and drops the output stream.
    fn halt(&self) {
        let sink = self.0.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(sink) = sink {
            sink.stop();
        }
    }
}

struct ActivePlayback {
    session: SessionToken,
    stop: Arc<AtomicBool>,
    sink: Arc<SharedSink>,
}

/// Plays files through the default output device with rodio.
#[derive(Default)]
pub struct RodioBackend {
    current: Option<ActivePlayback>,
}

impl RodioBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn play_blocking(
        path: &Path,
        gain: f32,
        stop: &AtomicBool,
        shared: &SharedSink,
        on_start: impl FnOnce(),
    ) -> Result<bool> {
        // OutputStream is not Send, so it lives on this thread for the whole session
        let (_stream, stream_handle) = OutputStream::try_default()
            .context("Failed to create audio output stream")?;

        let file = File::open(path)
            .with_context(|| format!("Failed to open sound file {:?}", path))?;
        let source = Decoder::new(BufReader::new(file))
            .context("Failed to decode sound file")?
            .convert_samples::<f32>()
            .amplify(gain);

        let sink = Arc::new(Sink::try_new(&stream_handle)?);
        if !shared.install(sink.clone(), stop) {
            return Ok(false);
        }
        sink.append(source);
        on_start();

        while !sink.empty() {
            if stop.load(Ordering::SeqCst) {
                sink.stop();
                return Ok(false);
            }
            std::thread::sleep(STOP_POLL_INTERVAL);
        }

        Ok(true)
    }
}

impl MediaBackend for RodioBackend {
    fn play(
        &mut self,
        session: SessionToken,
        path: &Path,
        gain: f32,
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> AppResult<()> {
        self.stop();

        let stop = Arc::new(AtomicBool::new(false));
        let sink = Arc::new(SharedSink::default());
        let path: PathBuf = path.to_path_buf();
        let flag = stop.clone();
        let shared = sink.clone();

        debug!("Starting session {:?} for {:?} at gain {:.2}", session, path, gain);
        tokio::task::spawn_blocking(move || {
            let started = events.clone();
            let outcome = Self::play_blocking(&path, gain, &flag, &shared, move || {
                let _ = started.send(MediaEvent::Started(session));
            });
            let event = match outcome {
                Ok(true) => MediaEvent::Ended(session),
                Ok(false) => return,
                Err(e) => {
                    error!("Failed to play sound {:?}: {:#}", path, e);
                    MediaEvent::Failed(session, e.to_string())
                }
            };
            if events.send(event).is_err() {
                debug!("Playback service gone before session {:?} finished", session);
            }
        });

        self.current = Some(ActivePlayback { session, stop, sink });
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(active) = self.current.take() {
            debug!("Stopping session {:?}", active.session);
            active.stop.store(true, Ordering::SeqCst);
            active.sink.halt();
        }
    }

    fn release(&mut self) -> AppResult<()> {
        if self.current.is_some() {
            warn!("Releasing audio backend while a session is active");
        }
        self.stop();
        Ok(())
    }
}

impl Drop for RodioBackend {
    fn drop(&mut self) {
        self.stop();
    }
}
