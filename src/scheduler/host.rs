//! Wake-timer facility used by the alarm dispatcher.
//!
//! A host delivers a [`WakeEvent`] at (exact) or somewhat after (inexact) the
//! requested instant. Registrations are keyed by a fixed [`TimerId`], so
//! arming again replaces the previous registration instead of adding one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// The single "next bell" registration.
    NextRing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeRequest {
    pub id: TimerId,
    pub at: DateTime<Utc>,
    pub schedule_id: i64,
    /// Surface the app when the user taps the host's alarm indicator.
    pub show_app: bool,
}

/// Delivered to the ring handler when an armed timer fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeEvent {
    pub schedule_id: i64,
    pub at: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
pub trait AlarmHost: Send + Sync {
    fn can_schedule_exact(&self) -> bool;

    /// Arms a precise timer. Fails with `PermissionDenied` when not granted.
    fn arm_exact(&self, request: WakeRequest) -> AppResult<()>;

    /// Arms a best-effort timer that may fire late.
    fn arm_inexact(&self, request: WakeRequest) -> AppResult<()>;

    /// Disarms `id`. No-op when nothing is armed.
    fn cancel(&self, id: TimerId);
}

struct Armed {
    request: WakeRequest,
    task: JoinHandle<()>,
}

/// Timer host backed by tokio sleeps inside the current runtime.
pub struct TokioAlarmHost {
    exact_allowed: AtomicBool,
    inexact_window: Duration,
    events: mpsc::UnboundedSender<WakeEvent>,
    armed: Mutex<HashMap<TimerId, Armed>>,
}

impl TokioAlarmHost {
    pub fn new(exact_allowed: bool, inexact_window: Duration) -> (Self, mpsc::UnboundedReceiver<WakeEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let host = Self {
            exact_allowed: AtomicBool::new(exact_allowed),
            inexact_window,
            events,
            armed: Mutex::new(HashMap::new()),
        };
        (host, rx)
    }

    /// Records that the user granted (or revoked) exact timers.
    pub fn grant_exact(&self, allowed: bool) {
        info!("Exact wake timers {}", if allowed { "granted" } else { "revoked" });
        self.exact_allowed.store(allowed, Ordering::SeqCst);
    }

    /// The pending registration under `id`, if it has not fired yet.
    pub fn pending(&self, id: TimerId) -> Option<WakeRequest> {
        let armed = self.armed.lock().unwrap_or_else(|e| e.into_inner());
        armed
            .get(&id)
            .filter(|a| !a.task.is_finished())
            .map(|a| a.request.clone())
    }

    fn arm(&self, request: WakeRequest, slack: Duration) -> AppResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| AppError::operation_failed("wake timers need a running tokio runtime"))?;

        let delay = (request.at - Utc::now()).to_std().unwrap_or(Duration::ZERO) + slack;
        let event = WakeEvent {
            schedule_id: request.schedule_id,
            at: request.at,
        };
        let tx = self.events.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(event).is_err() {
                debug!("Wake timer fired after the listener went away");
            }
        });

        let mut armed = self.armed.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = armed.insert(request.id, Armed { request, task }) {
            previous.task.abort();
        }
        Ok(())
    }
}

impl AlarmHost for TokioAlarmHost {
    fn can_schedule_exact(&self) -> bool {
        self.exact_allowed.load(Ordering::SeqCst)
    }

    fn arm_exact(&self, request: WakeRequest) -> AppResult<()> {
        if !self.can_schedule_exact() {
            return Err(AppError::permission_denied("exact wake timers are not granted"));
        }
        debug!("Arming exact timer for schedule {} at {}", request.schedule_id, request.at);
        self.arm(request, Duration::ZERO)
    }

    fn arm_inexact(&self, request: WakeRequest) -> AppResult<()> {
        debug!(
            "Arming inexact timer for schedule {} at {} (+{:?})",
            request.schedule_id, request.at, self.inexact_window
        );
        self.arm(request, self.inexact_window)
    }

    fn cancel(&self, id: TimerId) {
        let mut armed = self.armed.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = armed.remove(&id) {
            previous.task.abort();
            debug!("Cancelled wake timer {:?}", id);
        }
    }
}

impl Drop for TokioAlarmHost {
    fn drop(&mut self) {
        let armed = self.armed.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, entry) in armed.drain() {
            entry.task.abort();
        }
    }
}
