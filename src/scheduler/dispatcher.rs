use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::sync::Mutex;

use super::host::{AlarmHost, TimerId, WakeRequest};
use super::resolver::Zone;
use crate::clock::Clock;
use crate::database::Database;
use crate::error::{AppError, AppResult};
use crate::models::Occurrence;
use crate::playback::PlaybackHandle;
use crate::status::StatusStore;

// Bounds the skip walk when every upcoming slot was skipped
const MAX_SKIPPED_IN_A_ROW: usize = 64;

/// Keeps exactly one wake timer armed for the next bell.
pub struct AlarmDispatcher {
    db: Arc<Database>,
    host: Arc<dyn AlarmHost>,
    status: StatusStore,
    playback: PlaybackHandle,
    clock: Arc<dyn Clock>,
    zone: Zone,
    // Serializes resolve + arm so concurrent callers converge on one timer
    arming: Mutex<()>,
    prompt_pending: AtomicBool,
    prompt_surfaced: AtomicBool,
}

impl AlarmDispatcher {
    pub fn new(
        db: Arc<Database>,
        host: Arc<dyn AlarmHost>,
        status: StatusStore,
        playback: PlaybackHandle,
        clock: Arc<dyn Clock>,
        zone: Zone,
    ) -> Self {
        Self {
            db,
            host,
            status,
            playback,
            clock,
            zone,
            arming: Mutex::new(()),
            prompt_pending: AtomicBool::new(false),
            prompt_surfaced: AtomicBool::new(false),
        }
    }

    /// Resolves the next occurrence, publishes it and arms the wake timer.
    ///
    /// Calling it twice in a row leaves the same single timer armed.
    pub async fn reschedule_next(&self) -> AppResult<Option<Occurrence>> {
        self.reschedule_after(self.clock.now()).await
    }

    /// Like `reschedule_next`, but never arms anything at or before `floor`.
    ///
    /// The ring handler passes the slot it just handled so a wall clock that
    /// still reads before that slot cannot re-arm it.
    pub async fn reschedule_after(&self, floor: DateTime<Utc>) -> AppResult<Option<Occurrence>> {
        let _arming = self.arming.lock().await;
        self.rearm(floor.max(self.clock.now())).await
    }

    /// Skips the currently armed bell once and arms the one after it.
    pub async fn skip_next(&self) -> AppResult<Option<Occurrence>> {
        let _arming = self.arming.lock().await;

        let now = self.clock.now();
        let Some(skipped) = self.resolve_after(now).await? else {
            debug!("Nothing upcoming to skip");
            return self.rearm(now).await;
        };
        self.db.add_skip(skipped.schedule_id, skipped.run_at).await?;
        info!("Skipping '{}' at {} once", skipped.title, skipped.run_at);

        self.rearm(now).await
    }

    async fn rearm(&self, floor: DateTime<Utc>) -> AppResult<Option<Occurrence>> {
        let Some(next) = self.resolve_after(floor).await? else {
            self.host.cancel(TimerId::NextRing);
            self.status.clear_next();
            self.playback.start();
            info!("No upcoming bell; wake timer cleared");
            return Ok(None);
        };

        let sound_name = self.db.sound_name(next.sound_id).await?;
        self.status.set_next(next.run_at, &next.title, &sound_name);
        self.arm(&next)?;
        self.playback.start();

        info!(
            "Next bell '{}' (schedule {}) at {}",
            next.title, next.schedule_id, next.run_at
        );
        Ok(Some(next))
    }

    /// First occurrence strictly after `floor` that was not skipped.
    async fn resolve_after(&self, floor: DateTime<Utc>) -> AppResult<Option<Occurrence>> {
        let pruned = self.db.prune_skips(self.clock.now()).await?;
        if pruned > 0 {
            debug!("Forgot {} past skips", pruned);
        }

        let schedules = self.db.list_enabled_schedules().await?;
        let mut after = floor;
        for _ in 0..MAX_SKIPPED_IN_A_ROW {
            let Some(next) = self.zone.compute_next(after, &schedules) else {
                return Ok(None);
            };
            if !self.db.is_skipped(next.schedule_id, next.run_at).await? {
                return Ok(Some(next));
            }
            debug!("'{}' at {} is skipped", next.title, next.run_at);
            after = next.run_at;
        }
        warn!("More than {} skipped bells in a row; nothing armed", MAX_SKIPPED_IN_A_ROW);
        Ok(None)
    }

    fn arm(&self, next: &Occurrence) -> AppResult<()> {
        let request = WakeRequest {
            id: TimerId::NextRing,
            at: next.run_at,
            schedule_id: next.schedule_id,
            show_app: true,
        };

        if self.host.can_schedule_exact() {
            match self.host.arm_exact(request.clone()) {
                Ok(()) => return Ok(()),
                Err(AppError::PermissionDenied(reason)) => {
                    warn!("Exact wake timer refused ({}); falling back to inexact", reason)
                }
                Err(e) => return Err(e),
            }
        } else {
            warn!("Exact wake timers not permitted; arming inexact timer");
        }

        if !self.prompt_surfaced.load(Ordering::SeqCst) {
            self.prompt_pending.store(true, Ordering::SeqCst);
        }
        self.host.arm_inexact(request)
    }

    /// Disarms the wake timer. Safe to call when nothing is armed.
    pub fn cancel_next(&self) {
        self.host.cancel(TimerId::NextRing);
        debug!("Next bell timer cancelled");
    }

    /// True once after the first degraded (inexact) arm, so the caller can
    /// ask the user for exact-timer permission.
    pub fn take_permission_prompt(&self) -> bool {
        if self.prompt_pending.swap(false, Ordering::SeqCst) {
            self.prompt_surfaced.store(true, Ordering::SeqCst);
            return true;
        }
        false
    }

    /// The bell that would be armed now, without arming it.
    pub async fn compute_next(&self) -> AppResult<Option<Occurrence>> {
        self.resolve_after(self.clock.now()).await
    }

    pub async fn list_upcoming(&self, horizon: chrono::Duration, limit: usize) -> AppResult<Vec<Occurrence>> {
        let schedules = self.db.list_enabled_schedules().await?;
        let now = self.clock.now();
        Ok(self.zone.list_upcoming(now, now + horizon, limit, &schedules))
    }

    #[cfg(test)]
    pub(crate) async fn hold_arming(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.arming.lock().await
    }

    /// Explicit quit: nothing stays armed and `next` is cleared.
    pub async fn shutdown(&self) {
        let _arming = self.arming.lock().await;
        self.cancel_next();
        self.status.clear_next();
    }
}
