use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::dispatcher::AlarmDispatcher;
use super::host::WakeEvent;
use crate::clock::Clock;
use crate::database::Database;
use crate::error::AppResult;
use crate::models::{NewRingLog, PlaybackInfo, RingResult};
use crate::playback::PlaybackHandle;
use crate::utils::logging::log_ring_event;

/// Upper bound on one firing's work.
pub const RING_BUDGET: Duration = Duration::from_secs(10);

/// A firing later than this after its slot is recorded as missed, not rung.
pub const MISSED_AFTER: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingOutcome {
    /// Sound handed to playback and the next bell re-armed.
    Rang,
    /// Fired too late to ring; logged and re-armed.
    Missed,
    /// Suppressed by a skip-once override.
    Skipped,
    /// Sound file missing or playback gone.
    Failed,
    /// Schedule deleted or disabled after arming.
    Obsolete,
    /// Same firing delivered twice.
    Duplicate,
}

/// Reacts to wake-timer firings: play, then re-arm.
pub struct RingHandler {
    db: Arc<Database>,
    dispatcher: Arc<AlarmDispatcher>,
    playback: PlaybackHandle,
    clock: Arc<dyn Clock>,
    sounds_dir: PathBuf,
    budget: Duration,
    missed_after: Duration,
    pending: TaskTracker,
    last_handled: Mutex<Option<WakeEvent>>,
}

impl RingHandler {
    pub fn new(
        db: Arc<Database>,
        dispatcher: Arc<AlarmDispatcher>,
        playback: PlaybackHandle,
        clock: Arc<dyn Clock>,
        sounds_dir: PathBuf,
    ) -> Self {
        Self {
            db,
            dispatcher,
            playback,
            clock,
            sounds_dir,
            budget: RING_BUDGET,
            missed_after: MISSED_AFTER,
            pending: TaskTracker::new(),
            last_handled: Mutex::new(None),
        }
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// How late a firing may be and still ring.
    pub fn with_missed_after(mut self, missed_after: Duration) -> Self {
        self.missed_after = missed_after;
        self
    }

    /// Entry point from the timer host. Returns immediately; the work runs
    /// on its own task while a pending-completion token is held.
    pub fn on_fire(self: &Arc<Self>, event: WakeEvent) {
        let token = self.pending.token();
        let handler = Arc::clone(self);

        tokio::spawn(async move {
            let _pending = token;
            match tokio::time::timeout(handler.budget, handler.handle(&event)).await {
                Ok(Ok(outcome)) => log_ring_event(event.schedule_id, event.at, outcome),
                Ok(Err(e)) => error!(
                    "Ring for schedule {} failed: {}",
                    event.schedule_id,
                    e.to_safe_string()
                ),
                Err(_) => warn!(
                    "Ring for schedule {} exceeded {:?}; abandoned",
                    event.schedule_id, handler.budget
                ),
            }
        });
    }

    /// Plays the schedule's sound and re-arms. Idempotent per firing.
    ///
    /// Re-arming starts after `event.at`, so a clock that still reads before
    /// the slot cannot arm the same slot again.
    pub async fn handle(&self, event: &WakeEvent) -> AppResult<RingOutcome> {
        if !self.claim(event) {
            debug!("Duplicate ring for schedule {} at {}", event.schedule_id, event.at);
            return Ok(RingOutcome::Duplicate);
        }

        let Some(info) = self
            .db
            .sound_playback_info(event.schedule_id, &self.sounds_dir)
            .await?
        else {
            debug!("Schedule {} gone or disabled; ring ignored", event.schedule_id);
            return Ok(RingOutcome::Obsolete);
        };

        // Negative lateness (clock behind the slot) is not late
        let late = (self.clock.now() - event.at)
            .to_std()
            .ok()
            .filter(|late| *late > self.missed_after);
        let (outcome, detail) = if let Some(late) = late {
            (RingOutcome::Missed, format!("late={}s", late.as_secs()))
        } else if self.db.is_skipped(event.schedule_id, event.at).await? {
            (RingOutcome::Skipped, String::new())
        } else if !info.path.is_file() {
            (RingOutcome::Failed, format!("missing sound file {}", info.path.display()))
        } else if !self
            .playback
            .play(info.path.clone(), info.name.clone(), info.volume_percent)
        {
            (RingOutcome::Failed, "playback service stopped".to_string())
        } else {
            (RingOutcome::Rang, String::new())
        };

        self.record(event, &info, outcome, detail).await;
        self.dispatcher.reschedule_after(event.at).await?;
        Ok(outcome)
    }

    async fn record(&self, event: &WakeEvent, info: &PlaybackInfo, outcome: RingOutcome, detail: String) {
        let result = match outcome {
            RingOutcome::Rang => RingResult::Played,
            RingOutcome::Missed => RingResult::Missed,
            RingOutcome::Skipped => RingResult::Skipped,
            RingOutcome::Failed => RingResult::Failed,
            RingOutcome::Obsolete | RingOutcome::Duplicate => return,
        };
        if result != RingResult::Played {
            info!("Schedule {} {} for {} {}", event.schedule_id, result, event.at, detail);
        }

        let entry = NewRingLog {
            occurred_at: self.clock.now(),
            schedule_id: event.schedule_id,
            scheduled_for: event.at,
            schedule_name: info.schedule_name.clone(),
            sound_name: info.name.clone(),
            result,
            detail,
        };
        if let Err(e) = self.db.insert_ring_log(&entry).await {
            warn!("Could not record ring history: {}", e.to_safe_string());
        }
    }

    fn claim(&self, event: &WakeEvent) -> bool {
        let mut last = self.last_handled.lock().unwrap_or_else(|e| e.into_inner());
        if last.as_ref() == Some(event) {
            return false;
        }
        *last = Some(event.clone());
        true
    }

    /// Resolves once no firing is in flight.
    pub async fn wait_idle(&self) {
        self.pending.close();
        self.pending.wait().await;
        self.pending.reopen();
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }
}

/// Feeds timer firings into the handler until `shutdown` is cancelled.
pub async fn run_ring_listener(
    handler: Arc<RingHandler>,
    mut events: mpsc::UnboundedReceiver<WakeEvent>,
    shutdown: CancellationToken,
) {
    info!("Ring listener started");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => handler.on_fire(event),
                None => break,
            },
            _ = shutdown.cancelled() => break,
        }
    }
    info!("Ring listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::database::tests::create_test_database;
    use crate::models::{NewSchedule, WeekdayMask};
    use crate::playback::PlaybackAction;
    use crate::scheduler::host::MockAlarmHost;
    use crate::scheduler::resolver::Zone;
    use crate::status::StatusStore;
    use chrono::{DateTime, TimeZone, Utc};

    struct Fixture {
        handler: Arc<RingHandler>,
        dispatcher: Arc<AlarmDispatcher>,
        db: Arc<Database>,
        clock: Arc<ManualClock>,
        actions: mpsc::UnboundedReceiver<PlaybackAction>,
        schedule_id: i64,
        sounds: tempfile::TempDir,
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    async fn fixture(host: MockAlarmHost) -> Fixture {
        let sounds = tempfile::TempDir::new().unwrap();
        std::fs::write(sounds.path().join("gong.wav"), b"riff").unwrap();

        let db = Arc::new(create_test_database().await);
        let sound_id = db.insert_sound("Gong", "gong.wav", 80, false).await.unwrap();
        let schedule_id = db
            .insert_schedule(&NewSchedule {
                name: "Lunch".into(),
                weekday_mask: WeekdayMask::EVERY_DAY,
                hour: 12,
                minute: 0,
                sound_id,
                enabled: true,
            })
            .await
            .unwrap();

        let (playback, actions) = PlaybackHandle::channel();
        let clock = Arc::new(ManualClock::new(noon()));
        let dispatcher = Arc::new(AlarmDispatcher::new(
            db.clone(),
            Arc::new(host),
            StatusStore::default(),
            playback.clone(),
            clock.clone(),
            Zone::Named(chrono_tz::Tz::UTC),
        ));
        let handler = Arc::new(RingHandler::new(
            db.clone(),
            dispatcher.clone(),
            playback,
            clock.clone(),
            sounds.path().to_path_buf(),
        ));

        Fixture {
            handler,
            dispatcher,
            db,
            clock,
            actions,
            schedule_id,
            sounds,
        }
    }

    fn exact_host(arms: usize) -> MockAlarmHost {
        let mut host = MockAlarmHost::new();
        host.expect_can_schedule_exact().return_const(true);
        host.expect_arm_exact().times(arms).returning(|_| Ok(()));
        host
    }

    fn fired(schedule_id: i64) -> WakeEvent {
        WakeEvent {
            schedule_id,
            at: noon(),
        }
    }

    fn plays(actions: &mut mpsc::UnboundedReceiver<PlaybackAction>) -> usize {
        std::iter::from_fn(|| actions.try_recv().ok())
            .filter(|a| matches!(a, PlaybackAction::Play { .. }))
            .count()
    }

    #[tokio::test]
    async fn test_ring_plays_then_rearms() {
        let mut f = fixture(exact_host(1)).await;

        let outcome = f.handler.handle(&fired(f.schedule_id)).await.unwrap();
        assert_eq!(outcome, RingOutcome::Rang);

        let expected = PlaybackAction::Play {
            path: f.sounds.path().join("gong.wav"),
            name: "Gong".into(),
            volume_percent: 80,
        };
        assert_eq!(f.actions.try_recv().unwrap(), expected);
        assert_eq!(f.actions.try_recv().unwrap(), PlaybackAction::Start);

        let history = f.db.list_ring_logs(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].result, RingResult::Played);
        assert_eq!(history[0].schedule_name, "Lunch");
        assert_eq!(history[0].sound_name, "Gong");
        assert_eq!(history[0].scheduled_for, noon());
    }

    #[tokio::test]
    async fn test_duplicate_firing_is_ignored() {
        let mut f = fixture(exact_host(1)).await;
        let event = fired(f.schedule_id);

        assert_eq!(f.handler.handle(&event).await.unwrap(), RingOutcome::Rang);
        assert_eq!(f.handler.handle(&event).await.unwrap(), RingOutcome::Duplicate);

        assert_eq!(plays(&mut f.actions), 1);
        assert_eq!(f.db.list_ring_logs(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_clock_behind_slot_rearms_past_it() {
        let tomorrow_noon = noon() + chrono::Duration::days(1);
        let mut host = MockAlarmHost::new();
        host.expect_can_schedule_exact().return_const(true);
        host.expect_arm_exact()
            .withf(move |r| r.at == tomorrow_noon)
            .times(1)
            .returning(|_| Ok(()));
        let mut f = fixture(host).await;
        f.clock.set(noon() - chrono::Duration::seconds(1));

        let event = fired(f.schedule_id);
        assert_eq!(f.handler.handle(&event).await.unwrap(), RingOutcome::Rang);
        assert_eq!(f.handler.handle(&event).await.unwrap(), RingOutcome::Duplicate);

        assert_eq!(plays(&mut f.actions), 1);
    }

    #[tokio::test]
    async fn test_late_firing_is_missed_not_rung() {
        let mut f = fixture(exact_host(1)).await;
        f.clock.set(noon() + chrono::Duration::minutes(10));

        let outcome = f.handler.handle(&fired(f.schedule_id)).await.unwrap();
        assert_eq!(outcome, RingOutcome::Missed);
        assert_eq!(plays(&mut f.actions), 0);

        let history = f.db.list_ring_logs(10).await.unwrap();
        assert_eq!(history[0].result, RingResult::Missed);
        assert_eq!(history[0].detail, "late=600s");
        assert_eq!(history[0].occurred_at, noon() + chrono::Duration::minutes(10));
    }

    #[tokio::test]
    async fn test_small_delay_still_rings() {
        let mut f = fixture(exact_host(1)).await;
        f.clock.set(noon() + chrono::Duration::seconds(3));

        let outcome = f.handler.handle(&fired(f.schedule_id)).await.unwrap();
        assert_eq!(outcome, RingOutcome::Rang);
        assert_eq!(plays(&mut f.actions), 1);
    }

    #[tokio::test]
    async fn test_skipped_occurrence_stays_silent() {
        let mut f = fixture(exact_host(1)).await;
        f.db.add_skip(f.schedule_id, noon()).await.unwrap();

        let outcome = f.handler.handle(&fired(f.schedule_id)).await.unwrap();
        assert_eq!(outcome, RingOutcome::Skipped);
        assert_eq!(plays(&mut f.actions), 0);
        assert_eq!(f.db.list_ring_logs(1).await.unwrap()[0].result, RingResult::Skipped);
    }

    #[tokio::test]
    async fn test_missing_sound_file_is_recorded_as_failed() {
        let mut f = fixture(exact_host(1)).await;
        std::fs::remove_file(f.sounds.path().join("gong.wav")).unwrap();

        let outcome = f.handler.handle(&fired(f.schedule_id)).await.unwrap();
        assert_eq!(outcome, RingOutcome::Failed);
        assert_eq!(plays(&mut f.actions), 0);

        let history = f.db.list_ring_logs(1).await.unwrap();
        assert_eq!(history[0].result, RingResult::Failed);
        assert!(history[0].detail.starts_with("missing sound file"));
    }

    #[tokio::test]
    async fn test_disabled_schedule_does_nothing() {
        let mut f = fixture(exact_host(0)).await;
        f.db.set_schedule_enabled(f.schedule_id, false).await.unwrap();

        let outcome = f.handler.handle(&fired(f.schedule_id)).await.unwrap();
        assert_eq!(outcome, RingOutcome::Obsolete);
        assert!(f.actions.try_recv().is_err());

        let missing = f.handler.handle(&fired(9999)).await.unwrap();
        assert_eq!(missing, RingOutcome::Obsolete);
        assert!(f.db.list_ring_logs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_on_fire_releases_pending_token() {
        let mut f = fixture(exact_host(1)).await;

        f.handler.on_fire(fired(f.schedule_id));
        tokio::time::timeout(Duration::from_secs(5), f.handler.wait_idle())
            .await
            .unwrap();
        assert_eq!(f.handler.in_flight(), 0);
        assert!(matches!(f.actions.try_recv().unwrap(), PlaybackAction::Play { .. }));
    }

    #[tokio::test]
    async fn test_firing_over_budget_is_abandoned() {
        let f = fixture(exact_host(0)).await;
        let handler = Arc::new(
            RingHandler::new(
                f.db.clone(),
                f.dispatcher.clone(),
                PlaybackHandle::channel().0,
                f.clock.clone(),
                f.sounds.path().to_path_buf(),
            )
            .with_budget(Duration::from_millis(50)),
        );

        // Re-arming blocks while the dispatcher is held elsewhere
        let _held = f.dispatcher.hold_arming().await;
        handler.on_fire(fired(f.schedule_id));
        tokio::time::timeout(Duration::from_secs(5), handler.wait_idle())
            .await
            .unwrap();
        assert_eq!(handler.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_listener_stops_on_cancel() {
        let f = fixture(exact_host(0)).await;
        let (_tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(run_ring_listener(f.handler.clone(), rx, shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }
}
