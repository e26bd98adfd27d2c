#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use belltower::error::AppResult;
use belltower::playback::{MediaBackend, MediaEvent, SessionToken};
use belltower::{Database, NewSchedule, WeekdayMask};
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Fresh on-disk database inside its own temp directory.
pub async fn create_test_database(dir: &TempDir) -> Database {
    let url = format!("sqlite:{}", dir.path().join("belltower-test.db").display());
    Database::open(&url).await.unwrap()
}

pub fn write_sound(dir: &Path, file_name: &str) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, b"RIFF....WAVE").unwrap();
    path
}

pub fn schedule(name: &str, mask: WeekdayMask, hour: u32, minute: u32, sound_id: i64) -> NewSchedule {
    NewSchedule {
        name: name.to_string(),
        weekday_mask: mask,
        hour,
        minute,
        sound_id,
        enabled: true,
    }
}

/// Records play requests; media events are emitted by the test.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    pub played: Arc<Mutex<Vec<(SessionToken, PathBuf, f32)>>>,
    pub stops: Arc<Mutex<usize>>,
    events: Arc<Mutex<Option<mpsc::UnboundedSender<MediaEvent>>>>,
}

impl ScriptedBackend {
    pub fn emit(&self, event: MediaEvent) {
        let events = self.events.lock().unwrap();
        events.as_ref().expect("nothing played yet").send(event).unwrap();
    }

    pub fn played_tokens(&self) -> Vec<SessionToken> {
        self.played.lock().unwrap().iter().map(|(t, _, _)| *t).collect()
    }
}

impl MediaBackend for ScriptedBackend {
    fn play(
        &mut self,
        session: SessionToken,
        path: &Path,
        gain: f32,
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> AppResult<()> {
        self.played.lock().unwrap().push((session, path.to_path_buf(), gain));
        *self.events.lock().unwrap() = Some(events);
        Ok(())
    }

    fn stop(&mut self) {
        *self.stops.lock().unwrap() += 1;
    }

    fn release(&mut self) -> AppResult<()> {
        Ok(())
    }
}
