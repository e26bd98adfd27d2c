//! Process-wide status snapshot: the next armed bell and what is playing.
//!
//! `next` is written by the alarm dispatcher and `now` by the playback
//! service. The two halves are updated independently, so an observer may see
//! one of them fresher than the other.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::database::Database;
use crate::models::{NextStatus, NowStatus, StatusSnapshot};

#[derive(Clone)]
pub struct StatusStore {
    tx: Arc<watch::Sender<StatusSnapshot>>,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new(StatusSnapshot::default())
    }
}

impl StatusStore {
    pub fn new(initial: StatusSnapshot) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    pub fn set_next(&self, at: DateTime<Utc>, title: &str, sound_name: &str) {
        let next = NextStatus {
            at,
            title: title.to_string(),
            sound_name: sound_name.to_string(),
        };
        self.tx.send_if_modified(|snapshot| replace(&mut snapshot.next, Some(next)));
    }

    pub fn clear_next(&self) {
        self.tx.send_if_modified(|snapshot| replace(&mut snapshot.next, None));
    }

    pub fn get_next(&self) -> Option<NextStatus> {
        self.tx.borrow().next.clone()
    }

    pub fn set_now(&self, name: &str, playing: bool) {
        let now = NowStatus {
            name: name.to_string(),
            playing,
        };
        self.tx.send_if_modified(|snapshot| replace(&mut snapshot.now, Some(now)));
    }

    pub fn clear_now(&self) {
        self.tx.send_if_modified(|snapshot| replace(&mut snapshot.now, None));
    }

    pub fn get_now(&self) -> Option<NowStatus> {
        self.tx.borrow().now.clone()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }

    /// Receiver that wakes on every change to either half of the snapshot.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

/// Mirrors every snapshot change into the flat `status` table until cancelled.
pub async fn persist_changes(store: StatusStore, db: Arc<Database>, shutdown: CancellationToken) {
    let mut rx = store.subscribe();

    loop {
        let snapshot = rx.borrow_and_update().clone();
        if let Err(e) = db.save_status(&snapshot).await {
            warn!("Failed to persist status snapshot: {}", e.to_safe_string());
        } else {
            debug!("Persisted status snapshot");
        }

        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = shutdown.cancelled() => {
                // Flush whatever was written last before stopping
                let snapshot = rx.borrow().clone();
                if let Err(e) = db.save_status(&snapshot).await {
                    warn!("Failed to persist final status snapshot: {}", e.to_safe_string());
                }
                break;
            }
        }
    }

    debug!("Status persister stopped");
}
