use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};

/// Re-acquire when less than this much of the ceiling is left.
const REFRESH_MARGIN_MINUTES: i64 = 5;

/// Bookkeeping for the keep-awake hold taken while the playback service runs.
///
/// This tracks and logs the hold; it does not talk to a host power manager.
/// Every hold expires after `ceiling`; the service tick re-acquires before
/// that. Holds are counted so nested acquire/release pairs stay balanced.
#[derive(Debug)]
pub struct WakeLock {
    tag: String,
    ceiling: Duration,
    holds: u32,
    expires_at: Option<DateTime<Utc>>,
}

impl WakeLock {
    pub fn new(tag: impl Into<String>, ceiling: Duration) -> Self {
        Self {
            tag: tag.into(),
            ceiling,
            holds: 0,
            expires_at: None,
        }
    }

    pub fn acquire(&mut self, now: DateTime<Utc>) {
        self.holds += 1;
        self.expires_at = Some(now + self.ceiling);
        debug!("Wake lock '{}' acquired (holds: {})", self.tag, self.holds);
    }

    pub fn release(&mut self) {
        match self.holds {
            0 => debug!("Wake lock '{}' already released", self.tag),
            1 => {
                self.holds = 0;
                self.expires_at = None;
                info!("Wake lock '{}' released", self.tag);
            }
            _ => self.holds -= 1,
        }
    }

    /// Drops every hold at once. Used on teardown.
    pub fn release_all(&mut self) {
        if self.holds > 0 {
            self.holds = 1;
            self.release();
        }
    }

    /// Extends the expiry when it is close. Returns true when it re-acquired.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        if expires_at - now > Duration::minutes(REFRESH_MARGIN_MINUTES) {
            return false;
        }
        if expires_at <= now {
            warn!("Wake lock '{}' lapsed before refresh", self.tag);
        }
        self.expires_at = Some(now + self.ceiling);
        debug!("Wake lock '{}' re-acquired until {}", self.tag, now + self.ceiling);
        true
    }

    pub fn is_held(&self, now: DateTime<Utc>) -> bool {
        self.holds > 0 && self.expires_at.map_or(false, |at| now < at)
    }

    pub fn holds(&self) -> u32 {
        self.holds
    }
}

impl Drop for WakeLock {
    fn drop(&mut self) {
        if self.holds > 0 {
            self.release_all();
        }
    }
}
