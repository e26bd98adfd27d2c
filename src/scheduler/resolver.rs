//! Next-occurrence resolution for weekly schedules.
//!
//! Everything here is pure: callers pass "now" and the enabled schedule set,
//! and get back computed occurrences. Wall-clock arithmetic happens in the
//! time zone carried by `now`.

use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, Local, LocalResult, NaiveDate, Offset, TimeZone, Utc,
};

use crate::error::{AppError, AppResult};
use crate::models::{Occurrence, Schedule};

/// Days scanned by [`compute_next`]. Offset 7 catches "same weekday, already passed".
const NEXT_SCAN_DAYS: i64 = 7;
/// Days scanned by [`list_upcoming`]: today and tomorrow.
const UPCOMING_SCAN_DAYS: i64 = 1;

/// Earliest occurrence strictly after `now`, or `None` when no schedule is
/// enabled with a non-empty weekday mask.
pub fn compute_next<Tz: TimeZone>(now: &DateTime<Tz>, schedules: &[Schedule]) -> Option<Occurrence> {
    let armable: Vec<&Schedule> = schedules.iter().filter(|s| s.is_armable()).collect();
    if armable.is_empty() {
        return None;
    }

    let tz = now.timezone();
    let now_utc = now.with_timezone(&Utc);
    let today = now.date_naive();

    for offset in 0..=NEXT_SCAN_DAYS {
        let day = today + Duration::days(offset);
        let best = candidates_on(&tz, day, &armable)
            .filter(|o| offset > 0 || o.run_at > now_utc)
            .min_by_key(|o| o.run_at);

        if best.is_some() {
            return best;
        }
    }

    None
}

/// Occurrences today and tomorrow with `now < run_at < horizon`, ascending,
/// at most `limit` of them.
pub fn list_upcoming<Tz: TimeZone>(
    now: &DateTime<Tz>,
    horizon: DateTime<Utc>,
    limit: usize,
    schedules: &[Schedule],
) -> Vec<Occurrence> {
    let armable: Vec<&Schedule> = schedules.iter().filter(|s| s.is_armable()).collect();
    if armable.is_empty() || limit == 0 {
        return Vec::new();
    }

    let tz = now.timezone();
    let now_utc = now.with_timezone(&Utc);
    let today = now.date_naive();

    let mut out: Vec<Occurrence> = (0..=UPCOMING_SCAN_DAYS)
        .flat_map(|offset| {
            let day = today + Duration::days(offset);
            candidates_on(&tz, day, &armable).collect::<Vec<_>>()
        })
        .filter(|o| o.run_at > now_utc && o.run_at < horizon)
        .collect();

    out.sort_by_key(|o| o.run_at);
    out.truncate(limit);
    out
}

fn candidates_on<'a, Tz: TimeZone>(
    tz: &'a Tz,
    day: NaiveDate,
    schedules: &'a [&'a Schedule],
) -> impl Iterator<Item = Occurrence> + 'a {
    let weekday = day.weekday();
    schedules
        .iter()
        .filter(move |s| s.weekday_mask.contains(weekday))
        .filter_map(move |s| {
            let run_at = local_instant(tz, day, s.hour, s.minute)?;
            Some(Occurrence {
                schedule_id: s.id,
                run_at,
                title: s.name.clone(),
                sound_id: s.sound_id,
            })
        })
}

/// Absolute instant of `hour:minute:00` on `day` in `tz`.
///
/// Ambiguous wall times (clocks turned back) take the earlier instant. Wall
/// times skipped by a forward transition are read with the offset in effect
/// before the gap, which lands them the same distance past the transition.
fn local_instant<Tz: TimeZone>(tz: &Tz, day: NaiveDate, hour: u32, minute: u32) -> Option<DateTime<Utc>> {
    let naive = day.and_hms_opt(hour, minute, 0)?;
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => Some(t.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            let before = tz.from_local_datetime(&(naive - Duration::hours(3))).earliest()?;
            let offset = before.offset().fix().local_minus_utc() as i64;
            Some(Utc.from_utc_datetime(&(naive - Duration::seconds(offset))))
        }
    }
}

/// Time zone used for wall-clock schedule arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zone {
    #[default]
    Local,
    Named(chrono_tz::Tz),
}

impl Zone {
    /// `None` or an empty name selects the system zone.
    pub fn parse(name: Option<&str>) -> AppResult<Self> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            None => Ok(Zone::Local),
            Some(name) => chrono_tz::Tz::from_str(name)
                .map(Zone::Named)
                .map_err(|_| AppError::config(format!("unknown time zone '{name}'"))),
        }
    }

    pub fn compute_next(&self, now: DateTime<Utc>, schedules: &[Schedule]) -> Option<Occurrence> {
        match self {
            Zone::Local => compute_next(&now.with_timezone(&Local), schedules),
            Zone::Named(tz) => compute_next(&now.with_timezone(tz), schedules),
        }
    }

    pub fn list_upcoming(
        &self,
        now: DateTime<Utc>,
        horizon: DateTime<Utc>,
        limit: usize,
        schedules: &[Schedule],
    ) -> Vec<Occurrence> {
        match self {
            Zone::Local => list_upcoming(&now.with_timezone(&Local), horizon, limit, schedules),
            Zone::Named(tz) => list_upcoming(&now.with_timezone(tz), horizon, limit, schedules),
        }
    }
}
