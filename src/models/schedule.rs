// file: src/models/schedule.rs
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;

/// Seven-bit weekday set, Monday = bit 0 through Sunday = bit 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeekdayMask(u8);

impl WeekdayMask {
    pub const EMPTY: WeekdayMask = WeekdayMask(0);
    pub const MONDAY: WeekdayMask = WeekdayMask(1);
    pub const TUESDAY: WeekdayMask = WeekdayMask(1 << 1);
    pub const WEDNESDAY: WeekdayMask = WeekdayMask(1 << 2);
    pub const THURSDAY: WeekdayMask = WeekdayMask(1 << 3);
    pub const FRIDAY: WeekdayMask = WeekdayMask(1 << 4);
    pub const SATURDAY: WeekdayMask = WeekdayMask(1 << 5);
    pub const SUNDAY: WeekdayMask = WeekdayMask(1 << 6);
    pub const WEEKDAYS: WeekdayMask = WeekdayMask(0b001_1111);
    pub const EVERY_DAY: WeekdayMask = WeekdayMask(0b111_1111);

    pub fn new(bits: u8) -> Result<Self, AppError> {
        if bits > Self::EVERY_DAY.0 {
            return Err(AppError::validation(format!(
                "weekday mask {bits:#b} has bits outside Monday..Sunday"
            )));
        }
        Ok(Self(bits))
    }

    pub fn from_days(days: &[Weekday]) -> Self {
        days.iter()
            .fold(Self::EMPTY, |mask, day| Self(mask.0 | Self::bit(*day)))
    }

    /// Bit assigned to one calendar weekday.
    pub fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::ops::BitOr for WeekdayMask {
    type Output = WeekdayMask;

    fn bitor(self, rhs: Self) -> Self::Output {
        WeekdayMask(self.0 | rhs.0)
    }
}

impl TryFrom<i64> for WeekdayMask {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let bits = u8::try_from(value)
            .map_err(|_| AppError::validation(format!("weekday mask {value} out of range")))?;
        Self::new(bits)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Schedule {
    pub id: i64,
    pub name: String,
    #[sqlx(try_from = "i64")]
    pub weekday_mask: WeekdayMask,
    #[sqlx(try_from = "i64")]
    pub hour: u32,
    #[sqlx(try_from = "i64")]
    pub minute: u32,
    pub sound_id: i64,
    pub enabled: bool,
}

impl Schedule {
    /// Whether this schedule can ever produce an occurrence.
    pub fn is_armable(&self) -> bool {
        self.enabled && !self.weekday_mask.is_empty()
    }
}

/// Fields accepted when creating or updating a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSchedule {
    pub name: String,
    pub weekday_mask: WeekdayMask,
    pub hour: u32,
    pub minute: u32,
    pub sound_id: i64,
    pub enabled: bool,
}

impl NewSchedule {
    /// Checks the write-time invariants. Returns the trimmed name.
    pub fn validate(&self) -> Result<String, AppError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(AppError::validation("schedule name must not be blank"));
        }
        if self.weekday_mask.is_empty() {
            return Err(AppError::validation("weekday mask must not be empty"));
        }
        if self.hour > 23 {
            return Err(AppError::validation(format!("hour {} not in 0..=23", self.hour)));
        }
        if self.minute > 59 {
            return Err(AppError::validation(format!(
                "minute {} not in 0..=59",
                self.minute
            )));
        }
        if self.sound_id <= 0 {
            return Err(AppError::validation("schedule must reference a sound"));
        }
        Ok(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_schedule() -> NewSchedule {
        NewSchedule {
            name: " Morning ".to_string(),
            weekday_mask: WeekdayMask::WEEKDAYS,
            hour: 8,
            minute: 30,
            sound_id: 1,
            enabled: true,
        }
    }

    #[test]
    fn test_weekday_bits_follow_monday_first_order() {
        assert_eq!(WeekdayMask::bit(Weekday::Mon), 1);
        assert_eq!(WeekdayMask::bit(Weekday::Sat), 32);
        assert_eq!(WeekdayMask::bit(Weekday::Sun), 64);
        assert!(WeekdayMask::WEEKDAYS.contains(Weekday::Fri));
        assert!(!WeekdayMask::WEEKDAYS.contains(Weekday::Sat));
    }

    #[test]
    fn test_from_days() {
        let mask = WeekdayMask::from_days(&[Weekday::Mon, Weekday::Sun]);
        assert_eq!(mask.bits(), 0b100_0001);
        assert_eq!(mask, WeekdayMask::MONDAY | WeekdayMask::SUNDAY);
    }

    #[test]
    fn test_mask_rejects_eighth_bit() {
        assert!(WeekdayMask::new(0b1000_0000).is_err());
        assert!(WeekdayMask::try_from(-1).is_err());
        assert_eq!(WeekdayMask::try_from(127).unwrap(), WeekdayMask::EVERY_DAY);
    }

    #[test]
    fn test_validate_trims_name() {
        assert_eq!(new_schedule().validate().unwrap(), "Morning");
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let cases = [
            NewSchedule { name: "   ".into(), ..new_schedule() },
            NewSchedule { weekday_mask: WeekdayMask::EMPTY, ..new_schedule() },
            NewSchedule { hour: 24, ..new_schedule() },
            NewSchedule { minute: 60, ..new_schedule() },
            NewSchedule { sound_id: 0, ..new_schedule() },
        ];
        for case in cases {
            assert!(matches!(case.validate(), Err(AppError::Validation(_))), "{case:?}");
        }
    }
}
