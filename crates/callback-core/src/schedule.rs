//! Callback scheduling windows
//!
//! Maps a caller's preferred time onto the nearest slot a department or
//! agent can actually take the call: next 15-minute boundary inside
//! business hours, walking forward day by day up to the advance limit.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use voicedesk_infra_common::BusinessHours;

/// Slot granularity in minutes
const SLOT_MINUTES: u32 = 15;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackSchedule {
    pub hours: BusinessHours,
    /// Minimum notice before a callback can run
    pub min_advance_minutes: i64,
    /// How far ahead scheduling may reach
    pub max_advance_days: i64,
}

impl Default for CallbackSchedule {
    fn default() -> Self {
        CallbackSchedule {
            hours: BusinessHours::default(),
            min_advance_minutes: 30,
            max_advance_days: 7,
        }
    }
}

impl CallbackSchedule {
    pub fn new(hours: BusinessHours) -> Self {
        CallbackSchedule {
            hours,
            ..Default::default()
        }
    }

    /// Next available 15-minute slot at or after `after`.
    ///
    /// Walks forward in slot steps, skipping non-business days and
    /// out-of-window times, for at most `max_advance_days`. `None` when no
    /// slot fits inside the horizon.
    pub fn next_available_slot(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let earliest = after + Duration::minutes(self.min_advance_minutes);
        let mut candidate = round_up_to_slot(earliest);
        let horizon = earliest + Duration::days(self.max_advance_days);

        while candidate <= horizon {
            if self.hours.is_business_time(candidate) {
                return Some(candidate);
            }
            candidate += Duration::minutes(SLOT_MINUTES as i64);
        }
        None
    }
}

/// Round up to the next 15-minute boundary, zeroing seconds.
fn round_up_to_slot(at: DateTime<Utc>) -> DateTime<Utc> {
    let trimmed = at
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(at);
    let minute = trimmed.minute();
    let remainder = minute % SLOT_MINUTES;
    if remainder == 0 && trimmed == at {
        trimmed
    } else {
        trimmed + Duration::minutes((SLOT_MINUTES - remainder) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn rounds_to_quarter_hour() {
        assert_eq!(round_up_to_slot(at(2024, 3, 6, 10, 7)), at(2024, 3, 6, 10, 15));
        assert_eq!(round_up_to_slot(at(2024, 3, 6, 10, 15)), at(2024, 3, 6, 10, 15));
        assert_eq!(round_up_to_slot(at(2024, 3, 6, 10, 59)), at(2024, 3, 6, 11, 0));
    }

    #[test]
    fn slot_lands_inside_business_hours() {
        let schedule = CallbackSchedule::default();
        // Wednesday 10:00 + 30 min notice -> 10:30
        let slot = schedule.next_available_slot(at(2024, 3, 6, 10, 0)).unwrap();
        assert_eq!(slot, at(2024, 3, 6, 10, 30));
        assert!(schedule.hours.is_business_time(slot));
    }

    #[test]
    fn evening_request_rolls_to_next_morning() {
        let schedule = CallbackSchedule::default();
        // Wednesday 20:00 -> Thursday 09:00
        let slot = schedule.next_available_slot(at(2024, 3, 6, 20, 0)).unwrap();
        assert_eq!(slot, at(2024, 3, 7, 9, 0));
    }

    #[test]
    fn friday_evening_rolls_over_the_weekend() {
        let schedule = CallbackSchedule::default();
        // Friday 2024-03-08 18:00 -> Monday 09:00
        let slot = schedule.next_available_slot(at(2024, 3, 8, 18, 0)).unwrap();
        assert_eq!(slot, at(2024, 3, 11, 9, 0));
    }

    #[test]
    fn no_slot_when_no_business_days_in_horizon() {
        let mut schedule = CallbackSchedule::default();
        schedule.hours.business_days.clear();
        assert!(schedule.next_available_slot(at(2024, 3, 6, 10, 0)).is_none());
    }
}
