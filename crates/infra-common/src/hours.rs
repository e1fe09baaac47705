//! Business-hours schedules
//!
//! A [`BusinessHours`] value is a predicate over instants: does this moment
//! fall inside the tenant's (or department's) working window? Timezone
//! conversion happens at the edge; the predicate itself compares wall-clock
//! components of the instant it is handed.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Working-hours window with a set of business days.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessHours {
    /// IANA timezone label, advisory only
    pub timezone: String,
    /// Start hour, 0-23
    pub start_hour: u32,
    /// Start minute, 0-59
    pub start_minute: u32,
    /// End hour, 0-23
    pub end_hour: u32,
    /// End minute, 0-59
    pub end_minute: u32,
    /// Days of the week that count as business days
    pub business_days: Vec<Weekday>,
}

impl Default for BusinessHours {
    fn default() -> Self {
        BusinessHours {
            timezone: "UTC".to_string(),
            start_hour: 9,
            start_minute: 0,
            end_hour: 17,
            end_minute: 0,
            business_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }
}

impl BusinessHours {
    /// Round-the-clock schedule, used by tenants with no hours policy.
    pub fn always() -> Self {
        BusinessHours {
            timezone: "UTC".to_string(),
            start_hour: 0,
            start_minute: 0,
            end_hour: 23,
            end_minute: 59,
            business_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
                Weekday::Sat,
                Weekday::Sun,
            ],
        }
    }

    /// Whether the given instant falls on a business day inside the window.
    pub fn is_business_time(&self, at: DateTime<Utc>) -> bool {
        if !self.business_days.contains(&at.weekday()) {
            return false;
        }
        let minute_of_day = at.hour() * 60 + at.minute();
        let start = self.start_hour * 60 + self.start_minute;
        let end = self.end_hour * 60 + self.end_minute;
        minute_of_day >= start && minute_of_day <= end
    }

    /// Minutes from the start of day to the opening of the window.
    pub fn open_minute(&self) -> u32 {
        self.start_hour * 60 + self.start_minute
    }

    /// Minutes from the start of day to the close of the window.
    pub fn close_minute(&self) -> u32 {
        self.end_hour * 60 + self.end_minute
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
    fn weekday_inside_window_is_business_time() {
        let hours = BusinessHours::default();
        // 2024-03-06 is a Wednesday
        assert!(hours.is_business_time(at(2024, 3, 6, 10, 30)));
    }

    #[test]
    fn weekend_is_not_business_time() {
        let hours = BusinessHours::default();
        // 2024-03-09 is a Saturday
        assert!(!hours.is_business_time(at(2024, 3, 9, 10, 30)));
    }

    #[test]
    fn outside_window_is_not_business_time() {
        let hours = BusinessHours::default();
        assert!(!hours.is_business_time(at(2024, 3, 6, 8, 59)));
        assert!(!hours.is_business_time(at(2024, 3, 6, 17, 1)));
    }

    #[test]
    fn always_accepts_midnight_sunday() {
        let hours = BusinessHours::always();
        assert!(hours.is_business_time(at(2024, 3, 10, 0, 0)));
    }
}
