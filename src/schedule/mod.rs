use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Weekday};

pub mod document;
pub mod evaluator;
pub mod store;

pub use document::parse_document_in;
pub use evaluator::is_active;
pub use store::ScheduleStore;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// A point in local wall-clock time, reduced to what schedules look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    pub weekday: Weekday,
    pub minute_of_day: u32,
}

impl WallClock {
    pub fn new(weekday: Weekday, minute_of_day: u32) -> Self {
        Self {
            weekday,
            minute_of_day: minute_of_day % MINUTES_PER_DAY,
        }
    }

    pub fn from_datetime<Tz: TimeZone>(at: &DateTime<Tz>) -> Self {
        Self::new(at.weekday(), at.hour() * 60 + at.minute())
    }
}

/// Days of the week a schedule starts on, Monday first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DaySet([bool; 7]);

impl DaySet {
    pub const ALL: DaySet = DaySet([true; 7]);

    pub fn from_flags(flags: [bool; 7]) -> Self {
        Self(flags)
    }

    pub fn of(days: &[Weekday]) -> Self {
        let mut flags = [false; 7];
        for day in days {
            flags[day.num_days_from_monday() as usize] = true;
        }
        Self(flags)
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0[day.num_days_from_monday() as usize]
    }

    pub fn is_empty(&self) -> bool {
        !self.0.iter().any(|selected| *selected)
    }

    /// An empty selection means every day.
    pub fn or_all(self) -> Self {
        if self.is_empty() {
            Self::ALL
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub id: String,
    pub enabled: bool,
    pub app_ids: BTreeSet<String>,
    pub start_minute: u32,
    pub end_minute: u32,
    pub active_days: DaySet,
}

impl Schedule {
    pub fn is_overnight(&self) -> bool {
        self.start_minute > self.end_minute
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleSet {
    schedules: Vec<Schedule>,
}

impl ScheduleSet {
    /// Keeps only the enabled schedules.
    pub fn new(schedules: Vec<Schedule>) -> Self {
        Self {
            schedules: schedules.into_iter().filter(|s| s.enabled).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Schedule> {
        self.schedules.iter()
    }

    pub fn len(&self) -> usize {
        self.schedules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schedules.is_empty()
    }

    /// Apps covered by at least one schedule active at `now`.
    pub fn active_apps(&self, now: WallClock) -> BTreeSet<&str> {
        self.schedules
            .iter()
            .filter(|schedule| is_active(schedule, now))
            .flat_map(|schedule| schedule.app_ids.iter().map(String::as_str))
            .collect()
    }
}
