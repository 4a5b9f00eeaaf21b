use chrono::{DateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::{DaySet, Schedule, ScheduleSet};
use crate::error::ScheduleError;

/// One element of a schedules document, as the host application writes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRecord {
    pub id: String,
    pub is_enabled: bool,
    pub app_package_names: Vec<String>,
    pub schedule_config: ScheduleConfigRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfigRecord {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Monday first.
    pub selected_days: Vec<bool>,
}

/// Parses a schedules document, resolving the UTC start and end instants to
/// wall-clock minutes in `tz`. Any invalid element rejects the whole document.
pub fn parse_document_in<Tz: TimeZone>(
    document: &str,
    tz: &Tz,
) -> Result<ScheduleSet, ScheduleError> {
    let records: Vec<ScheduleRecord> = serde_json::from_str(document)?;
    let schedules = records
        .into_iter()
        .enumerate()
        .map(|(position, record)| to_schedule(position, record, tz))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ScheduleSet::new(schedules))
}

fn to_schedule<Tz: TimeZone>(
    position: usize,
    record: ScheduleRecord,
    tz: &Tz,
) -> Result<Schedule, ScheduleError> {
    if record.id.trim().is_empty() {
        return Err(ScheduleError::MissingId(position));
    }

    let config = record.schedule_config;
    let flags: [bool; 7] = config
        .selected_days
        .as_slice()
        .try_into()
        .map_err(|_| ScheduleError::DayCount {
            id: record.id.clone(),
            len: config.selected_days.len(),
        })?;

    Ok(Schedule {
        id: record.id,
        enabled: record.is_enabled,
        app_ids: record.app_package_names.into_iter().collect(),
        start_minute: local_minute_of_day(&config.start_time, tz),
        end_minute: local_minute_of_day(&config.end_time, tz),
        active_days: DaySet::from_flags(flags),
    })
}

fn local_minute_of_day<Tz: TimeZone>(instant: &DateTime<Utc>, tz: &Tz) -> u32 {
    let local = instant.with_timezone(tz);
    local.hour() * 60 + local.minute()
}
