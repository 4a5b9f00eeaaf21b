use super::{Schedule, WallClock};

/// Whether `schedule` is in force at `now`.
///
/// Overnight windows (`start > end`) belong to the day they start on: the
/// part after midnight is checked against the previous day's selection.
/// A zero-length window (`start == end`) is never active.
pub fn is_active(schedule: &Schedule, now: WallClock) -> bool {
    let days = schedule.active_days.or_all();
    let (start, end) = (schedule.start_minute, schedule.end_minute);
    let minute = now.minute_of_day;

    if start <= end {
        days.contains(now.weekday) && start <= minute && minute < end
    } else {
        (days.contains(now.weekday) && minute >= start)
            || (days.contains(now.weekday.pred()) && minute < end)
    }
}
