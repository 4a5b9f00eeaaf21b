use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use log::debug;

use crate::locks::{LockSource, LockStore};
use crate::schedule::{ScheduleSet, WallClock};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub locked: Vec<String>,
    pub released: Vec<String>,
}

/// Brings the lock set in line with the schedules active at `wall`.
///
/// Apps covered by an active schedule get an indefinite schedule lock unless
/// they are already locked or excused. Schedule locks for apps no longer
/// covered are removed, and so are their excuses. User locks are never
/// touched.
pub fn reconcile_schedules(
    locks: &mut LockStore,
    schedules: &ScheduleSet,
    wall: WallClock,
    now: DateTime<Utc>,
) -> Reconciled {
    let active: BTreeSet<String> = schedules
        .active_apps(wall)
        .into_iter()
        .map(str::to_owned)
        .collect();
    locks.retain_excused(|app_id| active.contains(app_id));

    let mut outcome = Reconciled::default();
    for app_id in &active {
        if locks.is_excused(app_id) || locks.is_locked(app_id, now) {
            continue;
        }
        locks.lock_for_schedule(app_id);
        outcome.locked.push(app_id.clone());
    }

    let stale: Vec<String> = locks
        .entries()
        .filter(|(app_id, entry)| {
            entry.source == LockSource::Schedule && !active.contains(*app_id)
        })
        .map(|(app_id, _)| app_id.to_owned())
        .collect();
    for app_id in stale {
        locks.unlock(&app_id);
        outcome.released.push(app_id);
    }

    if !outcome.locked.is_empty() || !outcome.released.is_empty() {
        debug!(
            "Schedule reconcile: locked {:?}, released {:?}",
            outcome.locked, outcome.released
        );
    }
    outcome
}
