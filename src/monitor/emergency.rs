use chrono::{DateTime, Datelike, TimeZone};
use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::locks::SharedStore;
use crate::storage::EMERGENCY_KEY;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct WeeklyUsage {
    week: String,
    used: u32,
}

/// Weekly budget of emergency unlocks. `None` limit means unlimited; usage is
/// still counted so a limit set later applies to the current week.
pub struct EmergencyAllowance {
    limit: Option<u32>,
    store: SharedStore,
}

pub fn iso_week<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    let week = at.iso_week();
    format!("{}-W{:02}", week.year(), week.week())
}

impl EmergencyAllowance {
    pub fn new(limit: Option<u32>, store: SharedStore) -> Self {
        Self { limit, store }
    }

    fn usage(&self, week: &str) -> WeeklyUsage {
        let document = {
            let store = self.store.lock().unwrap_or_else(|p| p.into_inner());
            store.load(EMERGENCY_KEY)
        };
        let usage = match document {
            Ok(Some(body)) => serde_json::from_str::<WeeklyUsage>(&body).unwrap_or_else(|err| {
                warn!("Ignoring unreadable emergency unlock record: {err}");
                WeeklyUsage::default()
            }),
            Ok(None) => WeeklyUsage::default(),
            Err(err) => {
                error!("Failed to read emergency unlock record: {err}");
                WeeklyUsage::default()
            }
        };
        if usage.week == week {
            usage
        } else {
            WeeklyUsage {
                week: week.to_owned(),
                used: 0,
            }
        }
    }

    pub fn remaining<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<u32> {
        let used = self.usage(&iso_week(now)).used;
        self.limit.map(|limit| limit.saturating_sub(used))
    }

    /// Consumes one unlock for the week of `now`. Returns false when the
    /// budget is spent.
    pub fn try_consume<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> bool {
        let mut usage = self.usage(&iso_week(now));
        if self.limit.is_some_and(|limit| usage.used >= limit) {
            return false;
        }
        usage.used += 1;

        let saved = serde_json::to_string(&usage)
            .map_err(Into::into)
            .and_then(|body| {
                let mut store = self.store.lock().unwrap_or_else(|p| p.into_inner());
                store.save(EMERGENCY_KEY, &body)
            });
        if let Err(err) = saved {
            error!("Failed to persist emergency unlock usage: {err}");
        }
        true
    }
}
