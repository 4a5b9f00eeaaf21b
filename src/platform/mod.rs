use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SamplerError;

#[cfg(windows)]
pub mod windows;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UsageEventKind {
    MoveToForeground,
    MoveToBackground,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageEvent {
    pub app_id: String,
    pub kind: UsageEventKind,
    pub at: DateTime<Utc>,
}

/// Read access to the operating system's app usage log.
pub trait UsageEventSource: Send {
    /// Events with `begin <= at <= end`, oldest first.
    fn query_events(
        &mut self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>, SamplerError>;
}

const DEFAULT_RETENTION_SECS: i64 = 60;
const MAX_EVENTS: usize = 1024;

/// Usage events reported by a host that owns the OS usage API.
#[derive(Debug)]
pub struct UsageLog {
    events: VecDeque<UsageEvent>,
    retention: Duration,
    access_granted: bool,
}

impl Default for UsageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageLog {
    pub fn new() -> Self {
        Self {
            events: VecDeque::new(),
            retention: Duration::seconds(DEFAULT_RETENTION_SECS),
            access_granted: true,
        }
    }

    pub fn record(&mut self, event: UsageEvent) {
        if let Some(newest) = self.events.back() {
            if event.at < newest.at {
                // Keep the log ordered even if the host reports out of order.
                let index = self.events.partition_point(|e| e.at <= event.at);
                self.events.insert(index, event);
                self.trim();
                return;
            }
        }
        self.events.push_back(event);
        self.trim();
    }

    pub fn set_access_granted(&mut self, granted: bool) {
        self.access_granted = granted;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn trim(&mut self) {
        if let Some(newest) = self.events.back().map(|e| e.at) {
            let horizon = newest - self.retention;
            while self.events.front().is_some_and(|e| e.at < horizon) {
                self.events.pop_front();
            }
        }
        while self.events.len() > MAX_EVENTS {
            self.events.pop_front();
        }
    }
}

impl UsageEventSource for UsageLog {
    fn query_events(
        &mut self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>, SamplerError> {
        if !self.access_granted {
            return Err(SamplerError::PermissionDenied);
        }
        Ok(self
            .events
            .iter()
            .filter(|e| begin <= e.at && e.at <= end)
            .cloned()
            .collect())
    }
}

/// Handle shared by the sampler and whoever feeds the log.
pub type SharedUsageLog = Arc<Mutex<UsageLog>>;

impl UsageEventSource for SharedUsageLog {
    fn query_events(
        &mut self,
        begin: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageEvent>, SamplerError> {
        self.lock()
            .unwrap_or_else(|p| p.into_inner())
            .query_events(begin, end)
    }
}
