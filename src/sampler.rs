use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};

use crate::error::SamplerError;
use crate::platform::{UsageEventKind, UsageEventSource};

pub const DEFAULT_SAMPLE_WINDOW_MS: u64 = 10_000;

/// Picks the current foreground app out of the trailing usage-event window.
///
/// Fails closed: when usage access is missing the sample is `None`, and the
/// denial is logged once until access comes back.
pub struct ForegroundSampler {
    source: Box<dyn UsageEventSource>,
    window: Duration,
    denied: bool,
}

impl ForegroundSampler {
    pub fn new(source: Box<dyn UsageEventSource>, window_ms: u64) -> Self {
        Self {
            source,
            window: Duration::milliseconds(window_ms as i64),
            denied: false,
        }
    }

    pub fn sample(&mut self, now: DateTime<Utc>) -> Option<String> {
        match self.source.query_events(now - self.window, now) {
            Ok(events) => {
                if self.denied {
                    info!("Usage access available again");
                    self.denied = false;
                }
                events
                    .into_iter()
                    .filter(|event| event.kind == UsageEventKind::MoveToForeground)
                    .last()
                    .map(|event| event.app_id)
            }
            Err(SamplerError::PermissionDenied) => {
                if !self.denied {
                    warn!("Usage access permission missing; no foreground samples until granted");
                    self.denied = true;
                }
                None
            }
            Err(err) => {
                debug!("Foreground sample failed: {err}");
                None
            }
        }
    }

    pub fn is_denied(&self) -> bool {
        self.denied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{SharedUsageLog, UsageEvent, UsageLog};
    use chrono::TimeZone;
    use std::sync::{Arc, Mutex};

    fn shared_log() -> SharedUsageLog {
        Arc::new(Mutex::new(UsageLog::new()))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn event(app: &str, kind: UsageEventKind, secs: i64) -> UsageEvent {
        UsageEvent {
            app_id: app.to_owned(),
            kind,
            at: at(secs),
        }
    }

    #[test]
    fn test_latest_foreground_event_wins() {
        let log = shared_log();
        {
            let mut log = log.lock().unwrap();
            log.record(event("com.a", UsageEventKind::MoveToForeground, 1));
            log.record(event("com.b", UsageEventKind::MoveToForeground, 3));
            log.record(event("com.b", UsageEventKind::MoveToBackground, 4));
        }
        let mut sampler = ForegroundSampler::new(Box::new(log), 10_000);
        assert_eq!(sampler.sample(at(5)).as_deref(), Some("com.b"));
    }

    #[test]
    fn test_nothing_in_window_is_none() {
        let log = shared_log();
        log.lock()
            .unwrap()
            .record(event("com.a", UsageEventKind::MoveToForeground, 0));
        let mut sampler = ForegroundSampler::new(Box::new(log), 10_000);
        assert_eq!(sampler.sample(at(11)), None);
    }

    #[test]
    fn test_permission_denied_fails_closed() {
        let log = shared_log();
        log.lock().unwrap().set_access_granted(false);
        let mut sampler = ForegroundSampler::new(Box::new(log.clone()), 10_000);

        assert_eq!(sampler.sample(at(0)), None);
        assert!(sampler.is_denied());

        log.lock().unwrap().set_access_granted(true);
        sampler.sample(at(1));
        assert!(!sampler.is_denied());
    }
}
