use chrono::{DateTime, TimeZone, Utc};
use log::{debug, info, warn};

use crate::command::Command;
use crate::events::{EventSink, MonitorEvent, PublishOutcome};
use crate::locks::{LockStore, SharedStore};
use crate::overlay::OverlayController;
use crate::platform::{SharedUsageLog, UsageEvent};
use crate::sampler::ForegroundSampler;
use crate::schedule::{ScheduleStore, WallClock};
use crate::settings::MonitorSettings;

pub mod emergency;
pub mod reconcile;
pub mod state;

pub use emergency::EmergencyAllowance;
pub use reconcile::reconcile_schedules;
pub use state::{MonitorState, MonitorStatus};

/// The enforcement state machine.
///
/// Owns the lock and schedule stores, the sampler and the overlay. Nothing
/// here is shared: the service task drives it through [`MonitorCore::tick`]
/// and [`MonitorCore::handle`], one call at a time.
pub struct MonitorCore {
    session_id: String,
    tick_interval_ms: i64,
    locks: LockStore,
    schedules: ScheduleStore,
    allowance: EmergencyAllowance,
    sampler: ForegroundSampler,
    overlay: OverlayController,
    sink: Box<dyn EventSink>,
    usage_log: Option<SharedUsageLog>,
    state: MonitorState,
}

impl MonitorCore {
    /// Builds a stopped core with locks and schedules loaded from `store`.
    pub fn new(
        session_id: String,
        settings: &MonitorSettings,
        store: SharedStore,
        sampler: ForegroundSampler,
        overlay: OverlayController,
        sink: Box<dyn EventSink>,
    ) -> Self {
        Self {
            session_id,
            tick_interval_ms: settings.tick_interval_ms as i64,
            locks: LockStore::open(store.clone()),
            schedules: ScheduleStore::open(store.clone()),
            allowance: EmergencyAllowance::new(settings.emergency_unlocks_per_week, store),
            sampler,
            overlay,
            sink,
            usage_log: None,
            state: MonitorState::default(),
        }
    }

    /// Log that `RecordUsageEvent` commands are written to.
    pub fn with_usage_log(mut self, usage_log: SharedUsageLog) -> Self {
        self.usage_log = Some(usage_log);
        self
    }

    pub fn status(&self) -> MonitorStatus {
        self.state.status
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Locks or schedules that still need enforcing.
    pub fn has_obligations(&self) -> bool {
        !self.locks.is_empty() || !self.schedules.is_empty()
    }

    pub fn locks(&self) -> &LockStore {
        &self.locks
    }

    pub fn overlaid_app(&self) -> Option<&str> {
        self.overlay.overlaid_app()
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.state.is_running() {
            debug!("Monitoring already running");
            return;
        }
        self.state = MonitorState::running(now);
        info!("Monitoring started (session {})", self.session_id);
    }

    pub fn stop(&mut self, now: DateTime<Utc>) {
        if !self.state.is_running() {
            return;
        }
        self.overlay.hide();
        self.flush_session(now);
        self.state = MonitorState::default();
        info!("Monitoring stopped");
    }

    /// One decision cycle. Does nothing while stopped.
    pub fn tick<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) {
        if !self.state.is_running() {
            return;
        }
        let utc = now.with_timezone(&Utc);
        let sampled = self.sampler.sample(utc);

        reconcile_schedules(
            &mut self.locks,
            self.schedules.schedules(),
            WallClock::from_datetime(now),
            utc,
        );

        for app_id in self.locks.sweep_expired(utc) {
            self.overlay.hide_for(&app_id);
        }
        if let Some(overlaid) = self.overlay.overlaid_app() {
            if !self.locks.is_locked(overlaid, utc) {
                self.overlay.hide();
            }
        }

        // No sample means nothing moved: keep judging the last known app.
        let foreground = sampled.or_else(|| self.state.last_foreground_app.clone());
        match foreground {
            Some(app_id) if self.state.last_foreground_app.as_deref() != Some(app_id.as_str()) => {
                self.on_foreground_changed(app_id, utc);
            }
            Some(app_id) => {
                if self.locks.is_locked(&app_id, utc) && !self.overlay.is_showing() {
                    self.block(&app_id);
                }
            }
            None => {}
        }

        self.locks.flush_if_dirty();
        self.schedules.flush_if_dirty();
    }

    fn on_foreground_changed(&mut self, app_id: String, now: DateTime<Utc>) {
        debug!("Foreground changed to {app_id}");
        self.flush_session(now);
        self.overlay.hide();
        self.state.switch_to(app_id.clone(), now);

        if self.locks.is_locked(&app_id, now) {
            self.block(&app_id);
        }
    }

    /// Reports time spent on the previous app, ignoring sessions no longer
    /// than one tick.
    fn flush_session(&mut self, now: DateTime<Utc>) {
        let (Some(app_id), Some(duration_ms)) = (
            self.state.last_foreground_app.clone(),
            self.state.session_duration_ms(now),
        ) else {
            return;
        };
        if duration_ms > self.tick_interval_ms {
            self.publish(MonitorEvent::AppChanged {
                app_id,
                duration_ms,
            });
        }
    }

    fn block(&mut self, app_id: &str) {
        if self.overlay.show(app_id) {
            self.publish(MonitorEvent::AppBlocked {
                app_id: app_id.to_owned(),
            });
        }
    }

    fn publish(&mut self, event: MonitorEvent) {
        if self.sink.publish(&event) == PublishOutcome::NoListener {
            debug!("Event dropped, no listener attached");
        }
    }

    /// Applies one command between ticks.
    pub fn handle<Tz: TimeZone>(&mut self, command: Command, now: &DateTime<Tz>) {
        let utc = now.with_timezone(&Utc);
        match command {
            Command::StartMonitoring => self.start(utc),
            Command::StopMonitoring => self.stop(utc),
            Command::LockApp {
                app_id,
                duration_minutes,
            } => {
                self.locks.clear_excuse(&app_id);
                self.locks.lock(&app_id, duration_minutes, utc);
                self.start(utc);
            }
            Command::UnlockApp { app_id } => self.release(&app_id, now),
            Command::SetSchedules { document } => {
                let document = document.to_string();
                if self.schedules.replace_in(&document, &now.timezone()).is_ok() {
                    // Schedules may add obligations for a stopped monitor.
                    if !self.schedules.is_empty() {
                        self.start(utc);
                    }
                }
            }
            Command::EmergencyUnlock { app_id } => {
                if !self.locks.is_locked(&app_id, utc) {
                    warn!("Emergency unlock for {app_id} ignored, app is not locked");
                    return;
                }
                if !self.allowance.try_consume(now) {
                    warn!("Emergency unlock for {app_id} denied, weekly allowance used up");
                    self.publish(MonitorEvent::EmergencyUnlockDenied { app_id });
                    return;
                }
                self.release(&app_id, now);
                info!("Emergency unlock used for {app_id}");
                self.publish(MonitorEvent::EmergencyUnlockUsed { app_id });
            }
            Command::RecordUsageEvent {
                app_id,
                kind,
                at_ms,
            } => {
                let (Some(log), Some(at)) = (&self.usage_log, DateTime::from_timestamp_millis(at_ms))
                else {
                    warn!("Dropping usage event for {app_id}");
                    return;
                };
                log.lock()
                    .unwrap_or_else(|p| p.into_inner())
                    .record(UsageEvent { app_id, kind, at });
            }
            Command::QueryStatus => {
                let status = self.status_event(now);
                self.publish(status);
            }
            Command::TaskRemoved => debug!("Task removal is handled by the service"),
        }
    }

    fn release<Tz: TimeZone>(&mut self, app_id: &str, now: &DateTime<Tz>) {
        let utc = now.with_timezone(&Utc);
        let covered = self
            .schedules
            .schedules()
            .active_apps(WallClock::from_datetime(now))
            .contains(app_id);
        if covered {
            self.locks.excuse(app_id);
        }

        self.locks.unlock(app_id);
        self.overlay.hide_for(app_id);

        if !self.has_obligations() {
            info!("Nothing left to enforce");
            self.stop(utc);
        }
    }

    pub fn status_event<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> MonitorEvent {
        let utc = now.with_timezone(&Utc);
        MonitorEvent::Status {
            session_id: self.session_id.clone(),
            running: self.state.is_running(),
            locked_apps: self
                .locks
                .entries()
                .filter(|(_, entry)| entry.is_active(utc))
                .map(|(app_id, _)| app_id.to_owned())
                .collect(),
            schedule_count: self.schedules.schedules().len(),
            overlaid_app: self.overlay.overlaid_app().map(str::to_owned),
            emergency_unlocks_remaining: self.allowance.remaining(now),
        }
    }
}
