use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorStatus {
    #[default]
    Stopped,
    Running,
}

/// Per-run state. Never persisted: a restart rebuilds it from the stores
/// and the next foreground sample.
#[derive(Debug, Default)]
pub struct MonitorState {
    pub status: MonitorStatus,
    pub last_foreground_app: Option<String>,
    pub last_transition: Option<DateTime<Utc>>,
}

impl MonitorState {
    pub fn running(now: DateTime<Utc>) -> Self {
        Self {
            status: MonitorStatus::Running,
            last_transition: Some(now),
            ..Self::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == MonitorStatus::Running
    }

    /// Time spent on the current foreground app, in milliseconds.
    pub fn session_duration_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_foreground_app.as_ref()?;
        self.last_transition
            .map(|since| (now - since).num_milliseconds())
    }

    pub fn switch_to(&mut self, app_id: String, now: DateTime<Utc>) {
        self.last_foreground_app = Some(app_id);
        self.last_transition = Some(now);
    }
}
