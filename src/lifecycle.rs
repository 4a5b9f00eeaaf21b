use std::process::Stdio;

use log::{error, info, warn};
use tokio::time::{sleep, Duration};

use crate::error::Result;
use crate::locks::{LockStore, SharedStore};
use crate::schedule::ScheduleStore;
use crate::service::{MonitorService, ServiceInbox};

/// Environment variable a respawned process reads to delay its first start.
pub const START_DELAY_ENV: &str = "FOCUS_GUARD_START_DELAY_MS";

/// Arranges a one-shot start of the enforcer after this process is gone.
pub trait RestartScheduler {
    fn schedule_restart(&mut self, delay: Duration) -> std::io::Result<()>;
}

/// Starts a detached copy of the current executable that waits `delay`
/// before monitoring.
#[derive(Debug, Default)]
pub struct ProcessRespawner;

impl RestartScheduler for ProcessRespawner {
    fn schedule_restart(&mut self, delay: Duration) -> std::io::Result<()> {
        let exe = std::env::current_exe()?;
        let child = std::process::Command::new(&exe)
            .env(START_DELAY_ENV, delay.as_millis().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        info!("Respawned {:?} as pid {}", exe, child.id());
        Ok(())
    }
}

/// Decides on teardown whether the enforcer has to come back.
#[derive(Clone)]
pub struct LifecycleGuard {
    store: SharedStore,
    restart_delay: Duration,
}

impl LifecycleGuard {
    pub fn new(store: SharedStore, restart_delay: Duration) -> Self {
        Self {
            store,
            restart_delay,
        }
    }

    /// Reads the persisted documents, not any in-memory state, so it holds
    /// even when the service task died.
    pub fn has_outstanding_obligations(&self) -> bool {
        let locks = LockStore::open(self.store.clone());
        let schedules = ScheduleStore::open(self.store.clone());
        !locks.is_empty() || !schedules.is_empty()
    }

    /// Returns whether a restart was scheduled.
    pub fn on_teardown(&self, scheduler: &mut dyn RestartScheduler) -> Result<bool> {
        if !self.has_outstanding_obligations() {
            info!("No locks or schedules outstanding, not scheduling a restart");
            return Ok(false);
        }
        scheduler.schedule_restart(self.restart_delay)?;
        info!("Restart scheduled in {:?}", self.restart_delay);
        Ok(true)
    }
}

/// Runs the service until it exits on its own, rebuilding it after
/// `restart_delay` whenever the task panics.
pub async fn supervise<F>(mut build_service: F, restart_delay: Duration, inbox: ServiceInbox)
where
    F: FnMut() -> MonitorService,
{
    loop {
        match tokio::spawn(build_service().run(inbox.clone())).await {
            Ok(()) => return,
            Err(err) if err.is_panic() => {
                error!("Monitor task crashed: {:?}. Restarting in {:?}", err, restart_delay);
                sleep(restart_delay).await;
            }
            Err(err) => {
                warn!("Monitor task cancelled: {:?}", err);
                return;
            }
        }
    }
}
