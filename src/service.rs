use std::sync::Arc;

use chrono::{Local, Utc};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Duration, MissedTickBehavior};

use crate::command::Command;
use crate::lifecycle::{LifecycleGuard, RestartScheduler};
use crate::monitor::MonitorCore;

/// Sending half, held by the bridges and the signal handler.
#[derive(Clone)]
pub struct ServiceHandle {
    pub commands: mpsc::UnboundedSender<Command>,
    pub shutdown: mpsc::UnboundedSender<()>,
}

/// Receiving half. Shared so a restarted service picks up the same queues.
#[derive(Clone)]
pub struct ServiceInbox {
    commands: Arc<Mutex<mpsc::UnboundedReceiver<Command>>>,
    shutdown: Arc<Mutex<mpsc::UnboundedReceiver<()>>>,
}

pub fn channel() -> (ServiceHandle, ServiceInbox) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel();
    (
        ServiceHandle {
            commands: command_tx,
            shutdown: shutdown_tx,
        },
        ServiceInbox {
            commands: Arc::new(Mutex::new(command_rx)),
            shutdown: Arc::new(Mutex::new(shutdown_rx)),
        },
    )
}

/// Runs the core on one task: ticks, commands and shutdown never overlap.
pub struct MonitorService {
    core: MonitorCore,
    tick_interval: Duration,
    restart: Option<(LifecycleGuard, Box<dyn RestartScheduler + Send>)>,
}

impl MonitorService {
    pub fn new(core: MonitorCore, tick_interval: Duration) -> Self {
        Self {
            core,
            tick_interval,
            restart: None,
        }
    }

    /// Restart arranged when the host reports its task removed.
    pub fn with_restart(
        mut self,
        guard: LifecycleGuard,
        scheduler: Box<dyn RestartScheduler + Send>,
    ) -> Self {
        self.restart = Some((guard, scheduler));
        self
    }

    /// The host may kill this process any time after removing its task, so
    /// a delayed restart is armed while enforcement carries on.
    fn arm_restart(&mut self) {
        let Some((guard, scheduler)) = self.restart.as_mut() else {
            warn!("Host task removed, no restart scheduler attached");
            return;
        };
        match guard.on_teardown(scheduler.as_mut()) {
            Ok(true) => info!("Host task removed, restart armed"),
            Ok(false) => info!("Host task removed, nothing to enforce"),
            Err(err) => error!("Failed to arm restart after task removal: {}", err),
        }
    }

    /// Returns on the shutdown signal or once every command sender is gone.
    pub async fn run(mut self, inbox: ServiceInbox) {
        let mut commands = inbox.commands.lock().await;
        let mut shutdown = inbox.shutdown.lock().await;

        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if self.core.has_obligations() {
            info!("Resuming enforcement of persisted locks and schedules");
            self.core.start(Utc::now());
        }

        loop {
            tokio::select! {
                _ = ticker.tick(), if self.core.is_running() => {
                    self.core.tick(&Local::now());
                }
                command = commands.recv() => match command {
                    Some(Command::TaskRemoved) => self.arm_restart(),
                    Some(command) => {
                        debug!("Command received: {:?}", command);
                        let was_running = self.core.is_running();
                        self.core.handle(command, &Local::now());
                        if !was_running && self.core.is_running() {
                            ticker.reset();
                        }
                    }
                    None => {
                        info!("Command channel closed. Exiting monitor loop.");
                        break;
                    }
                },
                Some(_) = shutdown.recv() => {
                    info!("Shutdown signal received. Exiting monitor loop.");
                    break;
                }
            }
        }

        self.core.stop(Utc::now());
    }
}
