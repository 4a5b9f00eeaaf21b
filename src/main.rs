use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use dotenvy::dotenv;
use log::{error, info};
use tokio::time::{sleep, Duration};

use focus_guard::config::Config;
use focus_guard::events::BroadcastSink;
use focus_guard::lifecycle::{supervise, LifecycleGuard, ProcessRespawner};
use focus_guard::locks::{shared_store, SharedStore};
use focus_guard::logger::Logger;
use focus_guard::monitor::MonitorCore;
use focus_guard::overlay::{HeadlessSurface, OverlayController};
use focus_guard::platform::{SharedUsageLog, UsageEventSource, UsageLog};
use focus_guard::sampler::ForegroundSampler;
use focus_guard::schedule_watcher::watch_schedule_import;
use focus_guard::service::{self, MonitorService};
use focus_guard::settings::MonitorSettings;
use focus_guard::storage::SqliteStore;
use focus_guard::zero_mq_service::{CommandSubscriber, EventPublisher};

#[cfg(windows)]
fn foreground_source(_usage_log: &SharedUsageLog) -> Box<dyn UsageEventSource> {
    Box::new(focus_guard::platform::windows::WindowsForegroundSource)
}

/// Without a native source the host reports usage via `RecordUsageEvent`.
#[cfg(not(windows))]
fn foreground_source(usage_log: &SharedUsageLog) -> Box<dyn UsageEventSource> {
    Box::new(usage_log.clone())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let config = Config::new();
    Logger::initialize(&config.log_path);
    info!("Logger configured successfully.");

    let store: SharedStore = shared_store(
        SqliteStore::open(&config.db_path)
            .with_context(|| format!("Failed to open database at {:?}", config.db_path))?,
    );
    info!("Database connection established at: {:?}", config.db_path);

    let settings = MonitorSettings::load_or_create(&config.settings_path).await;
    let tick_interval = Duration::from_millis(settings.tick_interval_ms);
    let restart_delay = Duration::from_millis(settings.restart_delay_ms);

    if config.start_delay_ms > 0 {
        info!("Delaying start by {}ms", config.start_delay_ms);
        sleep(Duration::from_millis(config.start_delay_ms)).await;
    }

    let sink = BroadcastSink::default();
    let usage_log: SharedUsageLog = Arc::new(Mutex::new(UsageLog::new()));
    let (handle, inbox) = service::channel();

    match EventPublisher::bind(&config.events_endpoint).await {
        Ok(publisher) => {
            tokio::spawn(publisher.forward(sink.subscribe()));
        }
        // A respawned copy finding the endpoint taken means the instance
        // that armed it is still enforcing.
        Err(err) if config.start_delay_ms > 0 => {
            info!("Previous instance still running ({:#}), exiting", err);
            return Ok(());
        }
        Err(err) => error!("{:#}", err),
    }
    match CommandSubscriber::connect(&config.commands_endpoint).await {
        Ok(subscriber) => {
            tokio::spawn(subscriber.forward(handle.commands.clone()));
        }
        Err(err) => error!("{:#}", err),
    }
    if let Some(path) = config.schedule_import_path.clone() {
        tokio::spawn(watch_schedule_import(path, handle.commands.clone()));
    }

    let shutdown = handle.shutdown.clone();
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("Unable to listen for Ctrl+C: {}", err);
            return;
        }
        info!("Ctrl+C detected. Sending shutdown signal...");
        let _ = shutdown.send(());
    });

    let guard = LifecycleGuard::new(store.clone(), restart_delay);
    let build_service = {
        let guard = guard.clone();
        let session_id = config.session_id.clone();
        let settings = settings.clone();
        move || {
            let core = MonitorCore::new(
                session_id.clone(),
                &settings,
                store.clone(),
                ForegroundSampler::new(foreground_source(&usage_log), settings.sample_window_ms),
                OverlayController::new(Box::new(HeadlessSurface)),
                Box::new(sink.clone()),
            )
            .with_usage_log(usage_log.clone());
            MonitorService::new(core, tick_interval)
                .with_restart(guard.clone(), Box::new(ProcessRespawner))
        }
    };

    supervise(build_service, restart_delay, inbox).await;
    info!("Monitor exited");

    if let Err(err) = guard.on_teardown(&mut ProcessRespawner) {
        error!("Failed to schedule restart: {}", err);
    }
    Ok(())
}
