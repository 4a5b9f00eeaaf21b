use std::env;
use std::path::{Path, PathBuf};

use log::warn;
use uuid::Uuid;

use crate::lifecycle::START_DELAY_ENV;

const DEFAULT_DB_PATH: &str = "%AppData%/focus_guard/focus_guard.sqlite3";
pub const DEFAULT_EVENTS_ENDPOINT: &str = "tcp://127.0.0.1:30002";
pub const DEFAULT_COMMANDS_ENDPOINT: &str = "tcp://127.0.0.1:30003";

#[derive(Debug, Default, Clone)]
pub struct Config {
    pub session_id: String,
    pub db_path: PathBuf,
    pub log_path: PathBuf,
    pub settings_path: PathBuf,
    pub schedule_import_path: Option<PathBuf>,
    pub events_endpoint: String,
    pub commands_endpoint: String,
    pub start_delay_ms: u64,
}

impl Config {
    pub fn new() -> Self {
        let db_path = resolve_app_data(
            &env::var("FOCUS_GUARD_DB").unwrap_or_else(|_| DEFAULT_DB_PATH.to_owned()),
        );
        let data_dir = db_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let settings_path = env::var("FOCUS_GUARD_SETTINGS")
            .map(|path| resolve_app_data(&path))
            .unwrap_or_else(|_| data_dir.join("settings.json"));

        Config {
            session_id: Uuid::new_v4().to_string(),
            log_path: data_dir.join("application.log"),
            settings_path,
            schedule_import_path: env::var("FOCUS_GUARD_SCHEDULE_IMPORT")
                .ok()
                .map(|path| resolve_app_data(&path)),
            events_endpoint: env::var("FOCUS_GUARD_EVENTS_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_EVENTS_ENDPOINT.to_owned()),
            commands_endpoint: env::var("FOCUS_GUARD_COMMANDS_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_COMMANDS_ENDPOINT.to_owned()),
            start_delay_ms: parse_start_delay(env::var(START_DELAY_ENV).ok().as_deref()),
            db_path,
        }
    }
}

/// Expands a leading `%AppData%` to the platform config directory.
pub fn resolve_app_data(path: &str) -> PathBuf {
    if path.contains("%AppData%") {
        let app_data_path = dirs::config_dir().unwrap_or_else(|| Path::new(".").to_path_buf());
        PathBuf::from(path.replace("%AppData%", &app_data_path.to_string_lossy()))
    } else {
        PathBuf::from(path)
    }
}

fn parse_start_delay(value: Option<&str>) -> u64 {
    match value.map(str::parse::<u64>) {
        None => 0,
        Some(Ok(ms)) => ms,
        Some(Err(err)) => {
            warn!("Ignoring invalid {START_DELAY_ENV}: {err}");
            0
        }
    }
}
