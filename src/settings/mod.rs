use std::{io::ErrorKind, path::Path};

use log::{error, info};
use serde::{Deserialize, Serialize};
use tokio::{
    fs::{self, File},
    io::{AsyncReadExt, AsyncWriteExt},
};

use crate::sampler::DEFAULT_SAMPLE_WINDOW_MS;

mod visitor;
use visitor::MonitorSettingsVisitor;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub tick_interval_ms: u64,
    pub sample_window_ms: u64,
    pub restart_delay_ms: u64,
    /// `None` means unlimited.
    pub emergency_unlocks_per_week: Option<u32>,
}

impl<'de> Deserialize<'de> for MonitorSettings {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_struct(
            "MonitorSettings",
            &[
                "tick_interval_ms",
                "sample_window_ms",
                "restart_delay_ms",
                "emergency_unlocks_per_week",
            ],
            MonitorSettingsVisitor,
        )
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            sample_window_ms: DEFAULT_SAMPLE_WINDOW_MS,
            restart_delay_ms: 1000,
            emergency_unlocks_per_week: None,
        }
    }
}

impl MonitorSettings {
    async fn create(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = File::create(path).await?;
        let defaults = MonitorSettings::default();
        let json = serde_json::to_string_pretty(&defaults)?;
        file.write_all(json.as_bytes()).await?;
        Ok(defaults)
    }

    /// Reads the settings file, writing the defaults when it does not exist.
    /// Any other failure falls back to the defaults.
    pub async fn load_or_create(path: &Path) -> Self {
        let mut json_string = String::new();

        match File::open(path).await {
            Ok(mut file) => {
                if let Err(err) = file.read_to_string(&mut json_string).await {
                    error!("Failed to read settings file: {}. Using default.", err);
                    return Self::default();
                }
                match serde_json::from_str(&json_string) {
                    Ok(settings) => {
                        info!("Loaded settings from {:?}", path);
                        settings
                    }
                    Err(err) => {
                        error!("Failed to parse settings file: {}. Using default.", err);
                        Self::default()
                    }
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => match Self::create(path).await {
                Ok(settings) => {
                    info!("Created default settings at {:?}", path);
                    settings
                }
                Err(err) => {
                    error!("Failed to create settings file: {}. Using default.", err);
                    Self::default()
                }
            },
            Err(err) => {
                error!("Unexpected error opening settings file: {}. Using default.", err);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_deserialization() {
        let json_data = r#"
        {
            "tick_interval_ms": 500,
            "sample_window_ms": 5000,
            "restart_delay_ms": 2000,
            "emergency_unlocks_per_week": 3
        }
        "#;

        let settings: MonitorSettings = serde_json::from_str(json_data).unwrap();

        assert_eq!(settings.tick_interval_ms, 500);
        assert_eq!(settings.sample_window_ms, 5000);
        assert_eq!(settings.restart_delay_ms, 2000);
        assert_eq!(settings.emergency_unlocks_per_week, Some(3));
    }

    #[test]
    fn test_clamping_behavior() {
        let json_data = r#"
        {
            "tick_interval_ms": 1,
            "sample_window_ms": 600000,
            "restart_delay_ms": 0,
            "emergency_unlocks_per_week": 1000,
            "unknown": true
        }
        "#;

        let settings: MonitorSettings = serde_json::from_str(json_data).unwrap();

        assert_eq!(settings.tick_interval_ms, 250);
        assert_eq!(settings.sample_window_ms, 60_000);
        assert_eq!(settings.restart_delay_ms, 100);
        assert_eq!(settings.emergency_unlocks_per_week, Some(50));
    }

    #[test]
    fn test_allowance_is_optional() {
        let json_data = r#"
        {
            "tick_interval_ms": 1000,
            "sample_window_ms": 10000,
            "restart_delay_ms": 1000,
            "emergency_unlocks_per_week": null
        }
        "#;
        let settings: MonitorSettings = serde_json::from_str(json_data).unwrap();
        assert_eq!(settings, MonitorSettings::default());
    }

    #[test]
    fn test_missing_field_error() {
        let result: Result<MonitorSettings, _> =
            serde_json::from_str(r#"{ "tick_interval_ms": 1000 }"#);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("settings.json");

        let settings = MonitorSettings::load_or_create(&path).await;
        assert_eq!(settings, MonitorSettings::default());
        assert!(path.exists());
        assert_eq!(MonitorSettings::load_or_create(&path).await, settings);
    }
}
