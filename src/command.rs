use serde::{Deserialize, Serialize};

use crate::platform::UsageEventKind;

/// Requests from the UI process, applied between ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Command {
    StartMonitoring,
    StopMonitoring,
    LockApp {
        app_id: String,
        #[serde(default)]
        duration_minutes: Option<i64>,
    },
    UnlockApp {
        app_id: String,
    },
    /// `document` is the schedule JSON array itself, not a string.
    SetSchedules {
        document: serde_json::Value,
    },
    EmergencyUnlock {
        app_id: String,
    },
    RecordUsageEvent {
        app_id: String,
        kind: UsageEventKind,
        at_ms: i64,
    },
    QueryStatus,
    /// The host's task was swiped away.
    TaskRemoved,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_lock_with_and_without_duration() {
        let timed: Command =
            serde_json::from_str(r#"{"type":"LockApp","appId":"com.x","durationMinutes":5}"#)
                .unwrap();
        assert_eq!(
            timed,
            Command::LockApp {
                app_id: "com.x".to_owned(),
                duration_minutes: Some(5)
            }
        );

        let indefinite: Command =
            serde_json::from_str(r#"{"type":"LockApp","appId":"com.x"}"#).unwrap();
        assert_eq!(
            indefinite,
            Command::LockApp {
                app_id: "com.x".to_owned(),
                duration_minutes: None
            }
        );
    }

    #[test]
    fn test_decode_unit_and_nested_commands() {
        let status: Command = serde_json::from_str(r#"{"type":"QueryStatus"}"#).unwrap();
        assert_eq!(status, Command::QueryStatus);

        let usage: Command = serde_json::from_str(
            r#"{"type":"RecordUsageEvent","appId":"com.a","kind":"moveToForeground","atMs":1700000000000}"#,
        )
        .unwrap();
        assert!(matches!(
            usage,
            Command::RecordUsageEvent { kind: UsageEventKind::MoveToForeground, .. }
        ));

        let schedules: Command =
            serde_json::from_str(r#"{"type":"SetSchedules","document":[]}"#).unwrap();
        assert_eq!(
            schedules,
            Command::SetSchedules {
                document: serde_json::json!([])
            }
        );
    }

    #[test]
    fn test_unknown_command_is_rejected() {
        assert!(serde_json::from_str::<Command>(r#"{"type":"Reboot"}"#).is_err());
    }
}
