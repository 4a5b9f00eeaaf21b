use log::debug;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Notifications for the UI process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum MonitorEvent {
    AppChanged {
        app_id: String,
        duration_ms: i64,
    },
    AppBlocked {
        app_id: String,
    },
    EmergencyUnlockUsed {
        app_id: String,
    },
    EmergencyUnlockDenied {
        app_id: String,
    },
    Status {
        session_id: String,
        running: bool,
        locked_apps: Vec<String>,
        schedule_count: usize,
        overlaid_app: Option<String>,
        /// `None` when the weekly allowance is unlimited.
        emergency_unlocks_remaining: Option<u32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    /// Nobody is attached. Not an error: the UI may simply be closed.
    NoListener,
}

pub trait EventSink: Send {
    fn publish(&mut self, event: &MonitorEvent) -> PublishOutcome;
}

pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Fans events out to every subscribed bridge.
#[derive(Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<MonitorEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl EventSink for BroadcastSink {
    fn publish(&mut self, event: &MonitorEvent) -> PublishOutcome {
        match self.sender.send(event.clone()) {
            Ok(_) => PublishOutcome::Delivered,
            Err(_) => {
                debug!("No listener for {:?}", event);
                PublishOutcome::NoListener
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Keeps every published event for inspection.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingSink(pub Arc<Mutex<Vec<MonitorEvent>>>);

    impl RecordingSink {
        pub fn take(&self) -> Vec<MonitorEvent> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl EventSink for RecordingSink {
        fn publish(&mut self, event: &MonitorEvent) -> PublishOutcome {
            self.0.lock().unwrap().push(event.clone());
            PublishOutcome::Delivered
        }
    }

    #[test]
    fn test_event_json_shape() {
        let event = MonitorEvent::AppChanged {
            app_id: "com.a".to_owned(),
            duration_ms: 4200,
        };
        assert_eq!(
            serde_json::to_string(&event).unwrap(),
            r#"{"type":"AppChanged","appId":"com.a","durationMs":4200}"#
        );
    }

    #[test]
    fn test_broadcast_without_receiver_is_no_listener() {
        let mut sink = BroadcastSink::default();
        let event = MonitorEvent::AppBlocked {
            app_id: "com.a".to_owned(),
        };
        assert_eq!(sink.publish(&event), PublishOutcome::NoListener);

        let mut rx = sink.subscribe();
        assert_eq!(sink.publish(&event), PublishOutcome::Delivered);
        assert_eq!(rx.try_recv().unwrap(), event);
    }
}
