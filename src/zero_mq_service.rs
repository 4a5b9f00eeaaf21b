use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use zeromq::{PubSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

use crate::command::Command;
use crate::events::MonitorEvent;

/// Publishes monitor events as JSON on a PUB socket.
pub struct EventPublisher {
    socket: PubSocket,
}

impl EventPublisher {
    pub async fn bind(endpoint: &str) -> Result<Self> {
        let mut socket = PubSocket::new();
        socket
            .bind(endpoint)
            .await
            .with_context(|| format!("Unable to bind Zeromq event socket on {endpoint}"))?;
        info!("Publishing events on {endpoint}");
        Ok(Self { socket })
    }

    async fn send(&mut self, event: &MonitorEvent) {
        match serde_json::to_string(event) {
            Ok(event_json) => {
                if let Err(e) = self.socket.send(event_json.into()).await {
                    error!("Failed to send event: {}", e);
                }
            }
            Err(e) => {
                error!("Failed to serialize event: {}", e);
            }
        }
    }

    /// Forwards everything published on the broadcast channel until it closes.
    pub async fn forward(mut self, mut events: broadcast::Receiver<MonitorEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.send(&event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event publisher lagging, skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event channel closed, publisher exiting");
                    break;
                }
            }
        }
    }
}

/// Decodes a command payload. Payloads that arrive as a JSON string holding
/// the command (double encoded by some clients) are unwrapped first.
pub fn decode_command(payload: &str) -> serde_json::Result<Command> {
    serde_json::from_str::<Command>(payload).or_else(|err| {
        match serde_json::from_str::<String>(payload) {
            Ok(inner) => serde_json::from_str(&inner),
            Err(_) => Err(err),
        }
    })
}

fn payload_text(message: ZmqMessage) -> Result<String> {
    let bytes: Vec<u8> = message
        .into_vec()
        .into_iter()
        .flat_map(|frame| frame.to_vec())
        .collect();
    Ok(String::from_utf8(bytes)?)
}

/// Receives JSON commands on a SUB socket and queues them for the service.
pub struct CommandSubscriber {
    socket: SubSocket,
}

impl CommandSubscriber {
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let mut socket = SubSocket::new();
        socket
            .connect(endpoint)
            .await
            .with_context(|| format!("Unable to connect Zeromq command socket to {endpoint}"))?;
        socket.subscribe("").await?;
        info!("Listening for commands on {endpoint}");
        Ok(Self { socket })
    }

    pub async fn forward(mut self, commands: mpsc::UnboundedSender<Command>) {
        loop {
            match self.socket.recv().await {
                Ok(zmq_message) => {
                    let command = payload_text(zmq_message)
                        .and_then(|text| decode_command(&text).map_err(Into::into));
                    match command {
                        Ok(command) => {
                            if commands.send(command).is_err() {
                                debug!("Service gone, command subscriber exiting");
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping undecodable command: {}", e),
                    }
                }
                Err(e) => {
                    error!("Error receiving message: {}", e);
                    // Prevents high CPU usage on failure
                    sleep(tokio::time::Duration::from_millis(10)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_command() {
        assert_eq!(
            decode_command(r#"{"type":"UnlockApp","appId":"com.a"}"#).unwrap(),
            Command::UnlockApp {
                app_id: "com.a".to_owned()
            }
        );
    }

    #[test]
    fn test_decode_double_encoded_command() {
        let payload = serde_json::to_string(r#"{"type":"StopMonitoring"}"#).unwrap();
        assert_eq!(decode_command(&payload).unwrap(), Command::StopMonitoring);
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(decode_command("lock everything").is_err());
        assert!(decode_command(r#""not a command""#).is_err());
    }

    #[test]
    fn test_payload_frames_are_joined() {
        let message = ZmqMessage::from(r#"{"type":"QueryStatus"}"#.to_owned());
        let text = payload_text(message).unwrap();
        assert_eq!(decode_command(&text).unwrap(), Command::QueryStatus);
    }
}
