//! MQTT bridge
//!
//! ## Responsibilities
//!
//! - Broker connection with reconnect backoff (rumqttc event loop task)
//! - Re-subscribe after every ConnAck
//! - Forward incoming publishes to an mpsc channel
//! - Stop the loop on client disconnect or when the receiver is dropped
//! - `Publisher` seam so connectors can be tested without a broker

use crate::config::{env_parse, env_string};
use crate::error::Result;
use crate::retry::Backoff;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Outgoing, Packet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use rumqttc::QoS;

/// Broker connection settings
#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive: Duration,
}

impl MqttSettings {
    /// Read `{prefix}` style variables, e.g. `MQTT_BROKER` / `MQTT_PORT` / `MQTT_CLIENT_ID`
    pub fn from_env(host_key: &str, port_key: &str, id_key: &str, default_host: &str, default_id: &str) -> Self {
        Self {
            host: env_string(host_key, default_host),
            port: env_parse(port_key, 1883),
            client_id: env_string(id_key, default_id),
            keep_alive: Duration::from_secs(60),
        }
    }
}

/// 受信メッセージ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl IncomingMessage {
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Something that can publish to MQTT topics
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool) -> Result<()>;

    fn publish_json(&self, topic: &str, value: &serde_json::Value, qos: QoS, retain: bool) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        self.publish(topic, payload, qos, retain)
    }
}

/// rumqttc-backed publisher/subscriber
#[derive(Clone)]
pub struct MqttBridge {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    task: Arc<JoinHandle<()>>,
}

impl MqttBridge {
    /// Spawn the event loop; incoming publishes for `subscriptions` arrive on the returned receiver
    pub fn connect(settings: &MqttSettings, subscriptions: Vec<String>) -> (Self, mpsc::Receiver<IncomingMessage>) {
        let mut options = MqttOptions::new(settings.client_id.clone(), settings.host.clone(), settings.port);
        options.set_keep_alive(settings.keep_alive);

        let (client, eventloop) = AsyncClient::new(options, 64);
        let (tx, rx) = mpsc::channel(64);
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(drive_event_loop(
            eventloop,
            client.clone(),
            subscriptions,
            tx,
            connected.clone(),
            format!("{}:{}", settings.host, settings.port),
        ));

        (
            Self {
                client,
                connected,
                task: Arc::new(task),
            },
            rx,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// False once the event loop task has exited
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}

/// Poll until the client disconnects, every client handle is dropped, or the
/// incoming receiver goes away.
async fn drive_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    subscriptions: Vec<String>,
    tx: mpsc::Sender<IncomingMessage>,
    connected: Arc<AtomicBool>,
    broker: String,
) {
    let mut backoff = Backoff::default();
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                backoff.reset();
                connected.store(true, Ordering::SeqCst);
                tracing::info!(broker = %broker, "Connected to MQTT broker");
                for topic in &subscriptions {
                    match client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                        Ok(()) => tracing::info!(topic = %topic, "Subscribed"),
                        Err(e) => tracing::error!(topic = %topic, error = %e, "Subscribe failed"),
                    }
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let msg = IncomingMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                };
                if tx.send(msg).await.is_err() {
                    tracing::info!("Incoming message receiver dropped, stopping MQTT event loop");
                    break;
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                connected.store(false, Ordering::SeqCst);
                tracing::warn!("Broker requested disconnect");
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::info!(broker = %broker, "Disconnected from MQTT broker");
                break;
            }
            Ok(_) => {}
            Err(ConnectionError::RequestsDone) => {
                tracing::debug!("All MQTT client handles dropped");
                break;
            }
            Err(e) => {
                connected.store(false, Ordering::SeqCst);
                let delay = backoff.next_delay();
                tracing::warn!(
                    error = %e,
                    retry_in_secs = delay.as_secs(),
                    "MQTT connection error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
    connected.store(false, Ordering::SeqCst);
}

impl Publisher for MqttBridge {
    fn publish(&self, topic: &str, payload: Vec<u8>, qos: QoS, retain: bool) -> Result<()> {
        self.client.try_publish(topic, qos, retain, payload)?;
        Ok(())
    }
}

/// In-memory publisher used by tests and dry runs
#[derive(Default)]
pub struct RecordingPublisher {
    messages: std::sync::Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Published messages as (topic, JSON value)
    pub fn json_messages(&self) -> Vec<(String, serde_json::Value)> {
        self.messages
            .lock()
            .map(|m| {
                m.iter()
                    .map(|(t, p)| (t.clone(), serde_json::from_slice(p).unwrap_or(serde_json::Value::Null)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn topics(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.iter().map(|(t, _)| t.clone()).collect())
            .unwrap_or_default()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: Vec<u8>, _qos: QoS, _retain: bool) -> Result<()> {
        self.messages
            .lock()
            .map_err(|_| crate::Error::Internal("publisher lock poisoned".to_string()))?
            .push((topic.to_string(), payload));
        Ok(())
    }
}
