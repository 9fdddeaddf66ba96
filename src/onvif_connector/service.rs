//! ONVIF -> MQTT bridge loop

use super::client::OnvifClient;
use super::types::{
    CameraEventMessage, CameraNotification, ConnectorStats, DiscoveredDevice, OnvifConnectorConfig, PtzCommand,
};
use crate::error::{Error, Result};
use crate::mqtt::{IncomingMessage, Publisher, QoS};
use crate::retry::Backoff;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

/// 統計ログの出力間隔（受信イベント数）
const STATS_LOG_EVERY: u64 = 10;

pub struct OnvifConnector {
    config: OnvifConnectorConfig,
    client: OnvifClient,
    publisher: Arc<dyn Publisher>,
    device: RwLock<Option<DiscoveredDevice>>,
    stats: RwLock<ConnectorStats>,
    connected: AtomicBool,
}

impl OnvifConnector {
    pub fn new(config: OnvifConnectorConfig, publisher: Arc<dyn Publisher>) -> Self {
        let credentials = match (&config.username, &config.password) {
            (Some(u), Some(p)) => Some((u.clone(), p.clone())),
            _ => None,
        };
        let client = OnvifClient::new(&config.endpoint(), credentials);
        Self {
            config,
            client,
            publisher,
            device: RwLock::new(None),
            stats: RwLock::new(ConnectorStats::default()),
            connected: AtomicBool::new(false),
        }
    }

    pub async fn stats(&self) -> ConnectorStats {
        self.stats.read().await.clone()
    }

    pub async fn device(&self) -> Option<DiscoveredDevice> {
        self.device.read().await.clone()
    }

    /// Discover the device, retrying with exponential backoff until it answers
    pub async fn connect(&self, backoff: &mut Backoff) -> Result<DiscoveredDevice> {
        loop {
            self.stats.write().await.connection_attempts += 1;
            tracing::info!(endpoint = %self.config.endpoint(), "Connecting to ONVIF device");

            match self.client.discover().await {
                Ok(device) => {
                    backoff.reset();
                    self.connected.store(true, Ordering::Relaxed);
                    tracing::info!(device_id = %device.device_id(), "ONVIF device discovery completed");
                    *self.device.write().await = Some(device.clone());
                    self.publish_device_info(&device);
                    return Ok(device);
                }
                Err(e) => {
                    if backoff.exhausted() {
                        return Err(e);
                    }
                    let delay = backoff.next_delay();
                    tracing::warn!(
                        error = %e,
                        retry_in_secs = delay.as_secs(),
                        "ONVIF discovery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn publish_device_info(&self, device: &DiscoveredDevice) {
        let payload = match serde_json::to_value(device) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize device info");
                return;
            }
        };
        if let Err(e) = self
            .publisher
            .publish_json(&self.config.device_info_topic(), &payload, QoS::AtLeastOnce, true)
        {
            tracing::error!(error = %e, "Failed to publish device info");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Status heartbeat on `{prefix}/status`
    pub async fn publish_status(&self) {
        let device_id = self
            .device
            .read()
            .await
            .as_ref()
            .map(|d| d.device_id())
            .unwrap_or_else(|| "unknown".to_string());
        let stats = self.stats().await;
        let payload = serde_json::json!({
            "device_id": device_id,
            "connected": self.is_connected(),
            "events_received": stats.events_received,
            "events_published": stats.events_published,
            "ptz_commands": stats.ptz_commands,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        let topic = self.config.status_topic();
        if let Err(e) = self.publisher.publish_json(&topic, &payload, QoS::AtLeastOnce, false) {
            tracing::error!(topic = %topic, error = %e, "Failed to publish status");
        }
    }

    /// One PullMessages round; returns the number of events published
    pub async fn poll_events(&self) -> Result<usize> {
        let notifications = self.client.pull_messages().await?;
        Ok(self.process_notifications(&notifications).await)
    }

    /// Remap notifications onto `{prefix}/events/{kind}`
    pub async fn process_notifications(&self, notifications: &[CameraNotification]) -> usize {
        let device_id = self
            .device
            .read()
            .await
            .as_ref()
            .map(|d| d.device_id())
            .unwrap_or_else(|| "unknown".to_string());

        let mut published = 0;
        for note in notifications {
            let now = chrono::Utc::now().to_rfc3339();
            {
                let mut stats = self.stats.write().await;
                stats.events_received += 1;
                stats.last_event_time = Some(now.clone());
                if stats.events_received % STATS_LOG_EVERY == 0 {
                    tracing::info!(
                        events_received = stats.events_received,
                        events_published = stats.events_published,
                        ptz_commands = stats.ptz_commands,
                        connection_attempts = stats.connection_attempts,
                        "Connector statistics"
                    );
                }
            }

            let Some(kind) = note.kind else {
                tracing::debug!(topic = %note.topic, "Ignoring unsupported event topic");
                continue;
            };
            if !note.active {
                continue;
            }

            let message = CameraEventMessage {
                event_type: kind.event_type().to_string(),
                timestamp: note.utc_time.clone().unwrap_or(now),
                device_id: device_id.clone(),
            };
            let topic = self.config.event_topic(kind);
            let payload = match serde_json::to_value(&message) {
                Ok(v) => v,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize event");
                    continue;
                }
            };
            match self.publisher.publish_json(&topic, &payload, QoS::AtLeastOnce, false) {
                Ok(()) => {
                    published += 1;
                    self.stats.write().await.events_published += 1;
                    tracing::info!(topic = %topic, event = %message.event_type, "Published camera event");
                }
                Err(e) => tracing::error!(topic = %topic, error = %e, "Error publishing event"),
            }
        }
        published
    }

    /// Execute a PTZ command received over MQTT
    pub async fn handle_ptz_message(&self, msg: &IncomingMessage) -> Result<()> {
        if !msg.topic.contains("/ptz/command/") {
            return Ok(());
        }
        self.stats.write().await.ptz_commands += 1;

        let payload = msg.payload_str();
        let cmd = PtzCommand::parse(&msg.topic, &payload)
            .ok_or_else(|| Error::Validation(format!("invalid PTZ payload: {}", payload)))?;

        let token = self
            .device
            .read()
            .await
            .as_ref()
            .and_then(|d| d.profiles.first().map(|p| p.token.clone()))
            .unwrap_or_else(|| crate::onvif_camera::DEFAULT_PROFILE_TOKEN.to_string());

        tracing::info!(topic = %msg.topic, payload = %payload, "Received PTZ command");
        self.client.relative_move(&token, &cmd).await
    }

    async fn supports_events(&self) -> bool {
        self.device
            .read()
            .await
            .as_ref()
            .map(|d| d.capabilities.supports_events())
            .unwrap_or(false)
    }

    /// Discover, then poll events and serve PTZ commands until shutdown
    pub async fn run(self: Arc<Self>, mut commands: mpsc::Receiver<IncomingMessage>) -> Result<()> {
        let mut backoff = Backoff::default();
        self.connect(&mut backoff).await?;

        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.event_poll_interval.max(1)));
        let shutdown = crate::server::shutdown_signal();
        tokio::pin!(shutdown);

        tracing::info!(
            interval_secs = self.config.event_poll_interval,
            "Starting event subscription loop"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.supports_events().await {
                        if let Err(e) = self.poll_events().await {
                            tracing::warn!(error = %e, "Failed to pull events");
                            if matches!(e, Error::Network(_)) {
                                self.connected.store(false, Ordering::Relaxed);
                                self.publish_status().await;
                                self.connect(&mut backoff).await?;
                            }
                        }
                    }
                    self.publish_status().await;
                }
                Some(msg) = commands.recv() => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = this.handle_ptz_message(&msg).await {
                            tracing::error!(error = %e, "Error executing PTZ command");
                        }
                    });
                }
                _ = &mut shutdown => {
                    tracing::info!("Shutting down ONVIF connector");
                    break;
                }
            }
        }

        let stats = self.stats().await;
        tracing::info!(
            events_received = stats.events_received,
            events_published = stats.events_published,
            ptz_commands = stats.ptz_commands,
            "Final statistics"
        );
        Ok(())
    }
}
