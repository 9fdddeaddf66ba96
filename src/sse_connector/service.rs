//! SSE stream -> MQTT topic routing

use super::parser::{SseEvent, SseParser};
use crate::config::env_string;
use crate::error::{Error, Result};
use crate::mqtt::{MqttSettings, Publisher, QoS};
use crate::retry::Backoff;
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// 最大連続リトライ回数
pub const MAX_RETRIES: u32 = 10;

#[derive(Debug, Clone)]
pub struct SseConnectorConfig {
    pub mqtt: MqttSettings,
    pub sse_endpoint: String,
    pub topic_heartbeat: String,
    pub topic_alert: String,
    pub topic_alert_dlqc: String,
    pub topic_analytics_enabled: String,
    pub topic_analytics_disabled: String,
    pub topic_error: String,
}

impl Default for SseConnectorConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttSettings::from_env(
                "AIO_BROKER_HOSTNAME",
                "AIO_BROKER_TCP_PORT",
                "AIO_MQTT_CLIENT_ID",
                "localhost",
                "sse-connector-test",
            ),
            sse_endpoint: env_string("SSE_ENDPOINT", "http://localhost:8080/camera-events"),
            topic_heartbeat: env_string("TOPIC_HEARTBEAT", "camera-events/heartbeat"),
            topic_alert: env_string("TOPIC_ALERT", "camera-events/alert"),
            topic_alert_dlqc: env_string("TOPIC_ALERT_DLQC", "camera-events/alert_dlqc"),
            topic_analytics_enabled: env_string("TOPIC_ANALYTICS_ENABLED", "camera-events/analytics_enabled"),
            topic_analytics_disabled: env_string("TOPIC_ANALYTICS_DISABLED", "camera-events/analytics_disabled"),
            topic_error: env_string("ERROR_TOPIC", "akri/sse-connector/errors"),
        }
    }
}

impl SseConnectorConfig {
    /// Known event types map to their topic; anything else is `None`
    pub fn topic_for(&self, event_type: &str) -> Option<&str> {
        match event_type {
            "HEARTBEAT" => Some(&self.topic_heartbeat),
            "ALERT" => Some(&self.topic_alert),
            "ALERT_DLQC" => Some(&self.topic_alert_dlqc),
            "ANALYTICS_ENABLED" => Some(&self.topic_analytics_enabled),
            "ANALYTICS_DISABLED" => Some(&self.topic_analytics_disabled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SseConnectorStats {
    pub events_received: u64,
    pub events_published: u64,
    pub errors: u64,
    pub by_type: BTreeMap<String, u64>,
}

pub struct SseConnector {
    config: SseConnectorConfig,
    publisher: Arc<dyn Publisher>,
    http: reqwest::Client,
    stats: RwLock<SseConnectorStats>,
}

impl SseConnector {
    pub fn new(config: SseConnectorConfig, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            config,
            publisher,
            http: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            stats: RwLock::new(SseConnectorStats::default()),
        }
    }

    pub async fn stats(&self) -> SseConnectorStats {
        self.stats.read().await.clone()
    }

    /// Route one event to MQTT
    pub async fn process_event(&self, event: &SseEvent) {
        let payload: serde_json::Value = match serde_json::from_str(&event.data) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(event_type = %event.event_type, error = %e, "Failed to parse event data as JSON");
                self.stats.write().await.errors += 1;
                return;
            }
        };

        {
            let mut stats = self.stats.write().await;
            stats.events_received += 1;
            *stats.by_type.entry(event.event_type.clone()).or_insert(0) += 1;
        }
        tracing::info!(event_type = %event.event_type, "Received event");

        let (topic, body) = match self.config.topic_for(&event.event_type) {
            Some(topic) => (topic.to_string(), payload),
            None => {
                tracing::warn!(event_type = %event.event_type, "Unknown event type, routing to error topic");
                (
                    self.config.topic_error.clone(),
                    json!({
                        "error": "unknown_event_type",
                        "event_type": event.event_type,
                        "data": payload,
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                    }),
                )
            }
        };

        match self.publisher.publish_json(&topic, &body, QoS::AtLeastOnce, false) {
            Ok(()) => {
                self.stats.write().await.events_published += 1;
                tracing::debug!(topic = %topic, "Published event");
            }
            Err(e) => {
                self.stats.write().await.errors += 1;
                tracing::error!(topic = %topic, error = %e, "Failed to publish event");
            }
        }
    }

    /// One connection: stream until the server closes it
    async fn stream_once(&self, backoff: &mut Backoff) -> Result<()> {
        tracing::info!(endpoint = %self.config.sse_endpoint, "Connecting to SSE endpoint");
        let response = self
            .http
            .get(&self.config.sse_endpoint)
            .header("Accept", "text/event-stream")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "SSE endpoint returned status {}",
                response.status()
            )));
        }

        tracing::info!("Connected to SSE endpoint");
        backoff.reset();

        let mut parser = SseParser::new();
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            for event in parser.feed(&chunk?) {
                self.process_event(&event).await;
            }
        }
        tracing::info!("SSE stream closed by server");
        Ok(())
    }

    /// Connect / reconnect with backoff until shutdown or too many consecutive failures
    pub async fn run(&self) -> Result<()> {
        let mut backoff = Backoff::default().with_max_attempts(MAX_RETRIES);
        let shutdown = crate::server::shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            let outcome = tokio::select! {
                r = self.stream_once(&mut backoff) => r,
                _ = &mut shutdown => break,
            };
            if let Err(e) = outcome {
                tracing::error!(error = %e, "SSE connection error");
            }
            if backoff.exhausted() {
                tracing::error!(attempts = backoff.attempts(), "Max retries reached, giving up");
                self.log_stats().await;
                return Err(Error::Network("SSE endpoint unreachable".to_string()));
            }

            let delay = backoff.next_delay();
            tracing::info!(
                retry_in_secs = delay.as_secs(),
                attempt = backoff.attempts(),
                max = MAX_RETRIES,
                "Reconnecting"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = &mut shutdown => break,
            }
        }

        tracing::info!("Shutting down SSE connector");
        self.log_stats().await;
        Ok(())
    }

    async fn log_stats(&self) {
        let stats = self.stats().await;
        tracing::info!(
            events_received = stats.events_received,
            events_published = stats.events_published,
            errors = stats.errors,
            by_type = ?stats.by_type,
            "SSE connector statistics"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::RecordingPublisher;

    fn connector(publisher: Arc<RecordingPublisher>) -> SseConnector {
        SseConnector::new(SseConnectorConfig::default(), publisher)
    }

    fn event(t: &str, data: &str) -> SseEvent {
        SseEvent {
            event_type: t.to_string(),
            data: data.to_string(),
            id: None,
        }
    }

    #[tokio::test]
    async fn test_known_event_routed() {
        let publisher = Arc::new(RecordingPublisher::new());
        let conn = connector(publisher.clone());
        conn.process_event(&event("ALERT", r#"{"type":"ALERT","event_id":1001}"#)).await;

        let msgs = publisher.json_messages();
        assert_eq!(msgs[0].0, conn.config.topic_alert);
        assert_eq!(msgs[0].1["event_id"], 1001);

        let stats = conn.stats().await;
        assert_eq!(stats.events_received, 1);
        assert_eq!(stats.events_published, 1);
        assert_eq!(stats.by_type.get("ALERT"), Some(&1));
    }

    #[tokio::test]
    async fn test_unknown_event_goes_to_error_topic() {
        let publisher = Arc::new(RecordingPublisher::new());
        let conn = connector(publisher.clone());
        conn.process_event(&event("REBOOT", r#"{"x":1}"#)).await;

        let msgs = publisher.json_messages();
        assert_eq!(msgs[0].0, conn.config.topic_error);
        assert_eq!(msgs[0].1["event_type"], "REBOOT");
        assert_eq!(msgs[0].1["data"]["x"], 1);
    }

    #[tokio::test]
    async fn test_invalid_json_counts_error() {
        let publisher = Arc::new(RecordingPublisher::new());
        let conn = connector(publisher.clone());
        conn.process_event(&event("ALERT", "not json")).await;

        assert!(publisher.json_messages().is_empty());
        let stats = conn.stats().await;
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.events_received, 0);
    }
}
