//! SseConnector - SSE event stream to MQTT bridge
//!
//! ## Responsibilities
//!
//! - Incremental SSE parsing over a streaming HTTP body
//! - Event type to topic routing (unknown types go to the error topic)
//! - Reconnect with exponential backoff, bounded consecutive retries

mod parser;
mod service;

pub use parser::{SseEvent, SseParser};
pub use service::{SseConnector, SseConnectorConfig, SseConnectorStats, MAX_RETRIES};

use crate::mqtt::MqttBridge;
use std::sync::Arc;

pub async fn run(config: SseConnectorConfig) -> crate::Result<()> {
    tracing::info!(
        endpoint = %config.sse_endpoint,
        broker = %config.mqtt.host,
        port = config.mqtt.port,
        "Starting SSE connector"
    );
    let (bridge, _incoming) = MqttBridge::connect(&config.mqtt, Vec::new());
    let connector = SseConnector::new(config, Arc::new(bridge.clone()));
    let result = connector.run().await;
    if let Err(e) = bridge.disconnect().await {
        tracing::debug!(error = %e, "MQTT disconnect failed");
    }
    result
}
