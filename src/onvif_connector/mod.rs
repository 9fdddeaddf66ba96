//! OnvifConnector - ONVIF camera to MQTT bridge
//!
//! ## Responsibilities
//!
//! - Device discovery (information, capabilities, profiles) with reconnect backoff
//! - PullMessages polling and motion / tampering remap onto MQTT
//! - PTZ commands from `{prefix}/ptz/command/#` forwarded as RelativeMove

mod client;
mod service;
mod types;

pub use client::{parse_capabilities, parse_device_information, parse_notifications, parse_profiles, OnvifClient};
pub use service::OnvifConnector;
pub use types::*;

use crate::mqtt::MqttBridge;
use std::sync::Arc;

pub async fn run(config: OnvifConnectorConfig) -> crate::Result<()> {
    tracing::info!(
        endpoint = %config.endpoint(),
        broker = %config.mqtt.host,
        port = config.mqtt.port,
        prefix = %config.topic_prefix,
        "Starting ONVIF connector"
    );
    let (bridge, commands) = MqttBridge::connect(&config.mqtt, vec![config.ptz_subscription()]);
    let connector = Arc::new(OnvifConnector::new(config, Arc::new(bridge.clone())));
    let result = connector.run(commands).await;
    if let Err(e) = bridge.disconnect().await {
        tracing::debug!(error = %e, "MQTT disconnect failed");
    }
    result
}
