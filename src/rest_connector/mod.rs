//! RestConnector - REST device polling bridged onto MQTT
//!
//! ## Responsibilities
//!
//! - Scheduled polling of the weather station, sensor field endpoint and
//!   authenticated device (HTTP Basic)
//! - Fixed-delay retries per request, error reports on the error topic
//! - Sensor payload normalisation and `connector_metadata` enrichment

mod payload;
mod service;

pub use payload::{attach_metadata, base_metadata, error_payload, normalize_sensor_payload, CONNECTOR_TYPE};
pub use service::{RestConnector, RestConnectorConfig, RestConnectorStats};

use crate::mqtt::MqttBridge;
use std::sync::Arc;

pub async fn run(config: RestConnectorConfig) -> crate::Result<()> {
    tracing::info!(
        broker = %config.mqtt.host,
        port = config.mqtt.port,
        weather = %config.weather_endpoint,
        sensor = %config.sensor_fields_endpoint,
        auth = %config.auth_endpoint,
        "Starting REST connector"
    );
    let (bridge, _incoming) = MqttBridge::connect(&config.mqtt, Vec::new());
    let connector = RestConnector::new(config, Arc::new(bridge.clone()));
    let result = connector.run().await;
    if let Err(e) = bridge.disconnect().await {
        tracing::debug!(error = %e, "MQTT disconnect failed");
    }
    result
}
