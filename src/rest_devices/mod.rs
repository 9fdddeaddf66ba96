//! RestDevices - simulated REST devices polled by the REST connector
//!
//! ## Responsibilities
//!
//! - Weather station: current reading, 24h history, device info
//! - Generic temperature/humidity sensor plus the field-based simulator
//! - Controller that requires HTTP Basic authentication

mod auth_device;
mod fields;
mod sensor;
mod weather;

pub use auth_device::{create_router as auth_device_router, AuthDevice, AuthDeviceConfig, AUTH_REALM};
pub use fields::{
    DataType, FieldConfig, FieldSimulator, FieldValue, FieldsArrayResponse, FieldsConfig,
    SimulatorMetadata, FIELD_CONFIG_ENV_VAR,
};
pub use sensor::{create_router as sensor_router, SensorConfig, SensorSimulator};
pub use weather::{create_router as weather_router, WeatherReading, WeatherStation, WeatherStationConfig};

use crate::config::bind_addr;
use std::sync::Arc;

pub const DOCUMENTATION_URL: &str =
    "https://github.com/microsoft/edge-ai/tree/main/src/500-application/505-akri-rest-http-connector";

/// 小数点以下 `places` 桁で丸める
pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub async fn run_weather_station(config: WeatherStationConfig) -> crate::Result<()> {
    let addr = bind_addr(&config.host, config.port)?;
    tracing::info!(device_id = %config.device_id, location = %config.location, "Starting weather station");
    let station = Arc::new(WeatherStation::new(config));
    crate::server::serve("weather-station", addr, weather_router(station)).await
}

pub async fn run_sensor_simulator(config: SensorConfig) -> crate::Result<()> {
    let addr = bind_addr(&config.host, config.port)?;
    let fields = FieldsConfig::load_default()?;
    tracing::info!(
        device_id = %config.device_id,
        sensor_type = %config.sensor_type,
        fields = fields.fields.len(),
        "Starting sensor simulator"
    );
    let sensor = Arc::new(SensorSimulator::new(config, FieldSimulator::new(fields)));
    crate::server::serve("sensor-simulator", addr, sensor_router(sensor)).await
}

pub async fn run_auth_device(config: AuthDeviceConfig) -> crate::Result<()> {
    let addr = bind_addr(&config.host, config.port)?;
    tracing::info!(device_id = %config.device_id, username = %config.username, "Starting authenticated device");
    let device = Arc::new(AuthDevice::new(config));
    crate::server::serve("auth-device", addr, auth_device_router(device)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(-64.96, 1), -65.0);
        assert_eq!(round_to(2.5, 0), 3.0);
    }
}
