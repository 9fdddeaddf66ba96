//! Mock generic sensor REST API (DHT11/DHT22 style) with field endpoints

use super::fields::{FieldSimulator, FieldValue, FieldsArrayResponse};
use super::{round_to, DOCUMENTATION_URL};
use crate::config::{env_parse, env_string};
use crate::error::Result;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct SensorConfig {
    pub device_id: String,
    pub sensor_type: String,
    pub host: String,
    pub port: u16,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            device_id: env_string("DEVICE_ID", "generic-sensor-001"),
            sensor_type: env_string("SENSOR_TYPE", "temperature-humidity"),
            host: env_string("HOST", "0.0.0.0"),
            port: env_parse("PORT", 8081),
        }
    }
}

const FIRMWARE_VERSION: &str = "2.1.4";
const READING_QUALITY: [&str; 3] = ["good", "excellent", "fair"];

pub struct SensorSimulator {
    config: SensorConfig,
    fields: FieldSimulator,
    started_at: Instant,
}

impl SensorSimulator {
    pub fn new(config: SensorConfig, fields: FieldSimulator) -> Self {
        Self {
            config,
            fields,
            started_at: Instant::now(),
        }
    }

    /// 温度15〜35°C、湿度20〜90%
    pub fn reading<R: Rng>(&self, rng: &mut R) -> Value {
        let celsius = round_to(rng.gen_range(15.0..35.0), 2);
        let humidity = round_to(rng.gen_range(20.0..90.0), 2);
        json!({
            "timestamp": Utc::now().format("%Y/%m/%d %H:%M:%S").to_string(),
            "device_id": self.config.device_id,
            "sensor_type": self.config.sensor_type,
            "temperature": {
                "celsius": celsius,
                "fahrenheit": round_to(celsius * 9.0 / 5.0 + 32.0, 2)
            },
            "humidity": {
                "percent": humidity
            },
            "status": {
                "error_code": 0,
                "error_message": "OK",
                "sensor_health": "normal",
                "reading_quality": READING_QUALITY.choose(rng).copied().unwrap_or("good")
            }
        })
    }
}

pub fn create_router(sensor: Arc<SensorSimulator>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/sensor/data", get(sensor_data))
        .route("/api/sensor/status", get(sensor_status))
        .route("/api/device/info", get(device_info))
        .route("/sensor/field/:field_id", get(field_value))
        .route("/sensor/array/field", get(field_array))
        .with_state(sensor)
}

async fn health(State(sensor): State<Arc<SensorSimulator>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "device_id": sensor.config.device_id,
        "sensor_type": sensor.config.sensor_type,
        "uptime": sensor.started_at.elapsed().as_secs_f64(),
    }))
}

async fn sensor_data(State(sensor): State<Arc<SensorSimulator>>) -> Json<Value> {
    Json(sensor.reading(&mut rand::thread_rng()))
}

async fn sensor_status(State(sensor): State<Arc<SensorSimulator>>) -> impl IntoResponse {
    let mut rng = rand::thread_rng();
    Json(json!({
        "device_id": sensor.config.device_id,
        "sensor_type": sensor.config.sensor_type,
        "status": "online",
        "last_reading": Utc::now().to_rfc3339(),
        "total_readings": rng.gen_range(1000..=10000),
        "error_count": rng.gen_range(0..=5),
        "calibration_date": "2025-09-01T12:00:00Z",
        "next_calibration": "2026-03-01T12:00:00Z",
        "firmware_version": FIRMWARE_VERSION,
        "hardware_revision": "Rev C"
    }))
}

async fn device_info(State(sensor): State<Arc<SensorSimulator>>) -> impl IntoResponse {
    let serial: u32 = rand::thread_rng().gen_range(100_000..=999_999);
    Json(json!({
        "device_id": sensor.config.device_id,
        "device_type": "sensor",
        "sensor_type": sensor.config.sensor_type,
        "manufacturer": "MockSensors Inc",
        "model": "MS-TH-2024",
        "serial_number": format!("MS{}", serial),
        "firmware_version": FIRMWARE_VERSION,
        "supported_protocols": ["http"],
        "data_formats": ["json"],
        "measurement_ranges": {
            "temperature": {"min_celsius": -40, "max_celsius": 80, "accuracy": "±2°C"},
            "humidity": {"min_percent": 0, "max_percent": 100, "accuracy": "±5%"}
        },
        "endpoints": {
            "current_data": "/api/sensor/data",
            "sensor_status": "/api/sensor/status",
            "device_info": "/api/device/info",
            "health": "/health",
            "field": "/sensor/field/{field_id}",
            "fields": "/sensor/array/field?field_id=..."
        },
        "fields": sensor.fields.field_ids().collect::<Vec<_>>(),
        "polling_recommendations": {
            "minimum_interval_seconds": 5,
            "recommended_interval_seconds": 15,
            "maximum_rate_per_minute": 60
        }
    }))
}

async fn field_value(
    State(sensor): State<Arc<SensorSimulator>>,
    Path(field_id): Path<String>,
) -> Result<Json<FieldValue>> {
    let value = sensor.fields.read(&field_id, Utc::now(), &mut rand::thread_rng())?;
    Ok(Json(value))
}

/// `?field_id=a&field_id=b` or `?field_id=a,b`
async fn field_array(
    State(sensor): State<Arc<SensorSimulator>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<FieldsArrayResponse>> {
    let ids: Vec<String> = params
        .iter()
        .filter(|(key, _)| key == "field_id")
        .flat_map(|(_, value)| value.split(','))
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .collect();
    let response = sensor.fields.read_many(&ids, Utc::now(), &mut rand::thread_rng())?;
    tracing::debug!(requested = ids.len(), returned = response.count, "Served field array");
    Ok(Json(response))
}

async fn root(State(sensor): State<Arc<SensorSimulator>>) -> impl IntoResponse {
    let meta = sensor.fields.metadata();
    Json(json!({
        "service": "Mock Generic Sensor API",
        "device_id": sensor.config.device_id,
        "sensor_type": sensor.config.sensor_type,
        "version": "1.0.0",
        "endpoints": [
            "/health",
            "/api/sensor/data",
            "/api/sensor/status",
            "/api/device/info",
            "/sensor/field/{field_id}",
            "/sensor/array/field"
        ],
        "field_simulator": {
            "device_id": meta.device_id,
            "version": meta.version,
            "description": meta.description
        },
        "documentation": DOCUMENTATION_URL,
    }))
}
