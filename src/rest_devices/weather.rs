//! Mock weather station REST API

use super::{round_to, DOCUMENTATION_URL};
use crate::config::{env_parse, env_string};
use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use chrono::{DateTime, Timelike, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct WeatherStationConfig {
    pub device_id: String,
    pub location: String,
    pub host: String,
    pub port: u16,
}

impl Default for WeatherStationConfig {
    fn default() -> Self {
        Self {
            device_id: env_string("DEVICE_ID", "weather-station-001"),
            location: env_string("LOCATION", "Seattle"),
            host: env_string("HOST", "0.0.0.0"),
            port: env_parse("PORT", 8080),
        }
    }
}

const CONDITIONS: [&str; 8] = [
    "sunny",
    "partly_cloudy",
    "cloudy",
    "overcast",
    "light_rain",
    "rain",
    "foggy",
    "clear",
];

const SENSOR_MODEL: &str = "WeatherPro 3000";
const FIRMWARE_VERSION: &str = "1.2.3";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Temperature {
    pub celsius: f64,
    pub fahrenheit: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Humidity {
    pub percent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pressure {
    pub hpa: f64,
    pub inhg: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Weather {
    pub temperature: Temperature,
    pub humidity: Humidity,
    pub pressure: Pressure,
    pub conditions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationMetadata {
    pub sensor_model: String,
    pub firmware_version: String,
    pub battery_level: f64,
    pub signal_strength: f64,
    pub last_calibration: String,
}

/// One weather observation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherReading {
    pub timestamp: String,
    pub device_id: String,
    pub location: String,
    pub weather: Weather,
    pub metadata: StationMetadata,
}

pub struct WeatherStation {
    config: WeatherStationConfig,
    started_at: Instant,
}

impl WeatherStation {
    pub fn new(config: WeatherStationConfig) -> Self {
        Self {
            config,
            started_at: Instant::now(),
        }
    }

    /// 気温15〜30°C、湿度40〜90%、気圧993〜1033hPaの範囲で生成
    pub fn reading<R: Rng>(&self, at: DateTime<Utc>, rng: &mut R) -> WeatherReading {
        let celsius = 20.0 + rng.gen_range(-5.0..10.0);
        let humidity: f64 = 60.0 + rng.gen_range(-20.0..30.0);
        let hpa = 1013.25 + rng.gen_range(-20.0..20.0);
        let conditions = CONDITIONS.choose(rng).copied().unwrap_or("clear");

        WeatherReading {
            timestamp: at.to_rfc3339(),
            device_id: self.config.device_id.clone(),
            location: self.config.location.clone(),
            weather: Weather {
                temperature: Temperature {
                    celsius: round_to(celsius, 2),
                    fahrenheit: round_to(celsius * 9.0 / 5.0 + 32.0, 2),
                },
                humidity: Humidity {
                    percent: round_to(humidity.clamp(0.0, 100.0), 2),
                },
                pressure: Pressure {
                    hpa: round_to(hpa, 2),
                    inhg: round_to(hpa * 0.02953, 2),
                },
                conditions: conditions.to_string(),
            },
            metadata: StationMetadata {
                sensor_model: SENSOR_MODEL.to_string(),
                firmware_version: FIRMWARE_VERSION.to_string(),
                battery_level: round_to(rng.gen_range(85.0..100.0), 1),
                signal_strength: round_to(rng.gen_range(-70.0..-40.0), 1),
                last_calibration: "2025-09-15T10:30:00Z".to_string(),
            },
        }
    }

    /// One reading per hour of the current UTC day
    pub fn history<R: Rng>(&self, now: DateTime<Utc>, rng: &mut R) -> Vec<WeatherReading> {
        (0..24)
            .filter_map(|hour| now.with_hour(hour))
            .map(|at| self.reading(at, rng))
            .collect()
    }

    pub fn uptime_secs(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }
}

pub fn create_router(station: Arc<WeatherStation>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/weather", get(current_weather))
        .route("/api/weather/history", get(weather_history))
        .route("/api/device/info", get(device_info))
        .with_state(station)
}

async fn health(State(station): State<Arc<WeatherStation>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "device_id": station.config.device_id,
        "uptime": station.uptime_secs(),
        "location": station.config.location,
    }))
}

async fn current_weather(State(station): State<Arc<WeatherStation>>) -> Json<WeatherReading> {
    Json(station.reading(Utc::now(), &mut rand::thread_rng()))
}

async fn weather_history(State(station): State<Arc<WeatherStation>>) -> impl IntoResponse {
    let readings = station.history(Utc::now(), &mut rand::thread_rng());
    Json(json!({
        "device_id": station.config.device_id,
        "location": station.config.location,
        "period": "24_hours",
        "readings": readings,
    }))
}

async fn device_info(State(station): State<Arc<WeatherStation>>) -> impl IntoResponse {
    Json(json!({
        "device_id": station.config.device_id,
        "device_type": "weather_station",
        "location": station.config.location,
        "manufacturer": "MockCorp",
        "model": SENSOR_MODEL,
        "firmware_version": FIRMWARE_VERSION,
        "supported_protocols": ["http", "https"],
        "data_formats": ["json"],
        "endpoints": {
            "current_weather": "/api/weather",
            "weather_history": "/api/weather/history",
            "device_info": "/api/device/info",
            "health": "/health"
        },
        "polling_interval_recommendations": {
            "minimum_seconds": 15,
            "recommended_seconds": 60,
            "maximum_seconds": 300
        }
    }))
}

async fn root(State(station): State<Arc<WeatherStation>>) -> impl IntoResponse {
    Json(json!({
        "service": "Mock Weather Station API",
        "device_id": station.config.device_id,
        "location": station.config.location,
        "version": "1.0.0",
        "endpoints": ["/health", "/api/weather", "/api/weather/history", "/api/device/info"],
        "documentation": DOCUMENTATION_URL,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tower::ServiceExt;

    fn station() -> WeatherStation {
        WeatherStation::new(WeatherStationConfig {
            device_id: "ws-test".to_string(),
            location: "Tokyo".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
        })
    }

    async fn get_json(router: Router, uri: &str) -> serde_json::Value {
        let resp = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_reading_ranges() {
        let station = station();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let r = station.reading(Utc::now(), &mut rng);
            let t = &r.weather.temperature;
            assert!((15.0..=30.0).contains(&t.celsius));
            assert!((t.fahrenheit - round_to(t.celsius * 1.8 + 32.0, 2)).abs() < 0.05);
            assert!((40.0..=90.0).contains(&r.weather.humidity.percent));
            assert!((993.25..=1033.25).contains(&r.weather.pressure.hpa));
            assert!(CONDITIONS.contains(&r.weather.conditions.as_str()));
            assert!((85.0..=100.0).contains(&r.metadata.battery_level));
            assert!((-70.0..=-40.0).contains(&r.metadata.signal_strength));
        }
    }

    #[test]
    fn test_history_is_hourly() {
        let station = station();
        let now = Utc::now();
        let history = station.history(now, &mut StdRng::seed_from_u64(1));
        assert_eq!(history.len(), 24);
        for (hour, reading) in history.iter().enumerate() {
            let ts = DateTime::parse_from_rfc3339(&reading.timestamp).unwrap();
            assert_eq!(ts.hour() as usize, hour);
            assert_eq!(ts.date_naive(), now.date_naive());
        }
    }

    #[tokio::test]
    async fn test_routes() {
        let router = create_router(Arc::new(station()));

        let v = get_json(router.clone(), "/api/weather").await;
        assert_eq!(v["device_id"], "ws-test");
        assert_eq!(v["location"], "Tokyo");
        assert!(v["weather"]["pressure"]["inhg"].is_number());

        let v = get_json(router.clone(), "/api/weather/history").await;
        assert_eq!(v["period"], "24_hours");
        assert_eq!(v["readings"].as_array().unwrap().len(), 24);

        let v = get_json(router.clone(), "/api/device/info").await;
        assert_eq!(v["device_type"], "weather_station");
        assert_eq!(v["polling_interval_recommendations"]["recommended_seconds"], 60);

        let v = get_json(router.clone(), "/health").await;
        assert_eq!(v["status"], "healthy");

        let v = get_json(router, "/").await;
        assert_eq!(v["endpoints"].as_array().unwrap().len(), 4);
    }
}
