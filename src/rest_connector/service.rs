//! Scheduled REST polling republished onto MQTT

use super::payload::{attach_metadata, base_metadata, error_payload, normalize_sensor_payload};
use crate::config::{env_list, env_parse, env_string};
use crate::error::{Error, Result};
use crate::mqtt::{MqttSettings, Publisher, QoS};
use crate::retry::retry_fixed;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const DEFAULT_FIELD_IDS: [&str; 5] = [
    "temp-celsius-01",
    "humidity-pct-01",
    "pressure-kpa-01",
    "status-indicator-01",
    "alarm-light-01",
];

#[derive(Debug, Clone)]
pub struct RestConnectorConfig {
    pub mqtt: MqttSettings,
    pub weather_endpoint: String,
    pub sensor_fields_endpoint: String,
    pub sensor_field_ids: Vec<String>,
    pub auth_endpoint: String,
    pub auth_username: String,
    pub auth_password: String,
    pub weather_topic: String,
    pub sensor_topic: String,
    pub auth_device_topic: String,
    pub error_topic: String,
    pub polling_interval: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// 初回ポーリング前の待機（エンドポイント起動待ち）
    pub startup_delay: Duration,
}

impl Default for RestConnectorConfig {
    fn default() -> Self {
        Self {
            mqtt: MqttSettings::from_env(
                "AIO_BROKER_HOSTNAME",
                "AIO_BROKER_TCP_PORT",
                "AIO_MQTT_CLIENT_ID",
                "mosquitto-broker",
                "akri-rest-connector-test",
            ),
            weather_endpoint: env_string("WEATHER_ENDPOINT", "http://weather-station:8080/api/weather"),
            sensor_fields_endpoint: env_string(
                "SENSOR_FIELDS_ENDPOINT",
                "http://sensor-simulator:8081/sensor/array/field",
            ),
            sensor_field_ids: env_list("SENSOR_FIELD_IDS", &DEFAULT_FIELD_IDS),
            auth_endpoint: env_string("AUTH_ENDPOINT", "http://authenticated-device:8082/api/device/status"),
            auth_username: env_string("AUTH_USERNAME", "device_user"),
            auth_password: env_string("AUTH_PASSWORD", "device_pass_123"),
            weather_topic: env_string("WEATHER_TOPIC", "akri/weather-station-001/data"),
            sensor_topic: env_string("SENSOR_TOPIC", "akri/generic-sensor-001/data"),
            auth_device_topic: env_string("AUTH_DEVICE_TOPIC", "akri/auth-device-001/status"),
            error_topic: env_string("ERROR_TOPIC", "akri/errors"),
            polling_interval: Duration::from_secs(env_parse("POLLING_INTERVAL_SECONDS", 30)),
            retry_attempts: env_parse("RETRY_ATTEMPTS", 3),
            retry_delay: Duration::from_secs(env_parse("RETRY_DELAY_SECONDS", 5)),
            startup_delay: Duration::from_secs(env_parse("STARTUP_DELAY_SECONDS", 10)),
        }
    }
}

impl RestConnectorConfig {
    /// Sensor endpoint with one `field_id` query parameter per requested field
    pub fn sensor_fields_url(&self) -> String {
        if self.sensor_field_ids.is_empty() {
            return self.sensor_fields_endpoint.clone();
        }
        let params = self.sensor_field_ids.iter().map(|id| ("field_id", id.as_str()));
        match reqwest::Url::parse_with_params(&self.sensor_fields_endpoint, params) {
            Ok(url) => url.to_string(),
            Err(e) => {
                tracing::warn!(endpoint = %self.sensor_fields_endpoint, error = %e, "Invalid sensor endpoint URL");
                self.sensor_fields_endpoint.clone()
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RestConnectorStats {
    pub polls: u64,
    pub published: u64,
    pub errors: u64,
}

pub struct RestConnector {
    config: RestConnectorConfig,
    publisher: Arc<dyn Publisher>,
    http: reqwest::Client,
    stats: RwLock<RestConnectorStats>,
}

impl RestConnector {
    pub fn new(config: RestConnectorConfig, publisher: Arc<dyn Publisher>) -> Self {
        Self {
            config,
            publisher,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            stats: RwLock::new(RestConnectorStats::default()),
        }
    }

    pub async fn stats(&self) -> RestConnectorStats {
        self.stats.read().await.clone()
    }

    /// GET + JSON decode with fixed-delay retries; returns the last error
    pub async fn fetch_with_retry(
        &self,
        url: &str,
        auth: Option<(&str, &str)>,
        endpoint_name: &str,
    ) -> Result<Value> {
        let attempts = self.config.retry_attempts;
        let result = retry_fixed(attempts, self.config.retry_delay, |attempt| async move {
            tracing::debug!(endpoint = %endpoint_name, attempt = attempt, max = attempts, "Fetching data");
            let mut request = self.http.get(url);
            if let Some((user, pass)) = auth {
                request = request.basic_auth(user, Some(pass));
            }
            let response = request.send().await?.error_for_status()?;
            Ok::<Value, Error>(response.json::<Value>().await?)
        })
        .await;

        match &result {
            Ok(_) => tracing::info!(endpoint = %endpoint_name, "Successfully retrieved data"),
            Err(e) => tracing::error!(endpoint = %endpoint_name, error = %e, "All attempts failed"),
        }
        result
    }

    fn publish(&self, topic: &str, payload: &Value) -> bool {
        match self.publisher.publish_json(topic, payload, QoS::AtLeastOnce, false) {
            Ok(()) => {
                tracing::info!(topic = %topic, "Published data");
                true
            }
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "Failed to publish");
                false
            }
        }
    }

    async fn publish_data(&self, topic: &str, payload: Map<String, Value>) {
        let ok = self.publish(topic, &Value::Object(payload));
        let mut stats = self.stats.write().await;
        if ok {
            stats.published += 1;
        } else {
            stats.errors += 1;
        }
    }

    pub async fn publish_error(&self, endpoint_name: &str, message: &str) {
        let payload = error_payload(
            &chrono::Utc::now().to_rfc3339(),
            endpoint_name,
            message,
            self.config.retry_attempts,
        );
        self.stats.write().await.errors += 1;
        self.publish(&self.config.error_topic, &payload);
    }

    fn metadata(&self) -> Map<String, Value> {
        base_metadata(
            self.config.polling_interval.as_secs(),
            &chrono::Utc::now().to_rfc3339(),
        )
    }

    pub async fn poll_weather_station(&self) {
        tracing::info!("Polling weather station");
        let data = self
            .fetch_with_retry(&self.config.weather_endpoint, None, "weather-station")
            .await;
        match data {
            Ok(Value::Object(mut payload)) => {
                attach_metadata(&mut payload, self.metadata());
                self.publish_data(&self.config.weather_topic, payload).await;
            }
            Ok(_) => {
                self.publish_error("weather-station", "Received unexpected weather payload format")
                    .await
            }
            Err(_) => {
                self.publish_error("weather-station", "Failed to retrieve weather data")
                    .await
            }
        }
    }

    pub async fn poll_sensor_device(&self) {
        tracing::info!("Polling sensor device");
        let url = self.config.sensor_fields_url();
        let data = match self.fetch_with_retry(&url, None, "sensor-device-fields").await {
            Ok(data) => data,
            Err(_) => {
                self.publish_error("sensor-device", "Failed to retrieve sensor data")
                    .await;
                return;
            }
        };

        let Some(mut normalized) = normalize_sensor_payload(&data) else {
            self.publish_error("sensor-device", "Received unexpected sensor payload format")
                .await;
            return;
        };

        let mut meta = self.metadata();
        meta.insert(
            "source_mode".into(),
            normalized.get("source").cloned().unwrap_or_else(|| "fields-array".into()),
        );
        meta.insert("endpoint_used".into(), Value::from(url));
        meta.insert(
            "field_ids".into(),
            Value::from(self.config.sensor_field_ids.clone()),
        );
        meta.insert(
            "field_count".into(),
            normalized.get("count").cloned().unwrap_or_else(|| 0.into()),
        );
        attach_metadata(&mut normalized, meta);
        self.publish_data(&self.config.sensor_topic, normalized).await;
    }

    pub async fn poll_authenticated_device(&self) {
        tracing::info!("Polling authenticated device");
        let auth = Some((self.config.auth_username.as_str(), self.config.auth_password.as_str()));
        let data = self
            .fetch_with_retry(&self.config.auth_endpoint, auth, "authenticated-device")
            .await;
        match data {
            Ok(Value::Object(mut payload)) => {
                let mut meta = self.metadata();
                meta.insert("authentication".into(), Value::from("basic_http"));
                attach_metadata(&mut payload, meta);
                self.publish_data(&self.config.auth_device_topic, payload).await;
            }
            Ok(_) => {
                self.publish_error(
                    "authenticated-device",
                    "Received unexpected authenticated device payload format",
                )
                .await
            }
            Err(_) => {
                self.publish_error(
                    "authenticated-device",
                    "Failed to retrieve authenticated device data",
                )
                .await
            }
        }
    }

    /// 全エンドポイントを一巡ポーリング
    pub async fn poll_all(&self) {
        self.stats.write().await.polls += 1;
        tokio::join!(
            self.poll_weather_station(),
            self.poll_sensor_device(),
            self.poll_authenticated_device(),
        );
    }

    /// Poll immediately, then every `polling_interval` until shutdown
    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            polling_interval_secs = self.config.polling_interval.as_secs(),
            retry_attempts = self.config.retry_attempts,
            sensor_endpoint = %self.config.sensor_fields_endpoint,
            field_ids = ?self.config.sensor_field_ids,
            "Starting REST connector"
        );
        let shutdown = crate::server::shutdown_signal();
        tokio::pin!(shutdown);

        tracing::info!(delay_secs = self.config.startup_delay.as_secs(), "Waiting for REST endpoints");
        tokio::select! {
            _ = tokio::time::sleep(self.config.startup_delay) => {}
            _ = &mut shutdown => return Ok(()),
        }

        let mut ticker = tokio::time::interval(self.config.polling_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.poll_all().await,
                _ = &mut shutdown => break,
            }
        }

        let stats = self.stats().await;
        tracing::info!(
            polls = stats.polls,
            published = stats.published,
            errors = stats.errors,
            "Shutting down REST connector"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mqtt::RecordingPublisher;
    use crate::rest_devices::{
        auth_device_router, sensor_router, weather_router, AuthDevice, AuthDeviceConfig,
        FieldSimulator, FieldsConfig, SensorConfig, SensorSimulator, WeatherStation,
        WeatherStationConfig,
    };
    use axum::Router;

    async fn spawn(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn config() -> RestConnectorConfig {
        RestConnectorConfig {
            retry_attempts: 2,
            retry_delay: Duration::ZERO,
            startup_delay: Duration::ZERO,
            ..RestConnectorConfig::default()
        }
    }

    #[test]
    fn test_sensor_fields_url() {
        let mut cfg = config();
        cfg.sensor_fields_endpoint = "http://sensor:8081/sensor/array/field".to_string();
        cfg.sensor_field_ids = vec!["a-1".to_string(), "b 2".to_string()];
        assert_eq!(
            cfg.sensor_fields_url(),
            "http://sensor:8081/sensor/array/field?field_id=a-1&field_id=b+2"
        );

        cfg.sensor_field_ids.clear();
        assert_eq!(cfg.sensor_fields_url(), "http://sensor:8081/sensor/array/field");
    }

    #[tokio::test]
    async fn test_poll_weather_adds_metadata() {
        let base = spawn(weather_router(Arc::new(WeatherStation::new(WeatherStationConfig {
            device_id: "ws-1".to_string(),
            location: "Oslo".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
        }))))
        .await;

        let publisher = Arc::new(RecordingPublisher::new());
        let mut cfg = config();
        cfg.weather_endpoint = format!("{}/api/weather", base);
        let connector = RestConnector::new(cfg.clone(), publisher.clone());
        connector.poll_weather_station().await;

        let msgs = publisher.json_messages();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].0, cfg.weather_topic);
        assert_eq!(msgs[0].1["device_id"], "ws-1");
        assert_eq!(msgs[0].1["connector_metadata"]["connector_type"], "akri-rest-connector");
        assert_eq!(msgs[0].1["connector_metadata"]["polling_interval"], 30);
    }

    #[tokio::test]
    async fn test_poll_sensor_fields() {
        let sensor = SensorSimulator::new(
            SensorConfig {
                device_id: "s-1".to_string(),
                sensor_type: "temperature-humidity".to_string(),
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            FieldSimulator::new(FieldsConfig::builtin()),
        );
        let base = spawn(sensor_router(Arc::new(sensor))).await;

        let publisher = Arc::new(RecordingPublisher::new());
        let mut cfg = config();
        cfg.sensor_fields_endpoint = format!("{}/sensor/array/field", base);
        cfg.sensor_field_ids = vec!["temp-celsius-01".to_string(), "alarm-light-01".to_string()];
        let connector = RestConnector::new(cfg.clone(), publisher.clone());
        connector.poll_sensor_device().await;

        let msgs = publisher.json_messages();
        assert_eq!(msgs[0].0, cfg.sensor_topic);
        let body = &msgs[0].1;
        assert_eq!(body["count"], 2);
        assert_eq!(body["source"], "fields-array");
        assert_eq!(body["connector_metadata"]["field_count"], 2);
        assert_eq!(body["connector_metadata"]["source_mode"], "fields-array");
    }

    #[tokio::test]
    async fn test_poll_auth_device() {
        let device = AuthDevice::new(AuthDeviceConfig {
            device_id: "auth-1".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            username: "u".to_string(),
            password: "p".to_string(),
            serial_number: None,
        });
        let base = spawn(auth_device_router(Arc::new(device))).await;

        let publisher = Arc::new(RecordingPublisher::new());
        let mut cfg = config();
        cfg.auth_endpoint = format!("{}/api/device/status", base);
        cfg.auth_username = "u".to_string();
        cfg.auth_password = "p".to_string();
        let connector = RestConnector::new(cfg.clone(), publisher.clone());
        connector.poll_authenticated_device().await;

        let msgs = publisher.json_messages();
        assert_eq!(msgs[0].0, cfg.auth_device_topic);
        assert_eq!(msgs[0].1["connector_metadata"]["authentication"], "basic_http");

        // wrong password -> 401 on every attempt -> error topic
        let publisher = Arc::new(RecordingPublisher::new());
        cfg.auth_password = "wrong".to_string();
        let connector = RestConnector::new(cfg.clone(), publisher.clone());
        connector.poll_authenticated_device().await;

        let msgs = publisher.json_messages();
        assert_eq!(msgs[0].0, cfg.error_topic);
        assert_eq!(msgs[0].1["endpoint"], "authenticated-device");
        assert_eq!(msgs[0].1["retry_attempts"], 2);
        assert_eq!(connector.stats().await.errors, 1);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_publishes_error() {
        let publisher = Arc::new(RecordingPublisher::new());
        let mut cfg = config();
        // port 9 (discard) on loopback is expected to refuse connections
        cfg.weather_endpoint = "http://127.0.0.1:9/api/weather".to_string();
        let connector = RestConnector::new(cfg.clone(), publisher.clone());
        assert!(connector
            .fetch_with_retry(&cfg.weather_endpoint, None, "weather-station")
            .await
            .is_err());

        connector.poll_weather_station().await;
        let msgs = publisher.json_messages();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].1["error"], "Failed to retrieve weather data");
        assert_eq!(msgs[0].1["connector"], "akri-rest-connector-test");
    }
}
