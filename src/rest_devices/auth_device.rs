//! Mock controller guarded by HTTP Basic authentication

use super::{round_to, DOCUMENTATION_URL};
use crate::config::{env_opt, env_parse, env_string};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use base64::Engine;
use chrono::{Duration as ChronoDuration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

pub const AUTH_REALM: &str = "Device API";

#[derive(Debug, Clone)]
pub struct AuthDeviceConfig {
    pub device_id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub serial_number: Option<String>,
}

impl Default for AuthDeviceConfig {
    fn default() -> Self {
        Self {
            device_id: env_string("DEVICE_ID", "auth-device-001"),
            host: env_string("HOST", "0.0.0.0"),
            port: env_parse("PORT", 8082),
            username: env_string("API_USERNAME", "deviceuser"),
            password: env_string("API_PASSWORD", "devicepass123"),
            serial_number: env_opt("SERIAL_NUMBER"),
        }
    }
}

const LOG_LEVELS: [&str; 4] = ["INFO", "WARN", "ERROR", "DEBUG"];
const LOG_MESSAGES: [&str; 8] = [
    "System startup completed successfully",
    "Configuration updated",
    "Network connection established",
    "Sensor reading collected",
    "Maintenance mode activated",
    "Authentication attempt logged",
    "Performance metrics updated",
    "Backup operation completed",
];
const LOG_COMPONENTS: [&str; 5] = ["auth", "network", "sensor", "system", "config"];

pub struct AuthDevice {
    config: AuthDeviceConfig,
    serial_number: String,
    started_at: Instant,
}

impl AuthDevice {
    pub fn new(config: AuthDeviceConfig) -> Self {
        let serial_number = config
            .serial_number
            .clone()
            .unwrap_or_else(|| format!("SDC{}", rand::thread_rng().gen_range(100_000..=999_999)));
        Self {
            config,
            serial_number,
            started_at: Instant::now(),
        }
    }

    /// Authorization ヘッダーの Basic 認証を検証
    pub fn is_authorized(&self, headers: &HeaderMap) -> bool {
        parse_basic_auth(headers)
            .map(|(user, pass)| user == self.config.username && pass == self.config.password)
            .unwrap_or(false)
    }

    pub fn status<R: Rng>(&self, rng: &mut R) -> Value {
        json!({
            "timestamp": Utc::now().to_rfc3339(),
            "device_id": self.config.device_id,
            "device_type": "authenticated_controller",
            "status": {
                "operational_state": pick(&["running", "standby", "maintenance"], rng),
                "health": pick(&["healthy", "warning", "normal"], rng),
                "cpu_usage": round_to(rng.gen_range(5.0..45.0), 2),
                "memory_usage": round_to(rng.gen_range(30.0..70.0), 2),
                "disk_usage": round_to(rng.gen_range(15.0..85.0), 2),
                "network_status": pick(&["connected", "connected", "slow", "unstable"], rng),
                "temperature": round_to(rng.gen_range(35.0..65.0), 2)
            },
            "metrics": {
                "uptime_seconds": rng.gen_range(3_600..=2_592_000),
                "total_requests": rng.gen_range(1_000..=50_000),
                "successful_operations": rng.gen_range(950..=49_500),
                "failed_operations": rng.gen_range(0..=50),
                "last_maintenance": "2025-09-15T08:00:00Z"
            },
            "configuration": {
                "firmware_version": "3.2.1",
                "config_version": "1.4.2",
                "security_level": "high",
                "auth_enabled": true,
                "logging_level": "info"
            }
        })
    }

    /// Last 10 entries, one minute apart, newest first
    pub fn logs<R: Rng>(&self, rng: &mut R) -> Vec<Value> {
        let now = Utc::now();
        (0..10)
            .map(|i| {
                json!({
                    "timestamp": (now - ChronoDuration::minutes(i)).to_rfc3339(),
                    "level": pick(&LOG_LEVELS, rng),
                    "message": pick(&LOG_MESSAGES, rng),
                    "component": pick(&LOG_COMPONENTS, rng),
                })
            })
            .collect()
    }
}

fn pick<R: Rng>(options: &[&'static str], rng: &mut R) -> &'static str {
    options.choose(rng).copied().unwrap_or_default()
}

/// `Authorization: Basic base64(user:pass)` → (user, pass)
pub fn parse_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, format!("Basic realm=\"{}\"", AUTH_REALM))],
        Json(json!({
            "error": "Authentication required",
            "message": "Please provide valid credentials"
        })),
    )
        .into_response()
}

async fn require_basic_auth(
    State(device): State<Arc<AuthDevice>>,
    request: Request,
    next: Next,
) -> Response {
    if !device.is_authorized(request.headers()) {
        tracing::warn!(path = %request.uri().path(), "Rejected request without valid credentials");
        return unauthorized();
    }
    next.run(request).await
}

pub fn create_router(device: Arc<AuthDevice>) -> Router {
    let protected = Router::new()
        .route("/health", get(health))
        .route("/api/device/status", get(device_status))
        .route("/api/device/config", get(device_config))
        .route("/api/device/logs", get(device_logs))
        .route("/api/auth/test", get(auth_test))
        .route_layer(middleware::from_fn_with_state(device.clone(), require_basic_auth));

    Router::new()
        .route("/", get(root))
        .merge(protected)
        .with_state(device)
}

async fn health(State(device): State<Arc<AuthDevice>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "device_id": device.config.device_id,
        "authenticated": true,
        "uptime": device.started_at.elapsed().as_secs_f64(),
    }))
}

async fn device_status(State(device): State<Arc<AuthDevice>>) -> Json<Value> {
    Json(device.status(&mut rand::thread_rng()))
}

async fn device_config(State(device): State<Arc<AuthDevice>>) -> impl IntoResponse {
    Json(json!({
        "device_id": device.config.device_id,
        "device_name": "Secure Industrial Controller",
        "manufacturer": "SecureDevices Corp",
        "model": "SDC-IC-2024",
        "serial_number": device.serial_number,
        "installation_date": "2025-08-01T00:00:00Z",
        "location": {
            "facility": "Building A",
            "floor": "Level 2",
            "room": "Control Room 201"
        },
        "network": {
            "ip_address": "192.168.1.100",
            "mac_address": "00:1B:44:11:3A:B7",
            "subnet": "255.255.255.0",
            "gateway": "192.168.1.1"
        },
        "security": {
            "auth_method": "basic_http",
            "encryption": "TLS 1.3",
            "certificate_expiry": "2026-08-01T00:00:00Z",
            "password_policy": "strong",
            "session_timeout": 3600
        },
        "capabilities": [
            "status_monitoring",
            "configuration_management",
            "remote_control",
            "data_logging",
            "alert_generation"
        ]
    }))
}

async fn device_logs(State(device): State<Arc<AuthDevice>>) -> impl IntoResponse {
    let logs = device.logs(&mut rand::thread_rng());
    Json(json!({
        "device_id": device.config.device_id,
        "log_count": logs.len(),
        "period": "last_10_entries",
        "logs": logs,
    }))
}

async fn auth_test(State(device): State<Arc<AuthDevice>>) -> impl IntoResponse {
    Json(json!({
        "message": "Authentication successful",
        "device_id": device.config.device_id,
        "timestamp": Utc::now().to_rfc3339(),
        "authenticated_user": device.config.username,
        "auth_method": "basic_http"
    }))
}

async fn root(State(device): State<Arc<AuthDevice>>) -> impl IntoResponse {
    Json(json!({
        "service": "Mock Authenticated Device API",
        "device_id": device.config.device_id,
        "version": "1.0.0",
        "authentication": "basic_http_required",
        "test_credentials": format!("{}:{}", device.config.username, device.config.password),
        "endpoints": [
            "/health (AUTH REQUIRED)",
            "/api/device/status (AUTH REQUIRED)",
            "/api/device/config (AUTH REQUIRED)",
            "/api/device/logs (AUTH REQUIRED)",
            "/api/auth/test (AUTH REQUIRED)"
        ],
        "authentication_note": "All endpoints except root require Basic HTTP authentication",
        "documentation": DOCUMENTATION_URL,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn device() -> Arc<AuthDevice> {
        Arc::new(AuthDevice::new(AuthDeviceConfig {
            device_id: "auth-test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            username: "deviceuser".to_string(),
            password: "devicepass123".to_string(),
            serial_number: Some("SDC123456".to_string()),
        }))
    }

    fn basic(user: &str, pass: &str) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, pass));
        format!("Basic {}", encoded)
    }

    async fn call(uri: &str, auth: Option<String>) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder().uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let resp = create_router(device())
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, headers, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_parse_basic_auth() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, basic("a", "b:c").parse().unwrap());
        assert_eq!(parse_basic_auth(&headers), Some(("a".into(), "b:c".into())));

        headers.insert(header::AUTHORIZATION, "Bearer xyz".parse().unwrap());
        assert_eq!(parse_basic_auth(&headers), None);

        headers.insert(header::AUTHORIZATION, "Basic !!!".parse().unwrap());
        assert_eq!(parse_basic_auth(&headers), None);
    }

    #[tokio::test]
    async fn test_missing_credentials_challenge() {
        let (status, headers, body) = call("/api/device/status", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(headers[header::WWW_AUTHENTICATE], "Basic realm=\"Device API\"");
        assert_eq!(body["error"], "Authentication required");

        let (status, _, _) = call("/health", Some(basic("deviceuser", "wrong"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_authorized_requests() {
        let auth = Some(basic("deviceuser", "devicepass123"));

        let (status, _, body) = call("/api/device/status", auth.clone()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["device_type"], "authenticated_controller");
        assert_eq!(body["configuration"]["auth_enabled"], true);

        let (_, _, body) = call("/api/device/logs", auth.clone()).await;
        assert_eq!(body["log_count"], 10);
        assert_eq!(body["logs"].as_array().unwrap().len(), 10);

        let (_, _, body) = call("/api/device/config", auth.clone()).await;
        assert_eq!(body["serial_number"], "SDC123456");

        let (_, _, body) = call("/api/auth/test", auth).await;
        assert_eq!(body["authenticated_user"], "deviceuser");
    }

    #[tokio::test]
    async fn test_root_is_public() {
        let (status, _, body) = call("/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["test_credentials"], "deviceuser:devicepass123");
    }
}
