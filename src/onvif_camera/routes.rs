//! HTTP surface of the ONVIF simulator

use super::OnvifCamera;
use crate::soap::SOAP_CONTENT_TYPE;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Minimal JPEG (SOI + EOI markers) served as the snapshot placeholder
const SNAPSHOT_PLACEHOLDER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xD9];

pub fn create_router(camera: Arc<OnvifCamera>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/snapshot", get(snapshot))
        .route("/onvif/device_service", post(onvif_service))
        .route("/onvif/media_service", post(onvif_service))
        .route("/onvif/ptz_service", post(onvif_service))
        .route("/onvif/event_service", post(onvif_service))
        .route("/onvif/imaging_service", post(onvif_service))
        .with_state(camera)
}

async fn health(State(camera): State<Arc<OnvifCamera>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "device_id": camera.device_id(),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

async fn snapshot() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/jpeg")], SNAPSHOT_PLACEHOLDER)
}

async fn onvif_service(State(camera): State<Arc<OnvifCamera>>, body: String) -> Response {
    let reply = camera.handle_request(&body).await;
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, SOAP_CONTENT_TYPE)], reply.body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onvif_camera::OnvifCameraConfig;
    use crate::soap::{envelope, extract_xml_value};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn router() -> Router {
        create_router(Arc::new(OnvifCamera::new(OnvifCameraConfig {
            device_id: "cam-http".to_string(),
            host: "localhost".to_string(),
            port: 9000,
            username: None,
            password: None,
        })))
    }

    #[tokio::test]
    async fn test_health() {
        let resp = router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["status"], "healthy");
        assert_eq!(v["device_id"], "cam-http");
        assert!(v["timestamp"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_capabilities_over_http() {
        let req = Request::builder()
            .method("POST")
            .uri("/onvif/device_service")
            .header(header::CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(Body::from(envelope("<tds:GetCapabilities/>", None)))
            .unwrap();
        let resp = router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], SOAP_CONTENT_TYPE);

        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(
            crate::soap::extract_capability_xaddr(&text, "PTZ").as_deref(),
            Some("http://localhost:9000/onvif/ptz_service")
        );
    }

    #[tokio::test]
    async fn test_fault_is_500() {
        let req = Request::builder()
            .method("POST")
            .uri("/onvif/media_service")
            .body(Body::from("<not-soap/>"))
            .unwrap();
        let resp = router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert_eq!(extract_xml_value(&text, "Text").as_deref(), Some("No SOAP Body found"));
    }
}
