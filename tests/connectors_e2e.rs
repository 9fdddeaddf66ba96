//! Connectors driven against the in-process simulators
//!
//! Each test binds a simulator router on 127.0.0.1:0 and points the matching
//! connector at it, with a `RecordingPublisher` in place of the broker.

use edgekit::mqtt::{IncomingMessage, MqttSettings, RecordingPublisher};
use edgekit::onvif_camera::{self, OnvifCamera, OnvifCameraConfig};
use edgekit::onvif_connector::{OnvifClient, OnvifConnector, OnvifConnectorConfig};
use edgekit::retry::Backoff;
use edgekit::sse_connector::{SseConnector, SseConnectorConfig};
use edgekit::sse_server::{self, AnalyticsEvent, SseState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

async fn spawn(router: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn mqtt_settings() -> MqttSettings {
    MqttSettings {
        host: "localhost".to_string(),
        port: 1883,
        client_id: "e2e".to_string(),
        keep_alive: Duration::from_secs(60),
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..50 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn onvif_connector_discovers_and_moves_camera() {
    let camera = Arc::new(OnvifCamera::new(OnvifCameraConfig {
        device_id: "cam-e2e".to_string(),
        host: "127.0.0.1".to_string(),
        port: 0,
        username: Some("admin".to_string()),
        password: Some("secret".to_string()),
    }));
    let addr = spawn(onvif_camera::create_router(camera.clone())).await;

    let publisher = Arc::new(RecordingPublisher::new());
    let connector = OnvifConnector::new(
        OnvifConnectorConfig {
            onvif_host: addr.ip().to_string(),
            onvif_port: addr.port(),
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
            mqtt: mqtt_settings(),
            topic_prefix: "cam".to_string(),
            event_poll_interval: 1,
        },
        publisher.clone(),
    );

    let device = connector.connect(&mut Backoff::default()).await.unwrap();
    assert_eq!(device.info.manufacturer.as_deref(), Some("Edge AI Simulator"));
    assert_eq!(device.profiles.len(), camera.profiles().len());
    assert!(device.capabilities.supports_ptz());
    assert!(publisher.topics().contains(&"cam/device/info".to_string()));

    connector.publish_status().await;
    let (_, status) = publisher
        .json_messages()
        .into_iter()
        .find(|(topic, _)| topic == "cam/status")
        .expect("status heartbeat");
    assert_eq!(status["connected"], true);
    assert_eq!(status["device_id"], device.device_id().as_str());

    connector
        .handle_ptz_message(&IncomingMessage {
            topic: "cam/ptz/command/pan".to_string(),
            payload: b"15".to_vec(),
        })
        .await
        .unwrap();
    let state = camera.snapshot_state().await;
    assert!((state.position.pan - 15.0).abs() < 1e-9);
    assert!((state.position.tilt - 0.0).abs() < 1e-9);

    assert!(connector.poll_events().await.is_ok());
    assert_eq!(connector.stats().await.ptz_commands, 1);

    let intruder = OnvifClient::new(
        &format!("http://{}", addr),
        Some(("admin".to_string(), "wrong".to_string())),
    );
    assert!(intruder.get_device_information().await.is_err());
}

#[tokio::test]
async fn sse_connector_routes_streamed_events() {
    let (tx, _) = broadcast::channel(16);
    let addr = spawn(sse_server::create_router(SseState {
        device_id: Arc::from("sse-e2e"),
        heartbeat_interval_secs: 5,
        events: tx.clone(),
    }))
    .await;

    let publisher = Arc::new(RecordingPublisher::new());
    let config = SseConnectorConfig {
        sse_endpoint: format!("http://{}/camera-events", addr),
        ..SseConnectorConfig::default()
    };
    let heartbeat_topic = config.topic_heartbeat.clone();
    let connector = Arc::new(SseConnector::new(config, publisher.clone()));
    let task = tokio::spawn({
        let connector = connector.clone();
        async move { connector.run().await }
    });

    assert!(wait_for(|| tx.receiver_count() > 0).await, "connector never subscribed");
    tx.send(AnalyticsEvent::Heartbeat { timestamp: 1_700_000_000_000 }).unwrap();

    assert!(wait_for(|| !publisher.topics().is_empty()).await, "no event published");
    let messages = publisher.json_messages();
    assert_eq!(messages[0].0, heartbeat_topic);
    assert_eq!(messages[0].1["timestamp"], 1_700_000_000_000i64);
    assert_eq!(connector.stats().await.by_type.get("HEARTBEAT"), Some(&1));

    task.abort();
}
