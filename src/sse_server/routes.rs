//! SSE HTTP surface

use super::events::{AnalyticsEvent, EVENT_TYPES};
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::stream::{self, Stream};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Shared server state
#[derive(Clone)]
pub struct SseState {
    pub device_id: Arc<str>,
    pub heartbeat_interval_secs: u64,
    pub events: broadcast::Sender<AnalyticsEvent>,
}

pub fn create_router(state: SseState) -> Router {
    Router::new()
        .route("/camera-events", get(camera_events))
        .route("/health", get(health))
        .route("/", get(info))
        .with_state(state)
}

async fn health(State(state): State<SseState>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "device_id": &*state.device_id,
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

async fn info(State(state): State<SseState>) -> impl IntoResponse {
    Json(json!({
        "device_id": &*state.device_id,
        "device_type": "analytics-camera",
        "sse_endpoint": "/camera-events",
        "event_types": EVENT_TYPES,
        "heartbeat_interval_seconds": state.heartbeat_interval_secs,
    }))
}

/// Render one event in SSE wire form
pub fn to_sse_event(event: &AnalyticsEvent) -> Option<Event> {
    match serde_json::to_string(event) {
        Ok(data) => Some(Event::default().event(event.event_type()).data(data)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize SSE event");
            None
        }
    }
}

fn subscriber_stream(rx: broadcast::Receiver<AnalyticsEvent>) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(sse) = to_sse_event(&event) {
                        return Some((Ok(sse), rx));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "SSE client lagging, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}

async fn camera_events(State(state): State<SseState>) -> impl IntoResponse {
    tracing::info!(device_id = %state.device_id, "New SSE client connected");
    let rx = state.events.subscribe();
    Sse::new(subscriber_stream(rx)).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
