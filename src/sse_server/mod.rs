//! SseServer - analytics camera Server-Sent Events simulator
//!
//! ## Responsibilities
//!
//! - Once-per-second event simulation (heartbeats, leak alerts, analytics toggles)
//! - Fan-out of every event to all connected SSE clients
//! - `/camera-events`, `/health`, `/` endpoints

mod events;
mod routes;

pub use events::*;
pub use routes::{create_router, to_sse_event, SseState};

use crate::config::bind_addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// Drive the simulator, broadcasting each generated event
pub fn spawn_simulator(
    config: &SseServerConfig,
    tx: broadcast::Sender<AnalyticsEvent>,
) -> tokio::task::JoinHandle<()> {
    let mut simulator = AnalyticsEventSimulator::new(
        Duration::from_secs(config.heartbeat_interval),
        config.alert_probability,
        Instant::now(),
    );
    let device_id = config.device_id.clone();

    tokio::spawn(async move {
        tracing::info!(device_id = %device_id, "Starting SSE event generation");
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticker.tick().await;
            let timestamp = chrono::Utc::now().timestamp_millis();
            let events = simulator.tick(Instant::now(), timestamp, &mut rand::thread_rng());
            for event in events {
                tracing::debug!(event_type = event.event_type(), "Generated event");
                // 購読者がいない場合の送信エラーは無視
                let _ = tx.send(event);
            }
        }
    })
}

pub async fn run(config: SseServerConfig) -> crate::Result<()> {
    let addr = bind_addr(&config.host, config.port)?;
    let (tx, _) = broadcast::channel(256);
    let simulator = spawn_simulator(&config, tx.clone());

    let state = SseState {
        device_id: Arc::from(config.device_id.as_str()),
        heartbeat_interval_secs: config.heartbeat_interval,
        events: tx,
    };
    let result = crate::server::serve("sse-server", addr, create_router(state)).await;
    simulator.abort();
    result
}
