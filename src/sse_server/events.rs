//! Analytics camera events and the randomised event source

use crate::config::{env_parse, env_string};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// SSE server configuration
#[derive(Debug, Clone)]
pub struct SseServerConfig {
    pub device_id: String,
    pub host: String,
    pub port: u16,
    pub heartbeat_interval: u64,
    pub alert_probability: f64,
}

impl Default for SseServerConfig {
    fn default() -> Self {
        Self {
            device_id: env_string("DEVICE_ID", "analytics-camera-001"),
            host: env_string("HOST", "0.0.0.0"),
            port: env_parse("PORT", 8080),
            heartbeat_interval: env_parse("HEARTBEAT_INTERVAL", 5),
            alert_probability: env_parse("ALERT_PROBABILITY", 0.1),
        }
    }
}

pub const ANALYTICS_TYPE: &str = "leak detection";

/// 初期イベントID（最初に発行されるIDは+1）
pub const INITIAL_EVENT_ID: u64 = 1000;

pub const EVENT_TYPES: [&str; 5] = [
    "HEARTBEAT",
    "ANALYTICS_ENABLED",
    "ANALYTICS_DISABLED",
    "ALERT",
    "ALERT_DLQC",
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

/// Detailed leak alert (ALERT_DLQC)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedAlert {
    pub timestamp: i64,
    pub message: String,
    pub event_id: u64,
    pub camera_id: u32,
    pub leak_location: GeoPoint,
    pub camera_location: GeoPoint,
    pub flow_rate: f64,
    pub unit: String,
    pub mass: f64,
    pub mass_unit: String,
    pub confidence_level: u32,
    pub camera_orientation: u32,
    pub depression_angle: u32,
    pub wind_speed: f64,
    pub wind_speed_unit: String,
    pub wind_direction: u32,
    pub temperature: f64,
    pub temperature_unit: String,
    pub humidity: u32,
}

/// Analytics camera event; serialized with its SSE event name in `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalyticsEvent {
    Heartbeat {
        timestamp: i64,
    },
    AnalyticsEnabled {
        timestamp: i64,
        analytics_type: String,
    },
    AnalyticsDisabled {
        timestamp: i64,
        analytics_type: String,
    },
    Alert {
        timestamp: i64,
        message: String,
        event_id: u64,
    },
    AlertDlqc(DetailedAlert),
}

impl AnalyticsEvent {
    /// SSE `event:` name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Heartbeat { .. } => "HEARTBEAT",
            Self::AnalyticsEnabled { .. } => "ANALYTICS_ENABLED",
            Self::AnalyticsDisabled { .. } => "ANALYTICS_DISABLED",
            Self::Alert { .. } => "ALERT",
            Self::AlertDlqc(_) => "ALERT_DLQC",
        }
    }
}

/// イベントシミュレータ
#[derive(Debug)]
pub struct AnalyticsEventSimulator {
    heartbeat_interval: Duration,
    alert_probability: f64,
    analytics_enabled: bool,
    event_id_counter: u64,
    last_heartbeat: Instant,
}

impl AnalyticsEventSimulator {
    pub fn new(heartbeat_interval: Duration, alert_probability: f64, now: Instant) -> Self {
        Self {
            heartbeat_interval,
            alert_probability: alert_probability.clamp(0.0, 1.0),
            analytics_enabled: true,
            event_id_counter: INITIAL_EVENT_ID,
            last_heartbeat: now,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    pub fn analytics_enabled(&self) -> bool {
        self.analytics_enabled
    }

    /// One simulation step (called once per second)
    ///
    /// - heartbeat once the interval has elapsed
    /// - 5%: re-enable analytics if disabled
    /// - alert with `alert_probability` while enabled (70% detailed)
    /// - 2%: disable analytics if enabled
    pub fn tick<R: Rng>(&mut self, now: Instant, timestamp: i64, rng: &mut R) -> Vec<AnalyticsEvent> {
        let mut events = Vec::new();

        if now.saturating_duration_since(self.last_heartbeat) >= self.heartbeat_interval {
            events.push(AnalyticsEvent::Heartbeat { timestamp });
            self.last_heartbeat = now;
        }

        if rng.gen::<f64>() < 0.05 && !self.analytics_enabled {
            events.push(AnalyticsEvent::AnalyticsEnabled {
                timestamp,
                analytics_type: ANALYTICS_TYPE.to_string(),
            });
            self.analytics_enabled = true;
        }

        if self.analytics_enabled && rng.gen::<f64>() < self.alert_probability {
            if rng.gen::<f64>() < 0.7 {
                events.push(self.detailed_alert(timestamp, rng));
            } else {
                events.push(self.basic_alert(timestamp));
            }
        }

        if rng.gen::<f64>() < 0.02 && self.analytics_enabled {
            events.push(AnalyticsEvent::AnalyticsDisabled {
                timestamp,
                analytics_type: ANALYTICS_TYPE.to_string(),
            });
            self.analytics_enabled = false;
        }

        events
    }

    fn next_event_id(&mut self) -> u64 {
        self.event_id_counter += 1;
        self.event_id_counter
    }

    pub fn basic_alert(&mut self, timestamp: i64) -> AnalyticsEvent {
        AnalyticsEvent::Alert {
            timestamp,
            message: "leak".to_string(),
            event_id: self.next_event_id(),
        }
    }

    pub fn detailed_alert<R: Rng>(&mut self, timestamp: i64, rng: &mut R) -> AnalyticsEvent {
        let event_id = self.next_event_id();
        let point = |rng: &mut R| GeoPoint {
            longitude: rng.gen_range(-180.0..=180.0),
            latitude: rng.gen_range(-90.0..=90.0),
        };
        let leak_location = point(rng);
        let camera_location = point(rng);
        AnalyticsEvent::AlertDlqc(DetailedAlert {
            timestamp,
            message: "leak".to_string(),
            event_id,
            camera_id: rng.gen_range(1..=5),
            leak_location,
            camera_location,
            flow_rate: rng.gen_range(0.1..=2.0),
            unit: "g/s".to_string(),
            mass: rng.gen_range(1.0..=10.0),
            mass_unit: "kg".to_string(),
            confidence_level: rng.gen_range(20..=95),
            camera_orientation: rng.gen_range(0..=360),
            depression_angle: rng.gen_range(30..=90),
            wind_speed: rng.gen_range(0.0..=50.0),
            wind_speed_unit: "m/h".to_string(),
            wind_direction: rng.gen_range(0..=360),
            temperature: rng.gen_range(-10.0..=45.0),
            temperature_unit: "F".to_string(),
            humidity: rng.gen_range(0..=100),
        })
    }
}
