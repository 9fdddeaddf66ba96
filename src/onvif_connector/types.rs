//! ONVIF connector type definitions

use crate::config::{env_opt, env_parse, env_string};
use crate::mqtt::MqttSettings;
use serde::{Deserialize, Serialize};

/// Connector configuration
#[derive(Debug, Clone)]
pub struct OnvifConnectorConfig {
    pub onvif_host: String,
    pub onvif_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub mqtt: MqttSettings,
    pub topic_prefix: String,
    /// PullMessages interval (seconds)
    pub event_poll_interval: u64,
}

impl Default for OnvifConnectorConfig {
    fn default() -> Self {
        Self {
            onvif_host: env_string("ONVIF_HOST", "onvif-camera-simulator"),
            onvif_port: env_parse("ONVIF_PORT", 8080),
            username: env_opt("ONVIF_USERNAME"),
            password: env_opt("ONVIF_PASSWORD"),
            mqtt: MqttSettings::from_env(
                "MQTT_BROKER",
                "MQTT_PORT",
                "MQTT_CLIENT_ID",
                "mosquitto-broker",
                "onvif-connector-client",
            ),
            topic_prefix: env_string("MQTT_TOPIC_PREFIX", "onvif-camera"),
            event_poll_interval: env_parse("EVENT_POLL_INTERVAL", 5),
        }
    }
}

impl OnvifConnectorConfig {
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.onvif_host, self.onvif_port)
    }

    pub fn event_topic(&self, kind: EventKind) -> String {
        format!("{}/events/{}", self.topic_prefix, kind.topic_suffix())
    }

    pub fn ptz_subscription(&self) -> String {
        format!("{}/ptz/command/#", self.topic_prefix)
    }

    pub fn device_info_topic(&self) -> String {
        format!("{}/device/info", self.topic_prefix)
    }

    pub fn status_topic(&self) -> String {
        format!("{}/status", self.topic_prefix)
    }
}

/// GetDeviceInformation 結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub firmware: Option<String>,
    pub serial: Option<String>,
}

/// GetCapabilities 結果（サービスごとの XAddr）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub media: Option<String>,
    pub ptz: Option<String>,
    pub events: Option<String>,
    pub imaging: Option<String>,
}

impl Capabilities {
    pub fn supports_ptz(&self) -> bool {
        self.ptz.is_some()
    }

    pub fn supports_events(&self) -> bool {
        self.events.is_some()
    }
}

/// Media profile summary (token + name)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileSummary {
    pub token: String,
    pub name: String,
}

/// Everything learned during discovery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub info: DeviceInfo,
    pub capabilities: Capabilities,
    pub profiles: Vec<ProfileSummary>,
}

impl DiscoveredDevice {
    /// Serial number or "unknown"
    pub fn device_id(&self) -> String {
        self.info.serial.clone().unwrap_or_else(|| "unknown".to_string())
    }
}

/// カメライベント種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Motion,
    Tampering,
}

impl EventKind {
    /// Classify an ONVIF topic expression
    pub fn from_topic(topic: &str) -> Option<Self> {
        if topic.contains("Motion") {
            Some(Self::Motion)
        } else if topic.contains("Tamper") {
            Some(Self::Tampering)
        } else {
            None
        }
    }

    /// SimpleItem that flags the event as active
    pub fn flag_item(&self) -> &'static str {
        match self {
            Self::Motion => "IsMotion",
            Self::Tampering => "IsTamper",
        }
    }

    pub fn topic_suffix(&self) -> &'static str {
        match self {
            Self::Motion => "motion",
            Self::Tampering => "tampering",
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Motion => "motion_detected",
            Self::Tampering => "tampering_detected",
        }
    }
}

/// Parsed NotificationMessage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraNotification {
    pub topic: String,
    pub kind: Option<EventKind>,
    pub utc_time: Option<String>,
    pub active: bool,
}

/// MQTT event payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraEventMessage {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: String,
    pub device_id: String,
}

/// PTZ command received over MQTT
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PtzCommand {
    #[serde(default)]
    pub pan: f64,
    #[serde(default)]
    pub tilt: f64,
    #[serde(default)]
    pub zoom: f64,
}

impl PtzCommand {
    /// Parse `{prefix}/ptz/command/{axis}` payloads.
    ///
    /// A bare number moves the axis named by the topic (`tilt`, `zoom`, anything
    /// else pans); a JSON object sets all three axes.
    /// Non-finite values (`nan`, `inf`) are rejected.
    pub fn parse(topic: &str, payload: &str) -> Option<Self> {
        let payload = payload.trim();
        let cmd = match payload.parse::<f64>() {
            Ok(value) => {
                let axis = topic.rsplit('/').next().unwrap_or_default();
                let mut cmd = Self::default();
                match axis {
                    "tilt" => cmd.tilt = value,
                    "zoom" => cmd.zoom = value,
                    _ => cmd.pan = value,
                }
                cmd
            }
            Err(_) => serde_json::from_str(payload).ok()?,
        };
        cmd.is_finite().then_some(cmd)
    }

    pub fn is_finite(&self) -> bool {
        self.pan.is_finite() && self.tilt.is_finite() && self.zoom.is_finite()
    }
}

/// 統計情報
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectorStats {
    pub events_received: u64,
    pub events_published: u64,
    pub ptz_commands: u64,
    pub connection_attempts: u64,
    pub last_event_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_from_topic() {
        assert_eq!(
            EventKind::from_topic("tns1:RuleEngine/CellMotionDetector/Motion"),
            Some(EventKind::Motion)
        );
        assert_eq!(
            EventKind::from_topic("tns1:RuleEngine/TamperDetector/Tamper"),
            Some(EventKind::Tampering)
        );
        assert_eq!(EventKind::from_topic("tns1:Device/Trigger/Relay"), None);
    }

    #[test]
    fn test_ptz_command_parse() {
        assert_eq!(
            PtzCommand::parse("onvif-camera/ptz/command/pan", "0.5"),
            Some(PtzCommand { pan: 0.5, tilt: 0.0, zoom: 0.0 })
        );
        assert_eq!(
            PtzCommand::parse("onvif-camera/ptz/command/tilt", " -10 "),
            Some(PtzCommand { pan: 0.0, tilt: -10.0, zoom: 0.0 })
        );
        assert_eq!(
            PtzCommand::parse("onvif-camera/ptz/command/move", r#"{"pan": 1.0, "zoom": 2}"#),
            Some(PtzCommand { pan: 1.0, tilt: 0.0, zoom: 2.0 })
        );
        assert_eq!(PtzCommand::parse("onvif-camera/ptz/command/pan", "left"), None);
    }

    #[test]
    fn test_ptz_command_rejects_non_finite() {
        assert_eq!(PtzCommand::parse("onvif-camera/ptz/command/pan", "nan"), None);
        assert_eq!(PtzCommand::parse("onvif-camera/ptz/command/zoom", "inf"), None);
        assert_eq!(PtzCommand::parse("onvif-camera/ptz/command/tilt", "-infinity"), None);
    }

    #[test]
    fn test_event_message_serialization() {
        let msg = CameraEventMessage {
            event_type: EventKind::Motion.event_type().to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            device_id: "unknown".to_string(),
        };
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "motion_detected");
    }

    #[test]
    fn test_topics() {
        let mut config = OnvifConnectorConfig::default();
        config.topic_prefix = "cam".to_string();
        assert_eq!(config.event_topic(EventKind::Tampering), "cam/events/tampering");
        assert_eq!(config.ptz_subscription(), "cam/ptz/command/#");
        assert_eq!(config.status_topic(), "cam/status");
    }
}
