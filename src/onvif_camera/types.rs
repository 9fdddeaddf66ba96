//! ONVIF camera simulator type definitions

use crate::config::{env_opt, env_parse, env_string};
use serde::Serialize;

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct OnvifCameraConfig {
    pub device_id: String,
    pub host: String,
    pub port: u16,
    /// WS-Security 認証（両方設定時のみ有効）
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for OnvifCameraConfig {
    fn default() -> Self {
        Self {
            device_id: env_string("ONVIF_DEVICE_ID", "onvif-camera-001"),
            host: env_string("ONVIF_HOST", "0.0.0.0"),
            port: env_parse("ONVIF_PORT", 8080),
            username: env_opt("ONVIF_USERNAME"),
            password: env_opt("ONVIF_PASSWORD"),
        }
    }
}

impl OnvifCameraConfig {
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
            _ => None,
        }
    }
}

/// GetDeviceInformation の内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub manufacturer: String,
    pub model: String,
    pub firmware_version: String,
    pub serial_number: String,
    pub hardware_id: String,
}

impl DeviceIdentity {
    pub fn simulated(device_id: &str) -> Self {
        let serial: String = uuid::Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(8)
            .collect();
        Self {
            manufacturer: "Edge AI Simulator".to_string(),
            model: "ONVIF-PTZ-4K".to_string(),
            firmware_version: "1.0.0".to_string(),
            serial_number: serial.to_uppercase(),
            hardware_id: device_id.to_string(),
        }
    }
}

/// PTZ axis range
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    pub fn clamp(&self, v: f64) -> f64 {
        if v.is_nan() {
            return self.min;
        }
        v.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PtzLimits {
    pub pan: AxisRange,
    pub tilt: AxisRange,
    pub zoom: AxisRange,
}

impl Default for PtzLimits {
    fn default() -> Self {
        Self {
            pan: AxisRange { min: -180.0, max: 180.0 },
            tilt: AxisRange { min: -90.0, max: 90.0 },
            zoom: AxisRange { min: 1.0, max: 10.0 },
        }
    }
}

/// PTZ position (pan/tilt in degrees, zoom factor)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PtzPosition {
    pub pan: f64,
    pub tilt: f64,
    pub zoom: f64,
}

impl Default for PtzPosition {
    fn default() -> Self {
        Self {
            pan: 0.0,
            tilt: 0.0,
            zoom: 1.0,
        }
    }
}

impl PtzPosition {
    pub fn clamped(self, limits: &PtzLimits) -> Self {
        Self {
            pan: limits.pan.clamp(self.pan),
            tilt: limits.tilt.clamp(self.tilt),
            zoom: limits.zoom.clamp(self.zoom),
        }
    }
}

/// Imaging settings (0-100)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImagingSettings {
    pub brightness: f64,
    pub contrast: f64,
    pub saturation: f64,
    pub sharpness: f64,
}

impl Default for ImagingSettings {
    fn default() -> Self {
        Self {
            brightness: 50.0,
            contrast: 50.0,
            saturation: 50.0,
            sharpness: 50.0,
        }
    }
}

/// Media profile (Profile S / Profile T)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaProfile {
    pub token: &'static str,
    pub name: &'static str,
    pub encoding: &'static str,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// kbps
    pub bitrate: u32,
    pub uri: String,
}

pub const DEFAULT_PROFILE_TOKEN: &str = "profile_s_h264";

/// The three profiles every simulated camera exposes
pub fn default_profiles(device_id: &str) -> Vec<MediaProfile> {
    vec![
        MediaProfile {
            token: "profile_s_h264",
            name: "Profile S - H.264 Main Stream",
            encoding: "H264",
            width: 1920,
            height: 1080,
            framerate: 30,
            bitrate: 4000,
            uri: format!("rtsp://{}.local:554/stream1", device_id),
        },
        MediaProfile {
            token: "profile_s_jpeg",
            name: "Profile S - JPEG Snapshots",
            encoding: "JPEG",
            width: 1920,
            height: 1080,
            framerate: 5,
            bitrate: 2000,
            uri: format!("http://{}.local:8080/snapshot", device_id),
        },
        MediaProfile {
            token: "profile_t_h265",
            name: "Profile T - H.265 4K Stream",
            encoding: "H265",
            width: 3840,
            height: 2160,
            framerate: 30,
            bitrate: 8000,
            uri: format!("rtsp://{}.local:554/stream2", device_id),
        },
    ]
}

/// SOAP operations the simulator understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnvifOperation {
    GetDeviceInformation,
    GetCapabilities,
    GetSystemDateAndTime,
    GetProfiles,
    GetStreamUri,
    AbsoluteMove,
    RelativeMove,
    ContinuousMove,
    Stop,
    GetStatus,
    GetImagingSettings,
    SetImagingSettings,
    PullMessages,
}

impl OnvifOperation {
    /// Match on the Body child's local name (substring match, first hit wins)
    pub fn from_tag(tag: &str) -> Option<Self> {
        const TABLE: &[(&str, OnvifOperation)] = &[
            ("GetDeviceInformation", OnvifOperation::GetDeviceInformation),
            ("GetCapabilities", OnvifOperation::GetCapabilities),
            ("GetSystemDateAndTime", OnvifOperation::GetSystemDateAndTime),
            ("GetProfiles", OnvifOperation::GetProfiles),
            ("GetStreamUri", OnvifOperation::GetStreamUri),
            ("AbsoluteMove", OnvifOperation::AbsoluteMove),
            ("RelativeMove", OnvifOperation::RelativeMove),
            ("ContinuousMove", OnvifOperation::ContinuousMove),
            ("Stop", OnvifOperation::Stop),
            ("GetStatus", OnvifOperation::GetStatus),
            ("GetImagingSettings", OnvifOperation::GetImagingSettings),
            ("SetImagingSettings", OnvifOperation::SetImagingSettings),
            ("PullMessages", OnvifOperation::PullMessages),
            ("GetEventProperties", OnvifOperation::PullMessages),
        ];
        TABLE
            .iter()
            .find(|(name, _)| tag.contains(name))
            .map(|(_, op)| *op)
    }

    /// Operations a client may call before authenticating (clock sync)
    pub fn is_public(&self) -> bool {
        matches!(self, Self::GetSystemDateAndTime)
    }
}

/// SOAP response produced by the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoapReply {
    /// HTTP status code
    pub status: u16,
    pub body: String,
}

impl SoapReply {
    pub fn ok(body: String) -> Self {
        Self { status: 200, body }
    }

    pub fn fault(status: u16, reason: &str) -> Self {
        Self {
            status,
            body: crate::soap::fault(reason),
        }
    }

    pub fn is_fault(&self) -> bool {
        self.status >= 400
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_from_tag() {
        assert_eq!(
            OnvifOperation::from_tag("GetDeviceInformation"),
            Some(OnvifOperation::GetDeviceInformation)
        );
        assert_eq!(
            OnvifOperation::from_tag("GetEventProperties"),
            Some(OnvifOperation::PullMessages)
        );
        assert_eq!(OnvifOperation::from_tag("GetStreamUri"), Some(OnvifOperation::GetStreamUri));
        assert_eq!(OnvifOperation::from_tag("Reboot"), None);
    }

    #[test]
    fn test_position_clamp() {
        let limits = PtzLimits::default();
        let pos = PtzPosition {
            pan: 500.0,
            tilt: -120.0,
            zoom: 0.2,
        }
        .clamped(&limits);
        assert_eq!(pos, PtzPosition { pan: 180.0, tilt: -90.0, zoom: 1.0 });
    }

    #[test]
    fn test_identity_serial() {
        let id = DeviceIdentity::simulated("cam-x");
        assert_eq!(id.serial_number.len(), 8);
        assert_eq!(id.serial_number, id.serial_number.to_uppercase());
        assert_eq!(id.hardware_id, "cam-x");
    }

    #[test]
    fn test_profiles() {
        let profiles = default_profiles("cam-1");
        assert_eq!(profiles.len(), 3);
        assert_eq!(profiles[0].token, DEFAULT_PROFILE_TOKEN);
        assert_eq!(profiles[1].uri, "http://cam-1.local:8080/snapshot");
        assert_eq!(profiles[2].width, 3840);
    }
}
