//! Simulated ONVIF device: state + SOAP dispatch

use super::templates;
use super::types::{
    DeviceIdentity, ImagingSettings, MediaProfile, OnvifCameraConfig, OnvifOperation, PtzLimits,
    PtzPosition, SoapReply, DEFAULT_PROFILE_TOKEN,
};
use crate::soap::{body_operation, extract_element, extract_xml_attribute, extract_xml_value, UsernameToken};
use rand::Rng;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// イベント再抽選の間隔
pub const EVENT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Mutable device state
#[derive(Debug, Clone)]
pub struct CameraState {
    pub position: PtzPosition,
    pub imaging: ImagingSettings,
    pub motion_detected: bool,
    pub tampering_detected: bool,
    pub last_event_at: Instant,
}

impl CameraState {
    fn new() -> Self {
        Self {
            position: PtzPosition::default(),
            imaging: ImagingSettings::default(),
            motion_detected: false,
            tampering_detected: false,
            last_event_at: Instant::now(),
        }
    }

    /// Re-roll motion (1/2) and tamper (1/4) once the refresh interval has passed
    pub fn refresh_events<R: Rng>(&mut self, now: Instant, rng: &mut R) -> bool {
        if now.saturating_duration_since(self.last_event_at) < EVENT_REFRESH_INTERVAL {
            return false;
        }
        self.motion_detected = rng.gen_bool(0.5);
        self.tampering_detected = rng.gen_bool(0.25);
        self.last_event_at = now;
        true
    }
}

/// ONVIF カメラシミュレータ
pub struct OnvifCamera {
    config: OnvifCameraConfig,
    identity: DeviceIdentity,
    profiles: Vec<MediaProfile>,
    limits: PtzLimits,
    state: Mutex<CameraState>,
}

impl OnvifCamera {
    pub fn new(config: OnvifCameraConfig) -> Self {
        let identity = DeviceIdentity::simulated(&config.device_id);
        let profiles = super::types::default_profiles(&config.device_id);

        tracing::info!(
            device_id = %config.device_id,
            manufacturer = %identity.manufacturer,
            model = %identity.model,
            serial = %identity.serial_number,
            firmware = %identity.firmware_version,
            auth = config.credentials().is_some(),
            "ONVIF camera simulator initialized"
        );

        Self {
            config,
            identity,
            profiles,
            limits: PtzLimits::default(),
            state: Mutex::new(CameraState::new()),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.config.device_id
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn profiles(&self) -> &[MediaProfile] {
        &self.profiles
    }

    pub async fn snapshot_state(&self) -> CameraState {
        self.state.lock().await.clone()
    }

    fn base_url(&self) -> String {
        format!("http://{}:{}", self.config.host, self.config.port)
    }

    /// SOAPリクエストを処理
    pub async fn handle_request(&self, xml: &str) -> SoapReply {
        let Some(tag) = body_operation(xml) else {
            return SoapReply::fault(500, "No SOAP Body found");
        };
        let Some(op) = OnvifOperation::from_tag(&tag) else {
            tracing::warn!(operation = %tag, "Unknown ONVIF method");
            return SoapReply::fault(500, "Unknown ONVIF method");
        };

        if let Some((user, pass)) = self.config.credentials() {
            if !op.is_public() {
                let authorized = UsernameToken::parse(xml)
                    .map(|token| token.verify(user, pass))
                    .unwrap_or(false);
                if !authorized {
                    tracing::warn!(operation = %tag, "Rejected unauthenticated ONVIF request");
                    return SoapReply::fault(400, "Not Authorized");
                }
            }
        }

        tracing::debug!(operation = %tag, "Handling ONVIF request");
        let body = extract_element(xml, "Body").unwrap_or_default();
        self.dispatch(op, body).await
    }

    async fn dispatch(&self, op: OnvifOperation, body: &str) -> SoapReply {
        let now = chrono::Utc::now();
        match op {
            OnvifOperation::GetDeviceInformation => {
                SoapReply::ok(templates::device_information(&self.identity))
            }
            OnvifOperation::GetCapabilities => SoapReply::ok(templates::capabilities(&self.base_url())),
            OnvifOperation::GetSystemDateAndTime => SoapReply::ok(templates::system_date_and_time(now)),
            OnvifOperation::GetProfiles => SoapReply::ok(templates::profiles(&self.profiles)),
            OnvifOperation::GetStreamUri => {
                let token = extract_xml_value(body, "ProfileToken")
                    .unwrap_or_else(|| DEFAULT_PROFILE_TOKEN.to_string());
                let profile = self
                    .profiles
                    .iter()
                    .find(|p| p.token == token)
                    .or_else(|| self.profiles.iter().find(|p| p.token == DEFAULT_PROFILE_TOKEN));
                match profile {
                    Some(profile) => SoapReply::ok(templates::stream_uri(profile)),
                    None => SoapReply::fault(500, "No media profiles configured"),
                }
            }
            OnvifOperation::AbsoluteMove | OnvifOperation::RelativeMove | OnvifOperation::ContinuousMove => {
                match self.apply_move(op, body).await {
                    Ok(position) => {
                        tracing::info!(
                            pan = position.pan,
                            tilt = position.tilt,
                            zoom = position.zoom,
                            "PTZ command executed"
                        );
                        SoapReply::ok(templates::move_response())
                    }
                    Err(reason) => SoapReply::fault(500, &reason),
                }
            }
            OnvifOperation::Stop => SoapReply::ok(templates::move_response()),
            OnvifOperation::GetStatus => {
                let position = self.state.lock().await.position;
                SoapReply::ok(templates::ptz_status(&position, now))
            }
            OnvifOperation::GetImagingSettings => {
                let imaging = self.state.lock().await.imaging;
                SoapReply::ok(templates::imaging_settings(&imaging))
            }
            OnvifOperation::SetImagingSettings => match self.apply_imaging(body).await {
                Ok(()) => SoapReply::ok(templates::set_imaging_settings()),
                Err(reason) => SoapReply::fault(500, &reason),
            },
            OnvifOperation::PullMessages => {
                let mut state = self.state.lock().await;
                if state.refresh_events(Instant::now(), &mut rand::thread_rng()) {
                    tracing::debug!(
                        motion = state.motion_detected,
                        tamper = state.tampering_detected,
                        "Event state refreshed"
                    );
                }
                SoapReply::ok(templates::pull_messages(
                    state.motion_detected,
                    state.tampering_detected,
                    now,
                ))
            }
        }
    }

    /// Absolute: set from Position. Relative: add Translation (or Velocity).
    /// Continuous: treat Velocity as one step. Result always clamped.
    async fn apply_move(&self, op: OnvifOperation, body: &str) -> Result<PtzPosition, String> {
        let vector = match op {
            OnvifOperation::AbsoluteMove => extract_element(body, "Position"),
            _ => extract_element(body, "Translation").or_else(|| extract_element(body, "Velocity")),
        }
        .or_else(|| extract_element(body, "Position"))
        .unwrap_or_default();

        let pan = attr_f64(vector, "PanTilt", "x")?;
        let tilt = attr_f64(vector, "PanTilt", "y")?;
        let zoom = attr_f64(vector, "Zoom", "x")?;

        let mut state = self.state.lock().await;
        let mut next = state.position;
        if op == OnvifOperation::AbsoluteMove {
            next.pan = pan.unwrap_or(next.pan);
            next.tilt = tilt.unwrap_or(next.tilt);
            next.zoom = zoom.unwrap_or(next.zoom);
        } else {
            next.pan += pan.unwrap_or(0.0);
            next.tilt += tilt.unwrap_or(0.0);
            next.zoom += zoom.unwrap_or(0.0);
        }
        state.position = next.clamped(&self.limits);
        Ok(state.position)
    }

    async fn apply_imaging(&self, body: &str) -> Result<(), String> {
        let Some(settings) = extract_element(body, "ImagingSettings") else {
            return Ok(());
        };
        let mut state = self.state.lock().await;
        let mut next = state.imaging;
        for (key, slot) in [
            ("Brightness", &mut next.brightness),
            ("Contrast", &mut next.contrast),
            ("Saturation", &mut next.saturation),
            ("Sharpness", &mut next.sharpness),
        ] {
            if let Some(raw) = extract_xml_value(settings, key) {
                let value: f64 = raw
                    .parse()
                    .map_err(|_| format!("Invalid {} value: {}", key, raw))?;
                *slot = value.clamp(0.0, 100.0);
            }
        }
        state.imaging = next;
        tracing::info!(
            brightness = next.brightness,
            contrast = next.contrast,
            saturation = next.saturation,
            sharpness = next.sharpness,
            "Imaging settings updated"
        );
        Ok(())
    }
}

fn attr_f64(xml: &str, tag: &str, attr: &str) -> Result<Option<f64>, String> {
    match extract_xml_attribute(xml, tag, attr) {
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("Invalid {} {} value: {}", tag, attr, raw)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::{envelope, extract_all_elements};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn camera() -> OnvifCamera {
        OnvifCamera::new(OnvifCameraConfig {
            device_id: "cam-test".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            username: None,
            password: None,
        })
    }

    #[tokio::test]
    async fn test_device_information() {
        let cam = camera();
        let reply = cam
            .handle_request(&envelope("<tds:GetDeviceInformation/>", None))
            .await;
        assert_eq!(reply.status, 200);
        assert_eq!(
            extract_xml_value(&reply.body, "Manufacturer").as_deref(),
            Some("Edge AI Simulator")
        );
        assert_eq!(
            extract_xml_value(&reply.body, "SerialNumber").as_deref(),
            Some(cam.identity().serial_number.as_str())
        );
        assert_eq!(extract_xml_value(&reply.body, "HardwareId").as_deref(), Some("cam-test"));
    }

    #[tokio::test]
    async fn test_missing_body_and_unknown_method() {
        let cam = camera();
        let reply = cam.handle_request("<soap:Envelope></soap:Envelope>").await;
        assert_eq!(reply.status, 500);
        assert!(reply.body.contains("No SOAP Body found"));

        let reply = cam.handle_request(&envelope("<tds:SystemReboot/>", None)).await;
        assert_eq!(reply.status, 500);
        assert!(reply.body.contains("Unknown ONVIF method"));
    }

    #[tokio::test]
    async fn test_stream_uri_default_and_unknown() {
        let cam = camera();
        let reply = cam.handle_request(&envelope("<trt:GetStreamUri/>", None)).await;
        assert_eq!(
            extract_xml_value(&reply.body, "Uri").as_deref(),
            Some("rtsp://cam-test.local:554/stream1")
        );
        assert_eq!(extract_xml_value(&reply.body, "Timeout").as_deref(), Some("PT60S"));

        let reply = cam
            .handle_request(&envelope(
                "<trt:GetStreamUri><trt:ProfileToken>profile_t_h265</trt:ProfileToken></trt:GetStreamUri>",
                None,
            ))
            .await;
        assert_eq!(
            extract_xml_value(&reply.body, "Uri").as_deref(),
            Some("rtsp://cam-test.local:554/stream2")
        );

        let reply = cam
            .handle_request(&envelope(
                "<trt:GetStreamUri><trt:ProfileToken>nope</trt:ProfileToken></trt:GetStreamUri>",
                None,
            ))
            .await;
        assert_eq!(reply.status, 200);
        assert_eq!(
            extract_xml_value(&reply.body, "Uri").as_deref(),
            Some("rtsp://cam-test.local:554/stream1")
        );
    }

    #[tokio::test]
    async fn test_profiles_listing() {
        let cam = camera();
        let reply = cam.handle_request(&envelope("<trt:GetProfiles/>", None)).await;
        assert_eq!(extract_all_elements(&reply.body, "Profiles").len(), 3);
    }

    #[tokio::test]
    async fn test_absolute_and_relative_move_clamped() {
        let cam = camera();
        let abs = r#"<tptz:AbsoluteMove><tptz:ProfileToken>profile_s_h264</tptz:ProfileToken>
            <tptz:Position><tt:PanTilt x="90" y="45"/><tt:Zoom x="4"/></tptz:Position></tptz:AbsoluteMove>"#;
        let reply = cam.handle_request(&envelope(abs, None)).await;
        assert_eq!(reply.status, 200);
        assert_eq!(body_operation(&reply.body).as_deref(), Some("MoveResponse"));
        assert_eq!(
            cam.snapshot_state().await.position,
            PtzPosition { pan: 90.0, tilt: 45.0, zoom: 4.0 }
        );

        let rel = r#"<tptz:RelativeMove><tptz:Translation><tt:PanTilt x="120" y="0.0"/></tptz:Translation></tptz:RelativeMove>"#;
        let reply = cam.handle_request(&envelope(rel, None)).await;
        assert_eq!(body_operation(&reply.body).as_deref(), Some("MoveResponse"));
        let pos = cam.snapshot_state().await.position;
        assert_eq!(pos.pan, 180.0);
        assert_eq!(pos.tilt, 45.0);
        assert_eq!(pos.zoom, 4.0);
    }

    #[tokio::test]
    async fn test_continuous_and_stop_answer_move_response() {
        let cam = camera();
        let cont = r#"<tptz:ContinuousMove><tptz:Velocity><tt:PanTilt x="5" y="-5"/></tptz:Velocity></tptz:ContinuousMove>"#;
        let reply = cam.handle_request(&envelope(cont, None)).await;
        assert_eq!(body_operation(&reply.body).as_deref(), Some("MoveResponse"));

        let reply = cam.handle_request(&envelope("<tptz:Stop/>", None)).await;
        assert_eq!(reply.status, 200);
        assert_eq!(body_operation(&reply.body).as_deref(), Some("MoveResponse"));
        assert_eq!(cam.snapshot_state().await.position.pan, 5.0);
    }

    #[tokio::test]
    async fn test_move_with_bad_number_faults() {
        let cam = camera();
        let rel = r#"<tptz:RelativeMove><tptz:Translation><tt:PanTilt x="left" y="0"/></tptz:Translation></tptz:RelativeMove>"#;
        let reply = cam.handle_request(&envelope(rel, None)).await;
        assert!(reply.is_fault());
        assert_eq!(cam.snapshot_state().await.position, PtzPosition::default());
    }

    #[tokio::test]
    async fn test_imaging_roundtrip() {
        let cam = camera();
        let set = r#"<timg:SetImagingSettings><timg:ImagingSettings>
            <tt:Brightness>75</tt:Brightness><tt:Sharpness>150</tt:Sharpness>
            </timg:ImagingSettings></timg:SetImagingSettings>"#;
        let reply = cam.handle_request(&envelope(set, None)).await;
        assert_eq!(reply.status, 200);

        let reply = cam.handle_request(&envelope("<timg:GetImagingSettings/>", None)).await;
        assert_eq!(extract_xml_value(&reply.body, "Brightness").as_deref(), Some("75.0"));
        assert_eq!(extract_xml_value(&reply.body, "Contrast").as_deref(), Some("50.0"));
        assert_eq!(extract_xml_value(&reply.body, "Sharpness").as_deref(), Some("100.0"));
    }

    #[test]
    fn test_event_refresh_interval() {
        let mut state = CameraState::new();
        let mut rng = StdRng::seed_from_u64(7);
        let start = state.last_event_at;
        assert!(!state.refresh_events(start + Duration::from_secs(5), &mut rng));
        assert!(state.refresh_events(start + Duration::from_secs(11), &mut rng));
        assert_eq!(state.last_event_at, start + Duration::from_secs(11));
    }

    #[tokio::test]
    async fn test_pull_messages_reflects_state() {
        let cam = camera();
        {
            let mut state = cam.state.lock().await;
            state.motion_detected = true;
            state.tampering_detected = false;
            state.last_event_at = Instant::now();
        }
        let reply = cam.handle_request(&envelope("<tev:PullMessages/>", None)).await;
        let notes = extract_all_elements(&reply.body, "NotificationMessage");
        assert_eq!(notes.len(), 1);
        assert!(notes[0].contains(templates::MOTION_TOPIC));
    }

    #[tokio::test]
    async fn test_ws_security_enforced() {
        let cam = OnvifCamera::new(OnvifCameraConfig {
            device_id: "cam-auth".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            username: Some("admin".to_string()),
            password: Some("secret".to_string()),
        });

        let reply = cam.handle_request(&envelope("<tds:GetDeviceInformation/>", None)).await;
        assert_eq!(reply.status, 400);
        assert!(reply.body.contains("Not Authorized"));

        let token = UsernameToken::generate("admin", "secret");
        let reply = cam
            .handle_request(&envelope("<tds:GetDeviceInformation/>", Some(&token.header_xml())))
            .await;
        assert_eq!(reply.status, 200);

        // 時刻同期は認証不要
        let reply = cam.handle_request(&envelope("<tds:GetSystemDateAndTime/>", None)).await;
        assert_eq!(reply.status, 200);
    }
}
