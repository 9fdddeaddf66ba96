//! ONVIF SOAP client
//!
//! Posts SOAP envelopes to the camera's service endpoints and parses the
//! responses with the namespace-agnostic scanners in `crate::soap`.

use super::types::{
    CameraNotification, Capabilities, DeviceInfo, DiscoveredDevice, EventKind, ProfileSummary, PtzCommand,
};
use crate::error::{Error, Result};
use crate::soap::{
    body_operation, elements, envelope, extract_all_elements, extract_attribute_where, extract_capability_xaddr,
    extract_xml_attribute, extract_xml_value, UsernameToken, SOAP_CONTENT_TYPE,
};
use reqwest::Client;
use std::time::Duration;

/// ONVIF クライアント
pub struct OnvifClient {
    /// `http://host:port`
    base_url: String,
    credentials: Option<(String, String)>,
    client: Client,
}

impl OnvifClient {
    pub fn new(base_url: &str, credentials: Option<(String, String)>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
        }
    }

    fn service_url(&self, service: &str) -> String {
        format!("{}/onvif/{}", self.base_url, service)
    }

    fn security_header(&self) -> Option<String> {
        self.credentials
            .as_ref()
            .map(|(user, pass)| UsernameToken::generate(user, pass).header_xml())
    }

    /// SOAPリクエスト送信
    async fn call(&self, service: &str, action: &str, body: &str) -> Result<String> {
        let url = self.service_url(service);
        let header = self.security_header();
        let request = envelope(body, header.as_deref());

        tracing::debug!(url = %url, action = %action, "Sending ONVIF request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", SOAP_CONTENT_TYPE)
            .body(request)
            .send()
            .await
            .map_err(|e| Error::Network(format!("{} request failed: {}", action, e)))?;

        let status = response.status();
        let text = response.text().await?;

        if body_operation(&text).as_deref() == Some("Fault") {
            let reason = extract_xml_value(&text, "Text").unwrap_or_else(|| "unknown fault".to_string());
            tracing::warn!(action = %action, status = %status, reason = %reason, "ONVIF fault");
            return Err(Error::Soap(format!("{} fault: {}", action, reason)));
        }
        if !status.is_success() {
            return Err(Error::Network(format!(
                "ONVIF {} failed with status {}",
                action, status
            )));
        }
        Ok(text)
    }

    pub async fn get_device_information(&self) -> Result<DeviceInfo> {
        let xml = self
            .call("device_service", "GetDeviceInformation", "<tds:GetDeviceInformation/>")
            .await?;
        Ok(parse_device_information(&xml))
    }

    pub async fn get_capabilities(&self) -> Result<Capabilities> {
        let xml = self
            .call(
                "device_service",
                "GetCapabilities",
                "<tds:GetCapabilities><tds:Category>All</tds:Category></tds:GetCapabilities>",
            )
            .await?;
        Ok(parse_capabilities(&xml))
    }

    pub async fn get_profiles(&self) -> Result<Vec<ProfileSummary>> {
        let xml = self.call("media_service", "GetProfiles", "<trt:GetProfiles/>").await?;
        Ok(parse_profiles(&xml))
    }

    pub async fn get_stream_uri(&self, profile_token: &str) -> Result<String> {
        let body = format!(
            r#"<trt:GetStreamUri>
            <trt:StreamSetup>
                <tt:Stream>RTP-Unicast</tt:Stream>
                <tt:Transport><tt:Protocol>RTSP</tt:Protocol></tt:Transport>
            </trt:StreamSetup>
            <trt:ProfileToken>{}</trt:ProfileToken>
        </trt:GetStreamUri>"#,
            crate::soap::escape(profile_token)
        );
        let xml = self.call("media_service", "GetStreamUri", &body).await?;
        extract_xml_value(&xml, "Uri").ok_or_else(|| Error::Parse("GetStreamUri response has no Uri".to_string()))
    }

    pub async fn pull_messages(&self) -> Result<Vec<CameraNotification>> {
        let xml = self
            .call(
                "event_service",
                "PullMessages",
                "<tev:PullMessages><tev:Timeout>PT10S</tev:Timeout><tev:MessageLimit>10</tev:MessageLimit></tev:PullMessages>",
            )
            .await?;
        Ok(parse_notifications(&xml))
    }

    pub async fn relative_move(&self, profile_token: &str, cmd: &PtzCommand) -> Result<()> {
        let body = format!(
            r#"<tptz:RelativeMove>
            <tptz:ProfileToken>{}</tptz:ProfileToken>
            <tptz:Translation>
                <tt:PanTilt x="{}" y="{}"/>
                <tt:Zoom x="{}"/>
            </tptz:Translation>
        </tptz:RelativeMove>"#,
            crate::soap::escape(profile_token),
            cmd.pan,
            cmd.tilt,
            cmd.zoom
        );
        self.call("ptz_service", "RelativeMove", &body).await?;
        tracing::info!(pan = cmd.pan, tilt = cmd.tilt, zoom = cmd.zoom, "ONVIF PTZ command executed");
        Ok(())
    }

    /// Device information -> capabilities -> profiles, in that order
    pub async fn discover(&self) -> Result<DiscoveredDevice> {
        let info = self.get_device_information().await?;
        tracing::info!(
            manufacturer = ?info.manufacturer,
            model = ?info.model,
            firmware = ?info.firmware,
            serial = ?info.serial,
            "Device information discovered"
        );

        let capabilities = self.get_capabilities().await?;
        tracing::info!(
            media = capabilities.media.is_some(),
            ptz = capabilities.ptz.is_some(),
            events = capabilities.events.is_some(),
            imaging = capabilities.imaging.is_some(),
            "Capabilities discovered"
        );

        let profiles = self.get_profiles().await?;
        if profiles.is_empty() {
            return Err(Error::NotFound("device exposes no media profiles".to_string()));
        }
        tracing::info!(count = profiles.len(), "Media profiles discovered");

        Ok(DiscoveredDevice {
            info,
            capabilities,
            profiles,
        })
    }
}

pub fn parse_device_information(xml: &str) -> DeviceInfo {
    DeviceInfo {
        manufacturer: extract_xml_value(xml, "Manufacturer"),
        model: extract_xml_value(xml, "Model"),
        firmware: extract_xml_value(xml, "FirmwareVersion"),
        serial: extract_xml_value(xml, "SerialNumber"),
    }
}

pub fn parse_capabilities(xml: &str) -> Capabilities {
    Capabilities {
        media: extract_capability_xaddr(xml, "Media"),
        ptz: extract_capability_xaddr(xml, "PTZ"),
        events: extract_capability_xaddr(xml, "Events"),
        imaging: extract_capability_xaddr(xml, "Imaging"),
    }
}

pub fn parse_profiles(xml: &str) -> Vec<ProfileSummary> {
    elements(xml, "Profiles")
        .into_iter()
        .filter_map(|el| {
            let token = el.attr("token")?;
            Some(ProfileSummary {
                name: extract_xml_value(el.inner, "Name").unwrap_or_else(|| token.clone()),
                token,
            })
        })
        .collect()
}

pub fn parse_notifications(xml: &str) -> Vec<CameraNotification> {
    extract_all_elements(xml, "NotificationMessage")
        .into_iter()
        .filter_map(|note| {
            let topic = extract_xml_value(note, "Topic")?;
            let kind = EventKind::from_topic(&topic);
            let active = kind
                .map(|k| {
                    extract_attribute_where(note, "SimpleItem", "Name", k.flag_item(), "Value").as_deref()
                        == Some("true")
                })
                .unwrap_or(false);
            Some(CameraNotification {
                utc_time: extract_xml_attribute(note, "Message", "UtcTime"),
                topic,
                kind,
                active,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_information() {
        let xml = envelope(
            "<tds:GetDeviceInformationResponse><tds:Manufacturer>Acme</tds:Manufacturer>\
             <tds:Model>M1</tds:Model><tds:FirmwareVersion>2.0</tds:FirmwareVersion>\
             <tds:SerialNumber>XYZ</tds:SerialNumber></tds:GetDeviceInformationResponse>",
            None,
        );
        let info = parse_device_information(&xml);
        assert_eq!(info.manufacturer.as_deref(), Some("Acme"));
        assert_eq!(info.firmware.as_deref(), Some("2.0"));
        assert_eq!(info.serial.as_deref(), Some("XYZ"));
    }

    #[test]
    fn test_parse_profiles() {
        let xml = envelope(
            r#"<trt:GetProfilesResponse>
            <trt:Profiles token="p1" fixed="true"><tt:Name>Main</tt:Name></trt:Profiles>
            <trt:Profiles token="p2" fixed="true"><tt:Name>Sub</tt:Name></trt:Profiles>
            </trt:GetProfilesResponse>"#,
            None,
        );
        let profiles = parse_profiles(&xml);
        assert_eq!(
            profiles,
            vec![
                ProfileSummary { token: "p1".into(), name: "Main".into() },
                ProfileSummary { token: "p2".into(), name: "Sub".into() },
            ]
        );
    }

    #[test]
    fn test_parse_notifications() {
        let xml = envelope(
            r#"<tev:PullMessagesResponse>
            <wsnt:NotificationMessage>
                <wsnt:Topic Dialect="x">
                    tns1:RuleEngine/CellMotionDetector/Motion
                </wsnt:Topic>
                <wsnt:Message><tt:Message UtcTime="2024-05-01T10:00:00+00:00">
                    <tt:Data><tt:SimpleItem Name="IsMotion" Value="true"/></tt:Data>
                </tt:Message></wsnt:Message>
            </wsnt:NotificationMessage>
            <wsnt:NotificationMessage>
                <wsnt:Topic>tns1:RuleEngine/TamperDetector/Tamper</wsnt:Topic>
                <wsnt:Message><tt:Message UtcTime="2024-05-01T10:00:01+00:00">
                    <tt:Data><tt:SimpleItem Name="IsTamper" Value="false"/></tt:Data>
                </tt:Message></wsnt:Message>
            </wsnt:NotificationMessage>
            </tev:PullMessagesResponse>"#,
            None,
        );
        let notes = parse_notifications(&xml);
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].kind, Some(EventKind::Motion));
        assert!(notes[0].active);
        assert_eq!(notes[0].utc_time.as_deref(), Some("2024-05-01T10:00:00+00:00"));
        assert_eq!(notes[1].kind, Some(EventKind::Tampering));
        assert!(!notes[1].active);
    }

    #[test]
    fn test_service_url() {
        let client = OnvifClient::new("http://cam:8080/", None);
        assert_eq!(client.service_url("ptz_service"), "http://cam:8080/onvif/ptz_service");
        assert!(client.security_header().is_none());

        let client = OnvifClient::new("http://cam:8080", Some(("admin".into(), "pw".into())));
        assert!(client.security_header().unwrap().contains("<Username>admin</Username>"));
    }
}
