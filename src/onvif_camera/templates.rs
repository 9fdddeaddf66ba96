//! SOAP response bodies for each ONVIF operation

use super::types::{DeviceIdentity, ImagingSettings, MediaProfile, PtzPosition};
use crate::soap::{envelope, escape};
use chrono::{DateTime, Datelike, Timelike, Utc};

pub fn device_information(identity: &DeviceIdentity) -> String {
    envelope(
        &format!(
            r#"<tds:GetDeviceInformationResponse>
            <tds:Manufacturer>{}</tds:Manufacturer>
            <tds:Model>{}</tds:Model>
            <tds:FirmwareVersion>{}</tds:FirmwareVersion>
            <tds:SerialNumber>{}</tds:SerialNumber>
            <tds:HardwareId>{}</tds:HardwareId>
        </tds:GetDeviceInformationResponse>"#,
            escape(&identity.manufacturer),
            escape(&identity.model),
            escape(&identity.firmware_version),
            escape(&identity.serial_number),
            escape(&identity.hardware_id)
        ),
        None,
    )
}

/// `base` is `http://host:port`
pub fn capabilities(base: &str) -> String {
    envelope(
        &format!(
            r#"<tds:GetCapabilitiesResponse>
            <tds:Capabilities>
                <tt:Media>
                    <tt:XAddr>{base}/onvif/media_service</tt:XAddr>
                    <tt:StreamingCapabilities>
                        <tt:RTPMulticast>false</tt:RTPMulticast>
                        <tt:RTP_TCP>true</tt:RTP_TCP>
                        <tt:RTP_RTSP_TCP>true</tt:RTP_RTSP_TCP>
                    </tt:StreamingCapabilities>
                </tt:Media>
                <tt:PTZ>
                    <tt:XAddr>{base}/onvif/ptz_service</tt:XAddr>
                </tt:PTZ>
                <tt:Events>
                    <tt:XAddr>{base}/onvif/event_service</tt:XAddr>
                </tt:Events>
                <tt:Imaging>
                    <tt:XAddr>{base}/onvif/imaging_service</tt:XAddr>
                </tt:Imaging>
            </tds:Capabilities>
        </tds:GetCapabilitiesResponse>"#,
            base = escape(base)
        ),
        None,
    )
}

pub fn system_date_and_time(now: DateTime<Utc>) -> String {
    envelope(
        &format!(
            r#"<tds:GetSystemDateAndTimeResponse>
            <tds:SystemDateAndTime>
                <tt:DateTimeType>NTP</tt:DateTimeType>
                <tt:DaylightSavings>false</tt:DaylightSavings>
                <tt:UTCDateTime>
                    <tt:Time><tt:Hour>{}</tt:Hour><tt:Minute>{}</tt:Minute><tt:Second>{}</tt:Second></tt:Time>
                    <tt:Date><tt:Year>{}</tt:Year><tt:Month>{}</tt:Month><tt:Day>{}</tt:Day></tt:Date>
                </tt:UTCDateTime>
            </tds:SystemDateAndTime>
        </tds:GetSystemDateAndTimeResponse>"#,
            now.hour(),
            now.minute(),
            now.second(),
            now.year(),
            now.month(),
            now.day()
        ),
        None,
    )
}

pub fn profiles(profiles: &[MediaProfile]) -> String {
    let mut items = String::new();
    for p in profiles {
        items.push_str(&format!(
            r#"
            <trt:Profiles token="{}" fixed="true">
                <tt:Name>{}</tt:Name>
                <tt:VideoEncoderConfiguration>
                    <tt:Encoding>{}</tt:Encoding>
                    <tt:Resolution>
                        <tt:Width>{}</tt:Width>
                        <tt:Height>{}</tt:Height>
                    </tt:Resolution>
                    <tt:RateControl>
                        <tt:FrameRateLimit>{}</tt:FrameRateLimit>
                        <tt:BitrateLimit>{}</tt:BitrateLimit>
                    </tt:RateControl>
                </tt:VideoEncoderConfiguration>
            </trt:Profiles>"#,
            p.token,
            escape(p.name),
            p.encoding,
            p.width,
            p.height,
            p.framerate,
            p.bitrate
        ));
    }
    envelope(
        &format!("<trt:GetProfilesResponse>{}\n        </trt:GetProfilesResponse>", items),
        None,
    )
}

pub fn stream_uri(profile: &MediaProfile) -> String {
    envelope(
        &format!(
            r#"<trt:GetStreamUriResponse>
            <trt:MediaUri>
                <tt:Uri>{}</tt:Uri>
                <tt:InvalidAfterConnect>false</tt:InvalidAfterConnect>
                <tt:InvalidAfterReboot>false</tt:InvalidAfterReboot>
                <tt:Timeout>PT60S</tt:Timeout>
            </trt:MediaUri>
        </trt:GetStreamUriResponse>"#,
            escape(&profile.uri)
        ),
        None,
    )
}

/// `operation` is the request name, e.g. `RelativeMove` -> `RelativeMoveResponse`
pub fn move_response() -> String {
    envelope("<tptz:MoveResponse/>", None)
}

pub fn ptz_status(position: &PtzPosition, now: DateTime<Utc>) -> String {
    envelope(
        &format!(
            r#"<tptz:GetStatusResponse>
            <tptz:PTZStatus>
                <tt:Position>
                    <tt:PanTilt x="{:.2}" y="{:.2}"/>
                    <tt:Zoom x="{:.2}"/>
                </tt:Position>
                <tt:MoveStatus>
                    <tt:PanTilt>IDLE</tt:PanTilt>
                    <tt:Zoom>IDLE</tt:Zoom>
                </tt:MoveStatus>
                <tt:UtcTime>{}</tt:UtcTime>
            </tptz:PTZStatus>
        </tptz:GetStatusResponse>"#,
            position.pan,
            position.tilt,
            position.zoom,
            now.to_rfc3339()
        ),
        None,
    )
}

pub fn imaging_settings(settings: &ImagingSettings) -> String {
    envelope(
        &format!(
            r#"<timg:GetImagingSettingsResponse>
            <timg:ImagingSettings>
                <tt:Brightness>{:.1}</tt:Brightness>
                <tt:Contrast>{:.1}</tt:Contrast>
                <tt:Saturation>{:.1}</tt:Saturation>
                <tt:Sharpness>{:.1}</tt:Sharpness>
            </timg:ImagingSettings>
        </timg:GetImagingSettingsResponse>"#,
            settings.brightness, settings.contrast, settings.saturation, settings.sharpness
        ),
        None,
    )
}

pub fn set_imaging_settings() -> String {
    envelope("<timg:SetImagingSettingsResponse/>", None)
}

pub const MOTION_TOPIC: &str = "tns1:RuleEngine/CellMotionDetector/Motion";
pub const TAMPER_TOPIC: &str = "tns1:RuleEngine/TamperDetector/Tamper";

fn notification(topic: &str, item: &str, utc: &str) -> String {
    format!(
        r#"
            <wsnt:NotificationMessage>
                <wsnt:Topic Dialect="http://www.onvif.org/ver10/tev/topicExpression/ConcreteSet">{}</wsnt:Topic>
                <wsnt:Message>
                    <tt:Message UtcTime="{}">
                        <tt:Source>
                            <tt:SimpleItem Name="VideoSourceConfigurationToken" Value="profile_s_h264"/>
                        </tt:Source>
                        <tt:Data>
                            <tt:SimpleItem Name="{}" Value="true"/>
                        </tt:Data>
                    </tt:Message>
                </wsnt:Message>
            </wsnt:NotificationMessage>"#,
        topic, utc, item
    )
}

pub fn pull_messages(motion: bool, tamper: bool, now: DateTime<Utc>) -> String {
    let utc = now.to_rfc3339();
    let mut events = String::new();
    if motion {
        events.push_str(&notification(MOTION_TOPIC, "IsMotion", &utc));
    }
    if tamper {
        events.push_str(&notification(TAMPER_TOPIC, "IsTamper", &utc));
    }
    envelope(
        &format!(
            r#"<tev:PullMessagesResponse>
            <tev:CurrentTime>{utc}</tev:CurrentTime>
            <tev:TerminationTime>{utc}</tev:TerminationTime>{events}
        </tev:PullMessagesResponse>"#,
            utc = utc,
            events = events
        ),
        None,
    )
}
