//! SOAP 1.2 envelope rendering

use super::xml::escape;

pub const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Namespace declarations shared by every ONVIF document we emit
pub const SOAP_NAMESPACES: &str = r#"xmlns:soap="http://www.w3.org/2003/05/soap-envelope"
               xmlns:tds="http://www.onvif.org/ver10/device/wsdl"
               xmlns:trt="http://www.onvif.org/ver10/media/wsdl"
               xmlns:tptz="http://www.onvif.org/ver20/ptz/wsdl"
               xmlns:tev="http://www.onvif.org/ver10/events/wsdl"
               xmlns:timg="http://www.onvif.org/ver20/imaging/wsdl"
               xmlns:wsnt="http://docs.oasis-open.org/wsn/b-2"
               xmlns:tns1="http://www.onvif.org/ver10/topics"
               xmlns:tt="http://www.onvif.org/ver10/schema""#;

/// Wrap a body fragment (and optional header fragment) in a SOAP envelope
pub fn envelope(body: &str, header: Option<&str>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope {}>
    {}<soap:Body>
        {}
    </soap:Body>
</soap:Envelope>"#,
        SOAP_NAMESPACES,
        header.unwrap_or(""),
        body
    )
}

/// SOAP fault (soap:Receiver) with the given reason text
pub fn fault(reason: &str) -> String {
    envelope(
        &format!(
            r#"<soap:Fault>
            <soap:Code>
                <soap:Value>soap:Receiver</soap:Value>
            </soap:Code>
            <soap:Reason>
                <soap:Text xml:lang="en">{}</soap:Text>
            </soap:Reason>
        </soap:Fault>"#,
            escape(reason)
        ),
        None,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soap::{body_operation, extract_xml_value};

    #[test]
    fn test_envelope_body_is_addressable() {
        let doc = envelope("<tds:GetDeviceInformation/>", None);
        assert!(doc.starts_with("<?xml"));
        assert_eq!(body_operation(&doc).as_deref(), Some("GetDeviceInformation"));
    }

    #[test]
    fn test_fault_reason() {
        let doc = fault("Unsupported method: <Foo>");
        assert_eq!(body_operation(&doc).as_deref(), Some("Fault"));
        assert_eq!(
            extract_xml_value(&doc, "Text").as_deref(),
            Some("Unsupported method: <Foo>")
        );
        assert_eq!(extract_xml_value(&doc, "Value").as_deref(), Some("soap:Receiver"));
    }
}
