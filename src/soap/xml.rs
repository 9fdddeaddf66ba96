//! Namespace-agnostic XML scanning
//!
//! ONVIF devices disagree on namespace prefixes (`tt:`, `tds:`, none at all),
//! so lookups match on the element's local name only.

/// A located element: its start tag text and inner content
#[derive(Debug, Clone, Copy)]
struct Element<'a> {
    start_tag: &'a str,
    inner: &'a str,
    end: usize,
}

/// Strip a namespace prefix (`tt:Name` -> `Name`)
pub fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Tag name at `pos` (which must point at `<`)
fn tag_name_at(xml: &str, pos: usize) -> &str {
    let rest = &xml[pos + 1..];
    let rest = rest.strip_prefix('/').unwrap_or(rest);
    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .unwrap_or(rest.len());
    &rest[..end]
}

fn is_markup(xml: &str, pos: usize) -> bool {
    matches!(xml.as_bytes().get(pos + 1), Some(b'?') | Some(b'!'))
}

fn is_closing(xml: &str, pos: usize) -> bool {
    xml.as_bytes().get(pos + 1) == Some(&b'/')
}

fn find_element<'a>(xml: &'a str, local: &str, from: usize) -> Option<Element<'a>> {
    let mut cursor = from;
    while let Some(offset) = xml[cursor..].find('<') {
        let pos = cursor + offset;
        cursor = pos + 1;
        if is_markup(xml, pos) || is_closing(xml, pos) {
            continue;
        }
        if local_name(tag_name_at(xml, pos)) != local {
            continue;
        }

        let gt = pos + xml[pos..].find('>')?;
        let start_tag = &xml[pos..=gt];
        if start_tag.ends_with("/>") {
            return Some(Element {
                start_tag,
                inner: "",
                end: gt + 1,
            });
        }

        // 対応する閉じタグを探す（同名要素のネストを考慮）
        let content_start = gt + 1;
        let mut depth = 0usize;
        let mut scan = content_start;
        while let Some(off) = xml[scan..].find('<') {
            let p = scan + off;
            scan = p + 1;
            if is_markup(xml, p) || local_name(tag_name_at(xml, p)) != local {
                continue;
            }
            let tag_end = p + xml[p..].find('>')?;
            if is_closing(xml, p) {
                if depth == 0 {
                    return Some(Element {
                        start_tag,
                        inner: &xml[content_start..p],
                        end: tag_end + 1,
                    });
                }
                depth -= 1;
            } else if !xml[p..=tag_end].ends_with("/>") {
                depth += 1;
            }
        }
        return None;
    }
    None
}

/// Inner content of the first element with the given local name
pub fn extract_element<'a>(xml: &'a str, tag: &str) -> Option<&'a str> {
    find_element(xml, tag, 0).map(|e| e.inner)
}

/// Inner content of every element with the given local name, in document order
pub fn extract_all_elements<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut cursor = 0;
    while let Some(el) = find_element(xml, tag, cursor) {
        out.push(el.inner);
        cursor = el.end;
    }
    out
}

/// Element handle exposing attributes and inner content
#[derive(Debug, Clone, Copy)]
pub struct XmlElement<'a> {
    start_tag: &'a str,
    pub inner: &'a str,
}

impl<'a> XmlElement<'a> {
    pub fn attr(&self, name: &str) -> Option<String> {
        attribute(self.start_tag, name)
    }
}

/// Every element with the given local name (outermost matches only)
pub fn elements<'a>(xml: &'a str, tag: &str) -> Vec<XmlElement<'a>> {
    let mut out = Vec::new();
    let mut cursor = 0;
    while let Some(el) = find_element(xml, tag, cursor) {
        out.push(XmlElement {
            start_tag: el.start_tag,
            inner: el.inner,
        });
        cursor = el.end;
    }
    out
}

/// Extract XML value with namespace-agnostic matching
///
/// Returns the trimmed text of the first matching element that has non-empty text.
pub fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let mut cursor = 0;
    while let Some(el) = find_element(xml, tag, cursor) {
        let value = el.inner.trim();
        if !value.is_empty() {
            return Some(unescape(value));
        }
        cursor = el.end;
    }
    None
}

/// Extract XML attribute value from the first element with the given local name
/// that carries the attribute
pub fn extract_xml_attribute(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let mut cursor = 0;
    while let Some(el) = find_element(xml, tag, cursor) {
        if let Some(value) = attribute(el.start_tag, attr) {
            return Some(value);
        }
        cursor = start_offset(xml, el.start_tag) + el.start_tag.len();
    }
    None
}

/// `value_attr` of the first `tag` element whose `key_attr` equals `key`
///
/// e.g. `<tt:SimpleItem Name="IsMotion" Value="true"/>`
pub fn extract_attribute_where(
    xml: &str,
    tag: &str,
    key_attr: &str,
    key: &str,
    value_attr: &str,
) -> Option<String> {
    let mut cursor = 0;
    while let Some(el) = find_element(xml, tag, cursor) {
        if attribute(el.start_tag, key_attr).as_deref() == Some(key) {
            return attribute(el.start_tag, value_attr);
        }
        cursor = start_offset(xml, el.start_tag) + el.start_tag.len();
    }
    None
}

/// Byte offset of a sub-slice within its parent
fn start_offset(parent: &str, child: &str) -> usize {
    child.as_ptr() as usize - parent.as_ptr() as usize
}

fn attribute(start_tag: &str, attr: &str) -> Option<String> {
    let pattern = format!("{}=", attr);
    let mut cursor = 0;
    while let Some(off) = start_tag[cursor..].find(pattern.as_str()) {
        let at = cursor + off;
        cursor = at + pattern.len();
        let boundary = start_tag[..at]
            .chars()
            .last()
            .map(|c| c.is_whitespace() || c == ':')
            .unwrap_or(false);
        if !boundary {
            continue;
        }
        let after = &start_tag[at + pattern.len()..];
        let quote = after.chars().next()?;
        if quote != '"' && quote != '\'' {
            continue;
        }
        let value = &after[1..];
        let end = value.find(quote)?;
        return Some(unescape(&value[..end]));
    }
    None
}

/// Extract XAddr from capability section (`<tt:Media><tt:XAddr>..`)
pub fn extract_capability_xaddr(xml: &str, capability: &str) -> Option<String> {
    let section = extract_element(xml, capability)?;
    extract_xml_value(section, "XAddr")
}

/// Local name of the first child element of the SOAP Body
pub fn body_operation(xml: &str) -> Option<String> {
    let body = extract_element(xml, "Body")?;
    let mut cursor = 0;
    while let Some(off) = body[cursor..].find('<') {
        let pos = cursor + off;
        cursor = pos + 1;
        if is_markup(body, pos) || is_closing(body, pos) {
            continue;
        }
        let name = local_name(tag_name_at(body, pos));
        if !name.is_empty() {
            return Some(name.to_string());
        }
    }
    None
}

/// Escape text for inclusion in element content or attribute values
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE_INFO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<soap:Envelope xmlns:soap="http://www.w3.org/2003/05/soap-envelope">
  <soap:Body>
    <tds:GetDeviceInformationResponse>
      <tds:Manufacturer>Edge AI Simulator</tds:Manufacturer>
      <tds:Model>ONVIF-PTZ-4K</tds:Model>
      <tds:SerialNumber>AB12CD34</tds:SerialNumber>
    </tds:GetDeviceInformationResponse>
  </soap:Body>
</soap:Envelope>"#;

    #[test]
    fn test_extract_xml_value_any_prefix() {
        assert_eq!(
            extract_xml_value(DEVICE_INFO, "Manufacturer").as_deref(),
            Some("Edge AI Simulator")
        );
        assert_eq!(extract_xml_value("<Model>X</Model>", "Model").as_deref(), Some("X"));
        assert_eq!(extract_xml_value(DEVICE_INFO, "FirmwareVersion"), None);
    }

    #[test]
    fn test_extract_attribute() {
        let xml = r#"<tt:PanTilt x="0.5" y='-0.25' space="x"/><tt:Zoom x="2"/>"#;
        assert_eq!(extract_xml_attribute(xml, "PanTilt", "x").as_deref(), Some("0.5"));
        assert_eq!(extract_xml_attribute(xml, "PanTilt", "y").as_deref(), Some("-0.25"));
        assert_eq!(extract_xml_attribute(xml, "Zoom", "x").as_deref(), Some("2"));
        assert_eq!(extract_xml_attribute(xml, "Zoom", "y"), None);
    }

    #[test]
    fn test_attribute_skips_elements_without_it() {
        let xml = r#"<wsnt:Message><tt:Message UtcTime="2024-05-01T00:00:00Z"><tt:Data>
            <tt:SimpleItem Name="Other" Value="false"/><tt:SimpleItem Name="IsMotion" Value="true"/>
            </tt:Data></tt:Message></wsnt:Message>"#;
        assert_eq!(
            extract_xml_attribute(xml, "Message", "UtcTime").as_deref(),
            Some("2024-05-01T00:00:00Z")
        );
        assert_eq!(
            extract_attribute_where(xml, "SimpleItem", "Name", "IsMotion", "Value").as_deref(),
            Some("true")
        );
        assert_eq!(extract_attribute_where(xml, "SimpleItem", "Name", "IsTamper", "Value"), None);
    }

    #[test]
    fn test_nested_same_name() {
        let xml = "<a:Item><b:Item>inner</b:Item>tail</a:Item><Item>second</Item>";
        assert_eq!(extract_element(xml, "Item"), Some("<b:Item>inner</b:Item>tail"));
        assert_eq!(extract_all_elements(xml, "Item").len(), 2);
    }

    #[test]
    fn test_elements_with_attributes() {
        let xml = r#"<trt:Profiles token="a"><tt:Name>A</tt:Name></trt:Profiles><trt:Profiles token="b"/>"#;
        let found = elements(xml, "Profiles");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].attr("token").as_deref(), Some("a"));
        assert_eq!(found[0].inner, "<tt:Name>A</tt:Name>");
        assert_eq!(found[1].attr("token").as_deref(), Some("b"));
        assert_eq!(found[1].inner, "");
    }

    #[test]
    fn test_capability_xaddr() {
        let xml = "<tt:Media><tt:XAddr>http://cam/onvif/media_service</tt:XAddr></tt:Media>\
                   <tt:PTZ><tt:XAddr>http://cam/onvif/ptz_service</tt:XAddr></tt:PTZ>";
        assert_eq!(
            extract_capability_xaddr(xml, "PTZ").as_deref(),
            Some("http://cam/onvif/ptz_service")
        );
        assert_eq!(extract_capability_xaddr(xml, "Imaging"), None);
    }

    #[test]
    fn test_body_operation() {
        assert_eq!(
            body_operation(DEVICE_INFO).as_deref(),
            Some("GetDeviceInformationResponse")
        );
        let with_comment = "<s:Envelope><s:Body><!-- hi --><trt:GetProfiles/></s:Body></s:Envelope>";
        assert_eq!(body_operation(with_comment).as_deref(), Some("GetProfiles"));
        assert_eq!(body_operation("<Envelope></Envelope>"), None);
        assert_eq!(body_operation("<Envelope><Body></Body></Envelope>"), None);
    }

    #[test]
    fn test_escape_roundtrip_entities() {
        assert_eq!(escape("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
        assert_eq!(
            extract_xml_value("<Text>a &amp; b</Text>", "Text").as_deref(),
            Some("a & b")
        );
    }
}
