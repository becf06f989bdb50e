//! Resolution of a discovered endpoint into a DIAL-addressable device.

use std::io::BufRead;

use quick_xml::{Error as XmlError, Reader, events::Event};
use tracing::debug;
use ureq::Agent;
use url::Url;

use pmossdp::DiscoveredDevice;

use crate::errors::DialError;

/// A device whose DIAL application-control endpoint has been resolved.
///
/// Immutable once built; resolve again to get an updated view. The
/// `application_url` is absolute and ends with `/` so application names can
/// be joined as sub-paths.
#[derive(Debug, Clone, PartialEq)]
pub struct DialDevice {
    pub device: DiscoveredDevice,
    pub friendly_name: String,
    pub manufacturer: String,
    pub model_name: String,
    pub udn: Option<String>,
    pub application_url: Url,
}

/// Parsed device description, plus (optionally) the DIAL service endpoint.
#[derive(Debug, Default)]
struct ParsedDescription {
    udn: Option<String>,
    friendly_name: Option<String>,
    manufacturer: Option<String>,
    model_name: Option<String>,
    dial_control_url: Option<String>,
}

/// HTTP-based resolver for UPnP description documents (DIAL 2.2 flavor).
pub struct DescriptionResolver {
    timeout_secs: u64,
}

impl DescriptionResolver {
    pub fn new(timeout_secs: u64) -> Self {
        Self { timeout_secs }
    }

    /// Fetches and parses `device.location`, returning the DIAL view of the
    /// device.
    ///
    /// The `Application-URL` response header takes precedence (the DIAL
    /// convention); when absent the XML `<serviceList>` is scanned for a
    /// DIAL service entry and its `controlURL` is used instead. Resolving
    /// the same device against an unchanged description yields an equal
    /// [`DialDevice`].
    pub fn resolve(&self, device: &DiscoveredDevice) -> Result<DialDevice, DialError> {
        let location = device.location.as_str();
        debug!("Fetching description for {} at {}", device.usn, location);

        let config = Agent::config_builder()
            .timeout_global(Some(std::time::Duration::from_secs(self.timeout_secs)))
            .http_status_as_error(false)
            .build();
        let agent: Agent = config.into();

        let mut response = agent
            .get(location)
            .call()
            .map_err(|e| DialError::unreachable(location, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DialError::UnexpectedStatus(
                location.to_string(),
                status.as_u16(),
            ));
        }

        // DIAL convention: the application URL rides on the description
        // fetch as a response header.
        let header_app_url = response
            .headers()
            .get("Application-URL")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string());

        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| DialError::unreachable(location, e))?;

        let parsed = parse_description(body.as_bytes())
            .map_err(|e| DialError::MalformedDescription(location.to_string(), e.to_string()))?;

        let friendly_name = parsed
            .friendly_name
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| {
                DialError::MalformedDescription(
                    location.to_string(),
                    "missing <friendlyName>".to_string(),
                )
            })?;

        let raw_app_url = header_app_url
            .filter(|url| !url.is_empty())
            .or(parsed.dial_control_url)
            .ok_or_else(|| DialError::NoDialService(location.to_string()))?;

        let application_url = normalize_application_url(location, &raw_app_url)
            .ok_or_else(|| DialError::NoDialService(location.to_string()))?;

        debug!(
            "Resolved DIAL device '{}' ({}): application URL {}",
            friendly_name, device.usn, application_url
        );

        Ok(DialDevice {
            device: device.clone(),
            friendly_name,
            manufacturer: parsed.manufacturer.unwrap_or_default(),
            model_name: parsed.model_name.unwrap_or_default(),
            udn: parsed.udn.or_else(|| device.udn()),
            application_url,
        })
    }
}

/// Streaming parse of the description document.
///
/// Tracks the current `<service>` block so the DIAL entry's `controlURL`
/// can be picked up as a fallback for devices that omit the
/// `Application-URL` header. Only the first DIAL service counts.
fn parse_description<R: BufRead>(body: R) -> Result<ParsedDescription, XmlError> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut parsed = ParsedDescription::default();

    let mut in_device = false;
    let mut in_service = false;
    let mut current_tag: Option<String> = None;
    let mut current_service_type: Option<String> = None;
    let mut current_control_url: Option<String> = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "device" => {
                        in_device = true;
                        current_tag = None;
                    }
                    "service" => {
                        if in_device {
                            in_service = true;
                            current_tag = None;
                            current_service_type = None;
                            current_control_url = None;
                        }
                    }
                    _ => {
                        if in_device {
                            current_tag = Some(name);
                        }
                    }
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                match name.as_str() {
                    "device" => {
                        in_device = false;
                    }
                    "service" => {
                        if in_device && in_service {
                            if let (Some(st), Some(ctrl)) =
                                (&current_service_type, &current_control_url)
                            {
                                let lower = st.to_ascii_lowercase();
                                if lower.contains("urn:dial-multiscreen-org:service:dial")
                                    && parsed.dial_control_url.is_none()
                                {
                                    parsed.dial_control_url = Some(ctrl.clone());
                                }
                            }
                            in_service = false;
                            current_service_type = None;
                            current_control_url = None;
                        }
                    }
                    _ => {}
                }
                current_tag = None;
            }
            Event::Text(e) => {
                if in_device {
                    if let Some(tag) = &current_tag {
                        let text = e.decode().map_err(XmlError::Encoding)?.into_owned();
                        match tag.as_str() {
                            "UDN" => {
                                parsed.udn = Some(text);
                            }
                            "friendlyName" => {
                                parsed.friendly_name = Some(text);
                            }
                            "manufacturer" => {
                                parsed.manufacturer = Some(text);
                            }
                            "modelName" => {
                                parsed.model_name = Some(text);
                            }
                            "serviceType" if in_service => {
                                current_service_type = Some(text);
                            }
                            "controlURL" if in_service => {
                                current_control_url = Some(text);
                            }
                            _ => {}
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    Ok(parsed)
}

/// Normalizes the application URL to an absolute URL ending with `/`.
///
/// Relative URLs are resolved against the description document's own
/// location.
fn normalize_application_url(description_url: &str, raw: &str) -> Option<Url> {
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse(description_url).ok()?;
            base.join(raw).ok()?
        }
        Err(_) => return None,
    };

    if url.path().ends_with('/') {
        Some(url)
    } else {
        let mut url = url;
        let path = format!("{}/", url.path());
        url.set_path(&path);
        Some(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DD_XML: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <specVersion><major>1</major><minor>0</minor></specVersion>
  <device>
    <deviceType>urn:schemas-upnp-org:device:tvdevice:1</deviceType>
    <friendlyName>Living Room TV</friendlyName>
    <manufacturer>ACME</manufacturer>
    <modelName>Screencaster 3000</modelName>
    <UDN>uuid:abc</UDN>
    <serviceList>
      <service>
        <serviceType>urn:dial-multiscreen-org:service:dial:1</serviceType>
        <serviceId>urn:dial-multiscreen-org:serviceId:dial</serviceId>
        <controlURL>/apps/</controlURL>
      </service>
    </serviceList>
  </device>
</root>"#;

    #[test]
    fn parses_device_metadata_and_dial_control_url() {
        let parsed = parse_description(DD_XML.as_bytes()).unwrap();
        assert_eq!(parsed.friendly_name.as_deref(), Some("Living Room TV"));
        assert_eq!(parsed.manufacturer.as_deref(), Some("ACME"));
        assert_eq!(parsed.model_name.as_deref(), Some("Screencaster 3000"));
        assert_eq!(parsed.udn.as_deref(), Some("uuid:abc"));
        assert_eq!(parsed.dial_control_url.as_deref(), Some("/apps/"));
    }

    #[test]
    fn non_dial_services_are_not_mistaken_for_the_endpoint() {
        let xml = r#"<root>
  <device>
    <friendlyName>Renderer</friendlyName>
    <serviceList>
      <service>
        <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>
        <controlURL>/av/control</controlURL>
      </service>
    </serviceList>
  </device>
</root>"#;
        let parsed = parse_description(xml.as_bytes()).unwrap();
        assert_eq!(parsed.dial_control_url, None);
    }

    #[test]
    fn mismatched_tags_are_an_error() {
        assert!(parse_description("<root><device></service></root>".as_bytes()).is_err());
    }

    #[test]
    fn non_xml_body_parses_to_an_empty_description() {
        // quick-xml treats a plain-text body as one text event; the resolver
        // then rejects it for the missing <friendlyName>.
        let parsed = parse_description("certainly not xml".as_bytes()).unwrap();
        assert_eq!(parsed.friendly_name, None);
    }

    #[test]
    fn relative_application_url_resolves_against_description_location() {
        let url =
            normalize_application_url("http://10.0.0.5:8008/dd.xml", "/apps/").expect("resolves");
        assert_eq!(url.as_str(), "http://10.0.0.5:8008/apps/");

        let url = normalize_application_url("http://10.0.0.5:8008/ssdp/device-desc.xml", "apps")
            .expect("resolves");
        assert_eq!(url.as_str(), "http://10.0.0.5:8008/ssdp/apps/");
    }

    #[test]
    fn absolute_application_url_gains_trailing_slash() {
        let url = normalize_application_url("http://10.0.0.5:8008/dd.xml", "http://10.0.0.5:8008/apps")
            .expect("resolves");
        assert_eq!(url.as_str(), "http://10.0.0.5:8008/apps/");
    }

    #[test]
    fn garbage_application_url_is_rejected() {
        assert!(normalize_application_url("http://10.0.0.5/dd.xml", "http://[broken").is_none());
    }
}
