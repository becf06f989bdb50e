//! Lifecycle control of named applications on a DIAL device.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};
use ureq::Agent;
use url::Url;
use xmltree::{Element, XMLNode};

use crate::config::DialConfig;
use crate::description::DialDevice;
use crate::errors::DialError;
use crate::{DIAL_MAX_PAYLOAD, DIAL_VERSION};

/// Maximum application name length per the DIAL reference server.
const MAX_APP_NAME: usize = 255;

/// Observed lifecycle state of one application, as last reported by the
/// device. `Unknown` is the state before any query and the mapping for
/// state text this client does not recognize (e.g. `installable=...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Hidden,
    Unknown,
}

impl ApplicationState {
    /// Maps the `<state>` text of a DIAL status document.
    pub fn from_dial(text: &str) -> Self {
        match text.trim().to_ascii_lowercase().as_str() {
            "running" => ApplicationState::Running,
            "stopped" => ApplicationState::Stopped,
            // receivers report either spelling in the wild
            "hidden" | "hide" => ApplicationState::Hidden,
            "starting" => ApplicationState::Starting,
            "stopping" => ApplicationState::Stopping,
            _ => ApplicationState::Unknown,
        }
    }
}

impl fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ApplicationState::Stopped => "stopped",
            ApplicationState::Starting => "starting",
            ApplicationState::Running => "running",
            ApplicationState::Stopping => "stopping",
            ApplicationState::Hidden => "hidden",
            ApplicationState::Unknown => "unknown",
        };
        f.write_str(text)
    }
}

/// One snapshot of an application's status on one device.
///
/// Never cached by the client; the device is the sole source of truth and
/// every field is re-derived on each `status` call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationInstance {
    pub name: String,
    pub state: ApplicationState,
    /// Per-instance URL for stop, when the device reported one.
    pub instance_url: Option<Url>,
    /// Whether the device allows DELETE on the instance URL.
    pub allow_stop: bool,
    /// `<additionalData>` key/value pairs, URL-escaped strings per DIAL.
    pub extra_data: BTreeMap<String, String>,
}

/// Stateless HTTP client for one DIAL device's application-control endpoint.
///
/// Every operation is a single bounded HTTP exchange; concurrent operations
/// against the same application are serialized by the device itself, not
/// here.
pub struct DialClient {
    device: DialDevice,
    config: DialConfig,
}

impl DialClient {
    pub fn new(device: DialDevice) -> Self {
        Self::with_config(device, DialConfig::default())
    }

    pub fn with_config(device: DialDevice, config: DialConfig) -> Self {
        Self { device, config }
    }

    pub fn device(&self) -> &DialDevice {
        &self.device
    }

    /// Launches `app`, passing the payload through unmodified.
    ///
    /// Returns the instance URL from the `Location` response header when the
    /// device provides one. Launch acceptance says nothing about the app
    /// being up yet; poll [`DialClient::status`] for that. Retries on 503
    /// per [`DialConfig::busy_retries`].
    pub fn launch(&self, app: &str, payload: Option<&str>) -> Result<Option<Url>, DialError> {
        if let Some(payload) = payload {
            validate_payload(payload)?;
        }
        let url = self.app_url(app)?;

        let mut attempt = 0u32;
        loop {
            match self.send_launch(app, &url, payload) {
                Err(DialError::DeviceBusy(_)) if attempt < self.config.busy_retries => {
                    attempt += 1;
                    warn!(
                        "Device busy launching '{}', retry {}/{}",
                        app, attempt, self.config.busy_retries
                    );
                    std::thread::sleep(self.config.retry_delay());
                }
                other => return other,
            }
        }
    }

    fn send_launch(
        &self,
        app: &str,
        url: &Url,
        payload: Option<&str>,
    ) -> Result<Option<Url>, DialError> {
        debug!("Launching '{}' via {}", app, url);
        let response = self
            .agent()
            .post(url.as_str())
            .header("Content-Type", "text/plain; charset=utf-8")
            .send(payload.unwrap_or(""))
            .map_err(|e| DialError::unreachable(url.as_str(), e))?;

        match response.status().as_u16() {
            200 | 201 => {
                let instance = response
                    .headers()
                    .get("Location")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|loc| resolve_against(url, loc));
                debug!("Launch of '{}' accepted, instance {:?}", app, instance);
                Ok(instance)
            }
            404 => Err(DialError::AppNotInstalled(app.to_string())),
            503 => Err(DialError::DeviceBusy(app.to_string())),
            code @ (400 | 413) => Err(DialError::InvalidPayload(format!(
                "device refused the payload (HTTP {code})"
            ))),
            code => Err(DialError::UnexpectedStatus(url.to_string(), code)),
        }
    }

    /// Queries the current status of `app`.
    pub fn status(&self, app: &str) -> Result<ApplicationInstance, DialError> {
        let base = self.app_url(app)?;
        let mut url = base.clone();
        url.query_pairs_mut().append_pair("clientDialVer", DIAL_VERSION);

        let mut response = self
            .agent()
            .get(url.as_str())
            .call()
            .map_err(|e| DialError::unreachable(url.as_str(), e))?;

        match response.status().as_u16() {
            200 => {}
            404 => return Err(DialError::AppNotInstalled(app.to_string())),
            code => return Err(DialError::UnexpectedStatus(url.to_string(), code)),
        }

        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| DialError::unreachable(url.as_str(), e))?;

        parse_status(app, &base, &body)
    }

    /// Stops the application instance behind `instance_url`, as obtained
    /// from a prior [`DialClient::status`] call.
    ///
    /// DIAL may run several instances of one application; deleting the
    /// device-supplied per-instance URL is unambiguous and idempotent on
    /// the device side.
    pub fn stop(&self, app: &str, instance_url: &Url) -> Result<(), DialError> {
        debug!("Stopping '{}' via {}", app, instance_url);
        let response = self
            .agent()
            .delete(instance_url.as_str())
            .call()
            .map_err(|e| DialError::unreachable(instance_url.as_str(), e))?;

        match response.status().as_u16() {
            200 | 204 => Ok(()),
            404 => Err(DialError::AppNotInstalled(app.to_string())),
            403 | 501 => Err(DialError::OperationNotSupported("stop".to_string())),
            code => Err(DialError::UnexpectedStatus(instance_url.to_string(), code)),
        }
    }

    /// Asks the device to hide `app` (DIAL ≥ 2.1). The app keeps running
    /// but leaves the screen; a later launch brings it back.
    pub fn hide(&self, app: &str) -> Result<(), DialError> {
        let mut url = self.app_url(app)?;
        let path = format!("{}/hide", url.path());
        url.set_path(&path);

        debug!("Hiding '{}' via {}", app, url);
        let response = self
            .agent()
            .post(url.as_str())
            .send("")
            .map_err(|e| DialError::unreachable(url.as_str(), e))?;

        match response.status().as_u16() {
            200 | 204 => Ok(()),
            404 => Err(DialError::AppNotInstalled(app.to_string())),
            403 | 501 => Err(DialError::OperationNotSupported("hide".to_string())),
            code => Err(DialError::UnexpectedStatus(url.to_string(), code)),
        }
    }

    /// Whether the device allows stopping `app`, derived from a fresh
    /// status query.
    pub fn supports_stop(&self, app: &str) -> Result<bool, DialError> {
        Ok(self.status(app)?.allow_stop)
    }

    fn app_url(&self, app: &str) -> Result<Url, DialError> {
        if app.is_empty() || app.len() > MAX_APP_NAME || app.contains('/') {
            return Err(DialError::InvalidAppName(app.to_string()));
        }
        self.device
            .application_url
            .join(app)
            .map_err(|_| DialError::InvalidAppName(app.to_string()))
    }

    // One agent per exchange; nothing is kept across calls.
    fn agent(&self) -> Agent {
        let config = Agent::config_builder()
            .timeout_global(Some(self.config.http_timeout()))
            .http_status_as_error(false)
            .build();
        config.into()
    }
}

/// DIAL payloads are bounded and printable-ASCII; receivers answer 400/413
/// otherwise, so reject locally before touching the network.
fn validate_payload(payload: &str) -> Result<(), DialError> {
    if payload.len() > DIAL_MAX_PAYLOAD {
        return Err(DialError::InvalidPayload(format!(
            "{} bytes exceeds the {} byte DIAL limit",
            payload.len(),
            DIAL_MAX_PAYLOAD
        )));
    }
    if payload
        .bytes()
        .any(|b| !(0x20..=0x7e).contains(&b) && b != b'\r' && b != b'\n' && b != b'\t')
    {
        return Err(DialError::InvalidPayload(
            "payload contains non-printable or non-ASCII characters".to_string(),
        ));
    }
    Ok(())
}

/// Resolves a possibly relative URL reference against an application URL.
fn resolve_against(base: &Url, reference: &str) -> Option<Url> {
    match Url::parse(reference) {
        Ok(url) => Some(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let mut base = base.clone();
            if !base.path().ends_with('/') {
                let path = format!("{}/", base.path());
                base.set_path(&path);
            }
            base.join(reference).ok()
        }
        Err(_) => None,
    }
}

/// Parses a DIAL status document (`<service>` root, `urn:dial-multiscreen-org:schemas:dial`).
fn parse_status(app: &str, base: &Url, body: &str) -> Result<ApplicationInstance, DialError> {
    let root = Element::parse(body.as_bytes())
        .map_err(|e| DialError::MalformedStatus(app.to_string(), e.to_string()))?;

    if root.name != "service" {
        return Err(DialError::MalformedStatus(
            app.to_string(),
            format!("unexpected root element <{}>", root.name),
        ));
    }

    let state_text = root
        .get_child("state")
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .ok_or_else(|| {
            DialError::MalformedStatus(app.to_string(), "missing <state> element".to_string())
        })?;
    let state = ApplicationState::from_dial(&state_text);

    let name = root
        .get_child("name")
        .and_then(|e| e.get_text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| app.to_string());

    let allow_stop = root
        .get_child("options")
        .and_then(|options| options.attributes.get("allowStop"))
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let instance_url = root
        .get_child("link")
        .filter(|link| {
            link.attributes
                .get("rel")
                .map(|rel| rel == "run")
                .unwrap_or(false)
        })
        .and_then(|link| link.attributes.get("href"))
        .and_then(|href| resolve_against(base, href));

    let extra_data = root
        .get_child("additionalData")
        .map(|data| {
            data.children
                .iter()
                .filter_map(|node| match node {
                    XMLNode::Element(child) => Some(child),
                    _ => None,
                })
                .map(|child| {
                    let value = child
                        .get_text()
                        .map(|t| t.trim().to_string())
                        .unwrap_or_default();
                    (child.name.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ApplicationInstance {
        name,
        state,
        instance_url,
        allow_stop,
        extra_data,
    })
}
