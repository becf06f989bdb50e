use std::time::{Duration, SystemTime};

/// A device record built from one SSDP announcement or search response.
///
/// Identity is the USN. `location`, `server`, `search_target` and `max_age`
/// are overwritten on every re-announcement (a device may legitimately move
/// its description URL across announcements); `first_seen` never changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    /// Unique Service Name, e.g. `uuid:abc::urn:dial-multiscreen-org:service:dial:1`
    pub usn: String,
    /// URL of the UPnP device description document (LOCATION header)
    pub location: String,
    /// SERVER header, `Unknown` when the device omitted it
    pub server: String,
    /// ST (or NT) the device answered with
    pub search_target: String,
    /// Advertised validity in seconds (CACHE-CONTROL max-age)
    pub max_age: u32,
    pub first_seen: SystemTime,
    pub last_seen: SystemTime,
}

impl DiscoveredDevice {
    /// Builds a fresh record with both timestamps set to now.
    pub fn new(usn: String, location: String, server: String, search_target: String, max_age: u32) -> Self {
        let now = SystemTime::now();
        Self {
            usn,
            location,
            server,
            search_target,
            max_age,
            first_seen: now,
            last_seen: now,
        }
    }

    /// The UDN part of the USN (`uuid:...` before the `::` separator), if any.
    pub fn udn(&self) -> Option<String> {
        extract_udn_from_usn(&self.usn)
    }

    /// True when the record has outlived its expiry window at `now`.
    ///
    /// The window is the advertised max-age unless the registry was given a
    /// fixed session TTL.
    pub fn is_expired(&self, now: SystemTime, fixed_ttl: Option<Duration>) -> bool {
        let window = fixed_ttl.unwrap_or_else(|| Duration::from_secs(self.max_age as u64));
        match now.duration_since(self.last_seen) {
            Ok(age) => age > window,
            // last_seen is in the future relative to `now`: not expired
            Err(_) => false,
        }
    }
}

pub(crate) fn extract_udn_from_usn(usn: &str) -> Option<String> {
    let lower = usn.trim().to_ascii_lowercase();
    if let Some(idx) = lower.find("uuid:") {
        let sub = &lower[idx..];
        if let Some(end) = sub.find("::") {
            Some(sub[..end].to_string())
        } else {
            Some(sub.to_string())
        }
    } else {
        None
    }
}
