use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::device::DiscoveredDevice;

/// Deduplicated, expiring cache of discovered devices, keyed by USN.
///
/// All methods take `&self`; mutation is serialized by an internal mutex so
/// response handlers racing with a background discovery round can never
/// interleave an upsert. Last writer wins per USN, in arrival order.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Mutex<HashMap<String, DiscoveredDevice>>,
    /// When set, overrides the per-device max-age as the expiry window.
    fixed_ttl: Option<Duration>,
}

impl DeviceRegistry {
    /// Registry expiring each device after its own advertised max-age.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a fixed session TTL instead of per-device max-age.
    ///
    /// Useful when no background refresh runs and stale advertisements
    /// should drop out faster than their (often 30 min) max-age.
    pub fn with_fixed_ttl(ttl: Duration) -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            fixed_ttl: Some(ttl),
        }
    }

    /// Inserts a new record, or refreshes the existing one for the same USN.
    ///
    /// On refresh the mutable fields (location, server, search target,
    /// max-age) are overwritten and `last_seen` advances; `first_seen` is
    /// kept from the first sighting.
    pub fn upsert(&self, record: DiscoveredDevice) {
        let mut devices = self.devices.lock();
        match devices.get_mut(&record.usn) {
            Some(existing) => {
                trace!("SSDP registry refresh: {}", record.usn);
                existing.location = record.location;
                existing.server = record.server;
                existing.search_target = record.search_target;
                existing.max_age = record.max_age;
                existing.last_seen = record.last_seen;
            }
            None => {
                debug!("SSDP registry insert: {} at {}", record.usn, record.location);
                devices.insert(record.usn.clone(), record);
            }
        }
    }

    /// Drops a device that announced `ssdp:byebye`.
    pub fn mark_byebye(&self, usn: &str) {
        if self.devices.lock().remove(usn).is_some() {
            debug!("SSDP registry byebye: {}", usn);
        }
    }

    /// Removes entries whose expiry window has elapsed at `now`.
    pub fn evict_expired(&self, now: SystemTime) {
        let fixed_ttl = self.fixed_ttl;
        let mut devices = self.devices.lock();
        devices.retain(|usn, dev| {
            let keep = !dev.is_expired(now, fixed_ttl);
            if !keep {
                debug!("SSDP registry evict: {}", usn);
            }
            keep
        });
    }

    /// Current non-expired records, most recently seen first.
    ///
    /// Ties on `last_seen` are broken by USN so iteration order is
    /// deterministic.
    pub fn snapshot(&self) -> Vec<DiscoveredDevice> {
        let now = SystemTime::now();
        let fixed_ttl = self.fixed_ttl;
        let devices = self.devices.lock();
        let mut out: Vec<DiscoveredDevice> = devices
            .values()
            .filter(|dev| !dev.is_expired(now, fixed_ttl))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.last_seen
                .cmp(&a.last_seen)
                .then_with(|| a.usn.cmp(&b.usn))
        });
        out
    }

    /// Looks up one record by USN.
    pub fn get(&self, usn: &str) -> Option<DiscoveredDevice> {
        self.devices.lock().get(usn).cloned()
    }

    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }
}
