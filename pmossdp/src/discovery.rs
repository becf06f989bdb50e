//! Orchestration d'un round de découverte DIAL complet.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crossbeam_channel::{Sender, bounded};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::device::DiscoveredDevice;
use crate::errors::SsdpError;
use crate::registry::DeviceRegistry;
use crate::transport::{RawResponse, SsdpTransport, parse_max_age};
use crate::DIAL_SEARCH_TARGET;

/// Tuning knobs for discovery, deserializable from the host application's
/// settings. Every field has a default so an empty mapping is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Listen window of one discovery round, in seconds.
    pub timeout_secs: u64,
    /// Fixed registry TTL in seconds, overriding per-device max-age.
    /// Leave unset to trust the devices' advertised max-age.
    pub fixed_ttl_secs: Option<u64>,
    /// Interval between background re-discovery rounds, in seconds.
    pub watcher_interval_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            fixed_ttl_secs: None,
            // max-age/2, like the periodic announcements on the server side
            watcher_interval_secs: (crate::DEFAULT_MAX_AGE / 2) as u64,
        }
    }
}

/// Runs discovery rounds for the DIAL search target and keeps the shared
/// [`DeviceRegistry`] up to date.
pub struct DiscoveryEngine {
    transport: SsdpTransport,
    registry: Arc<DeviceRegistry>,
    config: DiscoveryConfig,
}

impl DiscoveryEngine {
    pub fn new(transport: SsdpTransport, config: DiscoveryConfig) -> Self {
        let registry = match config.fixed_ttl_secs {
            Some(secs) => Arc::new(DeviceRegistry::with_fixed_ttl(Duration::from_secs(secs))),
            None => Arc::new(DeviceRegistry::new()),
        };
        Self::with_registry(transport, registry, config)
    }

    /// Engine feeding an existing registry, e.g. one shared with another
    /// engine instance or pre-populated by the host.
    pub fn with_registry(
        transport: SsdpTransport,
        registry: Arc<DeviceRegistry>,
        config: DiscoveryConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            config,
        }
    }

    /// The registry this engine populates. Shared with the watcher and with
    /// any caller that wants to read between rounds.
    pub fn registry(&self) -> Arc<DeviceRegistry> {
        Arc::clone(&self.registry)
    }

    /// Runs one discovery round and returns the devices advertising the
    /// DIAL service, most recently seen first.
    ///
    /// Responses are handled while the listen window is still open, so a
    /// slow device answering late in the window does not delay handling of
    /// earlier ones. Zero devices is a valid, non-error outcome. There are
    /// no retries inside a round; discovery over UDP is best-effort and
    /// callers simply call `discover` again.
    pub fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>, SsdpError> {
        self.registry.evict_expired(SystemTime::now());

        let responses = self.transport.search(DIAL_SEARCH_TARGET, timeout)?;
        let mut handled = 0usize;
        for response in responses {
            self.handle_response(response);
            handled += 1;
        }

        let snapshot = self.registry.snapshot();
        info!(
            "✅ DIAL discovery round done: {} datagrams handled, {} devices known",
            handled,
            snapshot.len()
        );
        Ok(snapshot)
    }

    /// One round with the configured window.
    pub fn discover_default(&self) -> Result<Vec<DiscoveredDevice>, SsdpError> {
        self.discover(Duration::from_secs(self.config.timeout_secs))
    }

    fn handle_response(&self, response: RawResponse) {
        // byebye announcements drop the device immediately; everything else
        // that lacks the required headers is discarded without failing the
        // round.
        if let Some(nts) = response.header("NTS") {
            if nts.eq_ignore_ascii_case("ssdp:byebye") {
                if let Some(usn) = response.header("USN") {
                    self.registry.mark_byebye(usn);
                }
                return;
            }
        }

        let Some(usn) = response.header("USN") else {
            trace!("SSDP response from {} missing USN, ignoring", response.from);
            return;
        };
        let Some(location) = response.header("LOCATION") else {
            trace!(
                "SSDP response from {} missing LOCATION, ignoring",
                response.from
            );
            return;
        };
        // ST on search responses, NT on alive notifications
        let Some(st) = response.header("ST").or_else(|| response.header("NT")) else {
            trace!("SSDP response from {} missing ST/NT, ignoring", response.from);
            return;
        };

        if !st.eq_ignore_ascii_case(DIAL_SEARCH_TARGET) {
            // Some devices answer broader searches than asked.
            trace!(
                "SSDP response from {} for foreign target {}, ignoring",
                response.from, st
            );
            return;
        }

        if url::Url::parse(location).is_err() {
            trace!(
                "SSDP response from {} with unusable LOCATION '{}', ignoring",
                response.from, location
            );
            return;
        }

        let server = response.header("SERVER").unwrap_or("Unknown").to_string();
        let max_age = parse_max_age(response.header("CACHE-CONTROL"));

        debug!(
            "DIAL device response: usn={} location={} max_age={}",
            usn, location, max_age
        );
        self.registry.upsert(DiscoveredDevice::new(
            usn.to_string(),
            location.to_string(),
            server,
            st.to_string(),
            max_age,
        ));
    }

    /// Spawns a background thread repeating `discover` at the configured
    /// interval, sharing only the synchronized registry with ad-hoc rounds.
    ///
    /// The watcher stops when the handle is dropped or [`DiscoveryWatcher::stop`]
    /// is called.
    pub fn spawn_watcher(&self) -> DiscoveryWatcher {
        let engine = DiscoveryEngine {
            transport: self.transport.clone(),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        };
        let interval = Duration::from_secs(self.config.watcher_interval_secs.max(1));
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = std::thread::spawn(move || {
            info!("SSDP watcher started (interval {:?})", interval);
            loop {
                match stop_rx.recv_timeout(interval) {
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                        if let Err(e) = engine.discover_default() {
                            warn!("❌ Background discovery round failed: {}", e);
                        }
                    }
                    // Stop requested, or every handle gone
                    _ => break,
                }
            }
            info!("SSDP watcher stopped");
        });

        DiscoveryWatcher {
            stop_tx,
            handle: Some(handle),
        }
    }
}

/// Handle on the background re-discovery thread.
pub struct DiscoveryWatcher {
    stop_tx: Sender<()>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl DiscoveryWatcher {
    /// Stops the watcher and waits for the thread to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DiscoveryWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
