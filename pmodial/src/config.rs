use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for the DIAL HTTP exchanges, deserializable from the host
/// application's settings. Every field has a default so an empty mapping is
/// valid.
///
/// Retry behavior is configuration rather than a built-in constant: some
/// receivers report 503 for a second or two while a previous app winds
/// down, and how long to insist is a host policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialConfig {
    /// Per-call HTTP timeout, in seconds. Bounds every exchange; a timeout
    /// closes the connection and surfaces as an unreachable-device error.
    pub http_timeout_secs: u64,
    /// Extra launch attempts when the device answers 503 Service Unavailable.
    pub busy_retries: u32,
    /// Delay between those attempts, in milliseconds.
    pub retry_delay_ms: u64,
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 10,
            busy_retries: 0,
            retry_delay_ms: 500,
        }
    }
}

impl DialConfig {
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}
