/*!
The pmossdp transport is a *control point* transport.
It must **not** bind to UDP port 1900.

Reason:

* An SSDP *server* (UPnP device mode) must listen on 0.0.0.0:1900 for M-SEARCH discovery.
* An SSDP *client* only needs to send M-SEARCH and receive unicast HTTP/200 replies.
* If both client and server bind on 1900 (even with SO_REUSEPORT) the kernel load-balances
  incoming datagrams between sockets. As a result, NOTIFY and HTTP/200 messages are lost
  randomly by the client.

Therefore:

* SSDP client → bind(0.0.0.0:0), use an ephemeral port, send M-SEARCH, receive replies.

The socket is acquired per search call and owned by the reader thread, so it
is released on every exit path, including timeout.
*/
//! Transport SSDP pour l'envoi des M-SEARCH et la réception des réponses

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, unbounded};
use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, trace, warn};

use crate::errors::SsdpError;
use crate::{SSDP_MULTICAST_ADDR, SSDP_PORT};

/// Maximum MX value allowed by SSDP.
const MX_CAP: u64 = 5;

/// Granularity of the receive loop; also bounds how late past the deadline
/// the reader thread can linger.
const READ_TICK: Duration = Duration::from_secs(1);

/// One datagram worth keeping: a unicast search response or a NOTIFY.
///
/// Headers are keyed by upper-cased name. No deduplication happens here;
/// that is the registry's job.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub from: SocketAddr,
    pub headers: HashMap<String, String>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_uppercase()).map(|s| s.as_str())
    }
}

/// Transport SSDP pour un control point.
///
/// Cloneable: the struct only carries configuration, the socket itself is
/// created per [`SsdpTransport::search`] call.
#[derive(Debug, Clone)]
pub struct SsdpTransport {
    target: SocketAddr,
    join_multicast: bool,
}

impl SsdpTransport {
    /// Transport aimed at the standard SSDP multicast group.
    pub fn new() -> Self {
        let target: SocketAddr = format!("{}:{}", SSDP_MULTICAST_ADDR, SSDP_PORT)
            .parse()
            .expect("SSDP multicast address is valid");
        Self {
            target,
            join_multicast: true,
        }
    }

    /// Transport aimed at a unicast address instead of the multicast group.
    ///
    /// Lets integration tests stand up a plain UDP responder on loopback;
    /// also usable against a known device that does not answer multicast.
    pub fn unicast(target: SocketAddr) -> Self {
        Self {
            target,
            join_multicast: false,
        }
    }

    /// Sends one M-SEARCH for `search_target` and listens for responses
    /// until `timeout` elapses.
    ///
    /// The returned sequence yields responses as they arrive and ends when
    /// the window closes. It is not restartable; a new call is a new network
    /// round. Malformed datagrams are skipped, duplicates pass through.
    pub fn search(
        &self,
        search_target: &str,
        timeout: Duration,
    ) -> Result<SearchResponses, SsdpError> {
        let socket = self.open_socket()?;

        let mx = timeout.as_secs().clamp(1, MX_CAP);
        let msg = format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: {}:{}\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: {}\r\n\
             ST: {}\r\n\
             USER-AGENT: pmossdp/{}\r\n\
             \r\n",
            SSDP_MULTICAST_ADDR,
            SSDP_PORT,
            mx,
            search_target,
            env!("CARGO_PKG_VERSION"),
        );

        socket.send_to(msg.as_bytes(), self.target)?;
        info!(
            "📤 M-SEARCH sent to {} (ST={}, MX={})",
            self.target, search_target, mx
        );

        let (tx, rx) = unbounded::<RawResponse>();
        let deadline = Instant::now() + timeout;

        // The thread owns the socket; dropping `tx` on exit ends the
        // sequence for the consumer.
        std::thread::spawn(move || {
            let mut buf = [0u8; 8192];
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let tick = (deadline - now).min(READ_TICK);
                if socket.set_read_timeout(Some(tick)).is_err() {
                    break;
                }
                match socket.recv_from(&mut buf) {
                    Ok((n, from)) => {
                        let data = String::from_utf8_lossy(&buf[..n]);
                        if let Some(response) = parse_datagram(&data, from) {
                            trace!("📥 SSDP response from {}", from);
                            if tx.send(response).is_err() {
                                // Consumer dropped the sequence early.
                                break;
                            }
                        }
                    }
                    Err(e)
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        continue;
                    }
                    Err(e) => {
                        warn!("❌ SSDP read error: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(SearchResponses { rx })
    }

    fn open_socket(&self) -> std::io::Result<UdpSocket> {
        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;

        let bind_addr: SocketAddr = "0.0.0.0:0".parse().unwrap();
        socket2.bind(&bind_addr.into())?;

        let socket: UdpSocket = socket2.into();
        socket.set_multicast_loop_v4(true)?; // utile en dev local

        if self.join_multicast {
            let group = SSDP_MULTICAST_ADDR.parse().unwrap();
            for iface in get_if_addrs::get_if_addrs()? {
                if let std::net::IpAddr::V4(ipv4) = iface.ip() {
                    if !ipv4.is_loopback() {
                        match socket.join_multicast_v4(&group, &ipv4) {
                            Ok(()) => {
                                debug!("SSDP: joined {} on {}", SSDP_MULTICAST_ADDR, ipv4);
                            }
                            Err(e) => {
                                warn!(
                                    "SSDP: failed to join {} on {}: {}",
                                    SSDP_MULTICAST_ADDR, ipv4, e
                                );
                            }
                        }
                    }
                }
            }
        }

        Ok(socket)
    }
}

impl Default for SsdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Lazy, finite sequence of responses from one search round.
pub struct SearchResponses {
    rx: Receiver<RawResponse>,
}

impl Iterator for SearchResponses {
    type Item = RawResponse;

    fn next(&mut self) -> Option<RawResponse> {
        // Blocks until the next response or until the reader thread exits
        // at the deadline and drops its sender.
        self.rx.recv().ok()
    }
}

/// Parses one datagram into a RawResponse, or None when it is not a message
/// a control point cares about. Failures here never fail the round.
fn parse_datagram(data: &str, from: SocketAddr) -> Option<RawResponse> {
    let mut lines = data.lines();
    let first_line = lines.next()?.trim();
    let upper = first_line.to_ascii_uppercase();

    if upper.starts_with("HTTP/") && upper.contains(" 200 ") {
        // Unicast M-SEARCH response
        Some(RawResponse {
            from,
            headers: parse_headers(lines),
        })
    } else if upper.starts_with("NOTIFY ") {
        // Multicast alive/byebye announcement
        Some(RawResponse {
            from,
            headers: parse_headers(lines),
        })
    } else if upper.starts_with("M-SEARCH ") {
        // Another control point querying; we are not a device, so we ignore.
        None
    } else {
        trace!("Unknown SSDP message from {}: {}", from, first_line);
        None
    }
}

fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();

        // Empty line marks end of headers
        if line.is_empty() {
            break;
        }

        // Split on first ':' only (values may contain ':')
        if let Some(colon_pos) = line.find(':') {
            let (name, value_with_colon) = line.split_at(colon_pos);
            let value = &value_with_colon[1..];

            let name = name.trim().to_ascii_uppercase();
            let value = value.trim().to_string();

            if !name.is_empty() && !value.is_empty() {
                headers.insert(name, value);
            } else {
                trace!("Skipping malformed header: '{}'", line);
            }
        } else {
            trace!("Skipping line without colon: '{}'", line);
        }
    }
    headers
}

/// Parses `max-age=<n>` out of a CACHE-CONTROL value, falling back to the
/// SSDP default when absent or unparsable.
pub(crate) fn parse_max_age(value: Option<&str>) -> u32 {
    if let Some(v) = value {
        let lower = v.to_ascii_lowercase();
        if let Some(idx) = lower.find("max-age") {
            let after_key = &v[idx + 7..];
            let after_eq = after_key.trim_start().trim_start_matches('=').trim_start();
            let digits: String = after_eq
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(age) = digits.parse::<u32>() {
                return age;
            }
        }
        trace!(
            "Could not parse max-age from CACHE-CONTROL: '{}', using default {}",
            v,
            crate::DEFAULT_MAX_AGE
        );
    }
    crate::DEFAULT_MAX_AGE
}
