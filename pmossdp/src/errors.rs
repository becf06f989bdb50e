use thiserror::Error;

/// Errors surfaced by the SSDP layer.
///
/// Only socket-level failures abort a discovery round. Malformed or
/// irrelevant datagrams are dropped where they are read, because discovery
/// has to tolerate a noisy network.
#[derive(Error, Debug)]
pub enum SsdpError {
    #[error("SSDP socket error: {0}")]
    Io(#[from] std::io::Error),
}
