//! DIAL (Discovery and Launch) client layer on top of [`pmossdp`].
//!
//! Turns a discovered SSDP endpoint into a DIAL-addressable device by
//! fetching its UPnP description document, then drives the lifecycle of
//! named applications on that device over plain HTTP (DIAL 2.2 semantics:
//! launch, status, stop, hide).
//!
//! Per-service cast behavior lives with the callers; this crate passes
//! launch payloads through as opaque blobs and never interprets them.

mod app_client;
mod config;
mod description;
mod errors;

pub use app_client::{ApplicationInstance, ApplicationState, DialClient};
pub use config::DialConfig;
pub use description::{DescriptionResolver, DialDevice};
pub use errors::DialError;

/// DIAL protocol version implemented by this client.
pub const DIAL_VERSION: &str = "2.2";

/// Maximum launch payload size accepted by DIAL receivers (bytes).
pub const DIAL_MAX_PAYLOAD: usize = 4096;

/// Service type a DIAL device advertises in its description document.
pub const DIAL_SERVICE_TYPE: &str = "urn:dial-multiscreen-org:service:dial:1";
