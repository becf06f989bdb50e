//! # pmossdp - SSDP control point
//!
//! Ce crate implémente la partie *control point* du protocole SSDP
//! (Simple Service Discovery Protocol) : envoi de M-SEARCH en multicast,
//! réception des réponses unicast et gestion d'un registre de devices.
//!
//! ## Fonctionnalités
//!
//! - ✅ Envoi de M-SEARCH en multicast avec fenêtre d'écoute bornée
//! - ✅ Parsing tolérant des réponses et des NOTIFY alive/byebye
//! - ✅ Registre dédupliqué et expirant, clé = USN
//! - ✅ Rounds de découverte répétés en tâche de fond (watcher)
//!
//! ## Architecture
//!
//! - [`SsdpTransport`] : socket UDP éphémère, une acquisition par recherche
//! - [`DeviceRegistry`] : cache partagé des [`DiscoveredDevice`]
//! - [`DiscoveryEngine`] : orchestre un round de découverte complet
//!
//! The crate never binds UDP port 1900: a control point only needs an
//! ephemeral port to send M-SEARCH and receive the unicast replies. Binding
//! 1900 next to a device-mode server makes the kernel load-balance datagrams
//! between the two sockets and messages get lost randomly.

mod device;
mod discovery;
mod errors;
mod registry;
mod transport;

pub use device::DiscoveredDevice;
pub use discovery::{DiscoveryConfig, DiscoveryEngine, DiscoveryWatcher};
pub use errors::SsdpError;
pub use registry::DeviceRegistry;
pub use transport::{RawResponse, SearchResponses, SsdpTransport};

/// Adresse multicast SSDP
pub const SSDP_MULTICAST_ADDR: &str = "239.255.255.250";

/// Port SSDP
pub const SSDP_PORT: u16 = 1900;

/// Durée de validité par défaut des annonces (en secondes)
pub const DEFAULT_MAX_AGE: u32 = 1800;

/// Search target des devices DIAL (DIAL 2.2, unchanged since 1.7)
pub const DIAL_SEARCH_TARGET: &str = "urn:dial-multiscreen-org:service:dial:1";
