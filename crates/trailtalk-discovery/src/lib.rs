//! Zero-config discovery of trailtalk peers.
//!
//! Defines the [`Discovery`] trait for advertising the local endpoint and
//! browsing for other peers of this application, plus the mdns-sd backend.

use std::net::SocketAddr;

use async_trait::async_trait;
use trailtalk_types::PeerId;

pub mod error;
pub mod mdns;
#[cfg(feature = "mock")]
pub mod mock;

pub use error::DiscoveryError;
pub use mdns::MdnsDiscovery;

/// A reachable peer: previously bonded or discovered on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Peer identifier.
    pub id: PeerId,
    /// Human-readable name.
    pub name: String,
    /// Network address (host:port) of the peer's rendezvous point.
    pub address: SocketAddr,
}

/// Network discovery for trailtalk peers.
#[async_trait]
pub trait Discovery: Send + Sync + 'static {
    /// Start advertising this endpoint on the network.
    async fn advertise(
        &mut self,
        peer_id: PeerId,
        name: &str,
        port: u16,
    ) -> Result<(), DiscoveryError>;

    /// Stop advertising.
    async fn stop_advertising(&mut self) -> Result<(), DiscoveryError>;

    /// Start browsing for peers, sending discoveries to the returned receiver.
    async fn browse(
        &mut self,
    ) -> Result<tokio::sync::mpsc::Receiver<DiscoveryEvent>, DiscoveryError>;

    /// Stop browsing.
    async fn stop_browsing(&mut self) -> Result<(), DiscoveryError>;
}

/// Events from the discovery subsystem.
#[derive(Debug, Clone)]
pub enum DiscoveryEvent {
    /// A new peer was found.
    PeerFound(Peer),
    /// A previously known peer disappeared.
    PeerLost(PeerId),
}
