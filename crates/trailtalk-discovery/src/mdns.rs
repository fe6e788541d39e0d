//! mdns-sd discovery backend.

use std::collections::HashMap;
use std::net::SocketAddr;

use async_trait::async_trait;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use tokio::sync::mpsc;
use tracing::{debug, info};

use trailtalk_types::{PeerId, SERVICE_ID};

use crate::error::DiscoveryError;
use crate::{Discovery, DiscoveryEvent, Peer};

/// DNS-SD service type under which trailtalk endpoints advertise.
pub const SERVICE_TYPE: &str = "_trailtalk._tcp.local.";

/// mDNS/DNS-SD backend over the mdns-sd service daemon.
pub struct MdnsDiscovery {
    daemon: ServiceDaemon,
    registered: Option<String>,
    browse_task: Option<tokio::task::JoinHandle<()>>,
}

impl MdnsDiscovery {
    pub fn new() -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(|e| registration_error(&e))?;
        Ok(Self {
            daemon,
            registered: None,
            browse_task: None,
        })
    }
}

#[async_trait]
impl Discovery for MdnsDiscovery {
    async fn advertise(
        &mut self,
        peer_id: PeerId,
        name: &str,
        port: u16,
    ) -> Result<(), DiscoveryError> {
        let instance = peer_id.to_string();
        let host = format!("{instance}.local.");
        let id = peer_id.to_string();
        let svc = SERVICE_ID.to_string();
        let props = [("id", id.as_str()), ("name", name), ("svc", svc.as_str())];

        let service = ServiceInfo::new(SERVICE_TYPE, &instance, &host, "", port, &props[..])
            .map_err(|e| registration_error(&e))?
            .enable_addr_auto();

        self.daemon
            .register(service)
            .map_err(|e| registration_error(&e))?;
        self.registered = Some(format!("{instance}.{SERVICE_TYPE}"));

        info!(name, port, "advertising endpoint");
        Ok(())
    }

    async fn stop_advertising(&mut self) -> Result<(), DiscoveryError> {
        if let Some(fullname) = self.registered.take() {
            let _ = self
                .daemon
                .unregister(&fullname)
                .map_err(|e| registration_error(&e))?;
            debug!("stopped advertising");
        }
        Ok(())
    }

    async fn browse(&mut self) -> Result<mpsc::Receiver<DiscoveryEvent>, DiscoveryError> {
        let receiver = self
            .daemon
            .browse(SERVICE_TYPE)
            .map_err(|e| DiscoveryError::Browse(e.to_string()))?;

        let (tx, rx) = mpsc::channel(64);
        let task = tokio::spawn(async move {
            // Fullname of each resolved service, for PeerLost mapping.
            let mut names: HashMap<String, PeerId> = HashMap::new();
            while let Ok(event) = receiver.recv_async().await {
                match event {
                    ServiceEvent::ServiceResolved(service) => {
                        let Some(peer) = peer_from_service(&service) else {
                            continue;
                        };
                        debug!(peer = %peer.name, addr = %peer.address, "resolved peer");
                        names.insert(service.get_fullname().to_string(), peer.id);
                        if tx.send(DiscoveryEvent::PeerFound(peer)).await.is_err() {
                            break;
                        }
                    }
                    ServiceEvent::ServiceRemoved(_ty, fullname) => {
                        if let Some(id) = names.remove(&fullname) {
                            if tx.send(DiscoveryEvent::PeerLost(id)).await.is_err() {
                                break;
                            }
                        }
                    }
                    _ => {}
                }
            }
        });
        self.browse_task = Some(task);

        info!("browsing for peers");
        Ok(rx)
    }

    async fn stop_browsing(&mut self) -> Result<(), DiscoveryError> {
        let Some(task) = self.browse_task.take() else {
            return Ok(());
        };
        task.abort();
        self.daemon
            .stop_browse(SERVICE_TYPE)
            .map_err(|e| DiscoveryError::Browse(e.to_string()))?;
        debug!("stopped browsing");
        Ok(())
    }
}

impl Drop for MdnsDiscovery {
    fn drop(&mut self) {
        let _ = self.daemon.shutdown();
    }
}

/// Convert a resolved DNS-SD service into a peer handle.
///
/// Services without this application's `svc` marker, or without a parseable
/// peer ID or address, are ignored.
fn peer_from_service(service: &ServiceInfo) -> Option<Peer> {
    let svc = service.get_property_val_str("svc")?;
    if svc != SERVICE_ID.to_string() {
        return None;
    }

    let id: PeerId = service.get_property_val_str("id")?.parse().ok()?;
    let name = service
        .get_property_val_str("name")
        .unwrap_or_default()
        .to_string();

    let ip = service
        .get_addresses()
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| service.get_addresses().iter().next())
        .copied()?;

    Some(Peer {
        id,
        name,
        address: SocketAddr::new(ip, service.get_port()),
    })
}

fn registration_error(e: &mdns_sd::Error) -> DiscoveryError {
    let msg = e.to_string();
    if msg.to_ascii_lowercase().contains("permission denied") {
        DiscoveryError::PermissionDenied
    } else {
        DiscoveryError::Registration(msg)
    }
}
