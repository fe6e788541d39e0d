//! Mock discovery backend for testing.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use trailtalk_types::PeerId;

use crate::error::DiscoveryError;
use crate::{Discovery, DiscoveryEvent, Peer};

#[derive(Default)]
struct MockDiscoveryState {
    advertised: Option<(PeerId, String, u16)>,
    browsing: bool,
    feed_tx: Option<mpsc::Sender<DiscoveryEvent>>,
}

/// Mock discovery backend.
///
/// Tests announce peers through the handle and observe what the daemon
/// advertised. The `denying` constructor models a capability with the
/// discovery permission not granted.
pub struct MockDiscovery {
    state: Arc<Mutex<MockDiscoveryState>>,
    deny: bool,
}

impl MockDiscovery {
    /// Create a mock discovery backend and its observer handle.
    pub fn new() -> (Self, MockDiscoveryHandle) {
        Self::with_denial(false)
    }

    /// Create a backend whose every operation fails with `PermissionDenied`.
    pub fn denying() -> (Self, MockDiscoveryHandle) {
        Self::with_denial(true)
    }

    fn with_denial(deny: bool) -> (Self, MockDiscoveryHandle) {
        let state = Arc::new(Mutex::new(MockDiscoveryState::default()));
        let handle = MockDiscoveryHandle {
            state: Arc::clone(&state),
        };
        (Self { state, deny }, handle)
    }
}

/// Clonable observer and injection handle for [`MockDiscovery`].
#[derive(Clone)]
pub struct MockDiscoveryHandle {
    state: Arc<Mutex<MockDiscoveryState>>,
}

impl MockDiscoveryHandle {
    /// What the daemon advertised, if anything.
    pub fn advertised(&self) -> Option<(PeerId, String, u16)> {
        self.state.lock().unwrap().advertised.clone()
    }

    /// Whether a browse is active.
    pub fn is_browsing(&self) -> bool {
        self.state.lock().unwrap().browsing
    }

    /// Announce a discovered peer. Returns false if no browse is active.
    pub async fn announce(&self, peer: Peer) -> bool {
        let tx = self.state.lock().unwrap().feed_tx.clone();
        match tx {
            Some(tx) => tx.send(DiscoveryEvent::PeerFound(peer)).await.is_ok(),
            None => false,
        }
    }

    /// Report a peer as lost. Returns false if no browse is active.
    pub async fn remove(&self, id: PeerId) -> bool {
        let tx = self.state.lock().unwrap().feed_tx.clone();
        match tx {
            Some(tx) => tx.send(DiscoveryEvent::PeerLost(id)).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Discovery for MockDiscovery {
    async fn advertise(
        &mut self,
        peer_id: PeerId,
        name: &str,
        port: u16,
    ) -> Result<(), DiscoveryError> {
        if self.deny {
            return Err(DiscoveryError::PermissionDenied);
        }
        self.state.lock().unwrap().advertised = Some((peer_id, name.to_string(), port));
        Ok(())
    }

    async fn stop_advertising(&mut self) -> Result<(), DiscoveryError> {
        self.state.lock().unwrap().advertised = None;
        Ok(())
    }

    async fn browse(&mut self) -> Result<mpsc::Receiver<DiscoveryEvent>, DiscoveryError> {
        if self.deny {
            return Err(DiscoveryError::PermissionDenied);
        }
        let (tx, rx) = mpsc::channel(64);
        let mut state = self.state.lock().unwrap();
        state.feed_tx = Some(tx);
        state.browsing = true;
        Ok(rx)
    }

    async fn stop_browsing(&mut self) -> Result<(), DiscoveryError> {
        let mut state = self.state.lock().unwrap();
        state.browsing = false;
        state.feed_tx = None;
        Ok(())
    }
}
