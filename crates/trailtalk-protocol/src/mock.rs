//! Mock transport backend for testing.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

use crate::error::ProtocolError;
use crate::transport::{BoxedStream, Rendezvous, Transport};

/// Scripted outcome for a dial to a given address.
#[derive(Debug, Clone, Copy)]
pub enum MockConnect {
    /// The dial succeeds; the far end of the stream is retained for the
    /// test to drive via [`MockTransportHandle::take_remote`].
    Accept,
    /// The dial fails immediately.
    Refuse,
    /// The dial never completes. Used to exercise supersession.
    Hang,
}

#[derive(Default)]
struct MockState {
    scripts: HashMap<SocketAddr, MockConnect>,
    remotes: HashMap<SocketAddr, DuplexStream>,
    inbound_tx: Option<mpsc::Sender<(BoxedStream, SocketAddr)>>,
    listen_count: u32,
}

/// In-memory transport with scriptable dial outcomes and injectable
/// inbound connections.
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a mock transport and a handle for scripting it from tests.
    pub fn new() -> (Self, MockTransportHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        let handle = MockTransportHandle {
            state: Arc::clone(&state),
        };
        (Self { state }, handle)
    }
}

/// Clonable scripting and observation handle for [`MockTransport`].
#[derive(Clone)]
pub struct MockTransportHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransportHandle {
    /// Script the outcome of the next dial to `addr`.
    pub fn on_connect(&self, addr: SocketAddr, behavior: MockConnect) {
        self.state.lock().unwrap().scripts.insert(addr, behavior);
    }

    /// Take the far end of an accepted dial to `addr`.
    pub fn take_remote(&self, addr: SocketAddr) -> Option<DuplexStream> {
        self.state.lock().unwrap().remotes.remove(&addr)
    }

    /// Push an inbound connection through the current rendezvous.
    ///
    /// Returns the far end of the stream, or `None` if no rendezvous is
    /// accepting (never listened, already used, or cancelled).
    pub async fn inject_inbound(&self, remote: SocketAddr) -> Option<DuplexStream> {
        let tx = self.state.lock().unwrap().inbound_tx.clone()?;
        let (near, far) = tokio::io::duplex(64 * 1024);
        let near: BoxedStream = Box::new(near);
        tx.send((near, remote)).await.ok()?;
        Some(far)
    }

    /// Number of times `listen()` was called.
    pub fn listen_count(&self) -> u32 {
        self.state.lock().unwrap().listen_count
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn listen(&self) -> Result<Box<dyn Rendezvous>, ProtocolError> {
        let (tx, rx) = mpsc::channel(8);
        let mut state = self.state.lock().unwrap();
        state.inbound_tx = Some(tx);
        state.listen_count += 1;
        Ok(Box::new(MockRendezvous { rx }))
    }

    async fn connect(&self, addr: SocketAddr) -> Result<BoxedStream, ProtocolError> {
        let behavior = self.state.lock().unwrap().scripts.get(&addr).copied();
        match behavior {
            Some(MockConnect::Accept) => {
                let (near, far) = tokio::io::duplex(64 * 1024);
                self.state.lock().unwrap().remotes.insert(addr, far);
                Ok(Box::new(near))
            }
            Some(MockConnect::Hang) => std::future::pending().await,
            Some(MockConnect::Refuse) | None => {
                Err(ProtocolError::ConnectFailed("connection refused".to_string()))
            }
        }
    }
}

struct MockRendezvous {
    rx: mpsc::Receiver<(BoxedStream, SocketAddr)>,
}

#[async_trait]
impl Rendezvous for MockRendezvous {
    async fn accept(&mut self) -> Result<(BoxedStream, SocketAddr), ProtocolError> {
        self.rx.recv().await.ok_or(ProtocolError::StreamClosed)
    }

    fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
    }
}
