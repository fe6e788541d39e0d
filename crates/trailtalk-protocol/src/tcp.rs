//! TCP transport backend.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tracing::debug;

use crate::error::ProtocolError;
use crate::transport::{BoxedStream, Rendezvous, Transport};

/// TCP-backed transport.
///
/// Listens on the configured bind address and dials peers with a bounded
/// connect timeout.
pub struct TcpTransport {
    bind: SocketAddr,
    dial_timeout: Duration,
}

impl TcpTransport {
    pub fn new(bind: SocketAddr, dial_timeout: Duration) -> Self {
        Self { bind, dial_timeout }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn listen(&self) -> Result<Box<dyn Rendezvous>, ProtocolError> {
        let listener = TcpListener::bind(self.bind).await.map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => ProtocolError::PermissionDenied(e.to_string()),
            _ => ProtocolError::BindFailed(e.to_string()),
        })?;

        debug!(addr = %listener.local_addr()?, "rendezvous bound");
        Ok(Box::new(TcpRendezvous { listener }))
    }

    async fn connect(&self, addr: SocketAddr) -> Result<BoxedStream, ProtocolError> {
        let stream = tokio::time::timeout(self.dial_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::ConnectTimeout(self.dial_timeout))?
            .map_err(|e| ProtocolError::ConnectFailed(e.to_string()))?;

        let _ = stream.set_nodelay(true);
        debug!(remote = %addr, "connected to peer");
        Ok(Box::new(stream))
    }
}

struct TcpRendezvous {
    listener: TcpListener,
}

#[async_trait]
impl Rendezvous for TcpRendezvous {
    async fn accept(&mut self) -> Result<(BoxedStream, SocketAddr), ProtocolError> {
        let (stream, remote) = self.listener.accept().await?;
        let _ = stream.set_nodelay(true);
        debug!(remote = %remote, "accepted connection");
        Ok((Box::new(stream), remote))
    }

    fn local_addr(&self) -> Result<SocketAddr, ProtocolError> {
        Ok(self.listener.local_addr()?)
    }
}
