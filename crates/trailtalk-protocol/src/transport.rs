//! Transport seam: listen, accept, and dial.
//!
//! The underlying discoverable-socket capability is modelled as a
//! [`Transport`] that can open a single-use server-side [`Rendezvous`]
//! point and dial out to a peer's address, both yielding a plain duplex
//! byte stream.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::ProtocolError;

/// A duplex byte stream to a remote peer.
pub trait PeerStream: AsyncRead + AsyncWrite + Send + Sync + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Sync + Unpin> PeerStream for T {}

/// Boxed peer stream, as handed from a transport backend to the session.
pub type BoxedStream = Box<dyn PeerStream>;

/// Server-side rendezvous point peers connect to.
///
/// Single-use: accept one inbound connection, then discard. Dropping the
/// rendezvous closes the endpoint and unblocks a pending accept.
#[async_trait]
pub trait Rendezvous: Send {
    /// Block until one inbound connection arrives.
    async fn accept(&mut self) -> Result<(BoxedStream, SocketAddr), ProtocolError>;

    /// The local address the rendezvous is bound to.
    fn local_addr(&self) -> Result<SocketAddr, ProtocolError>;
}

/// Capability for opening the rendezvous point and dialing peers.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Bind a fresh rendezvous point.
    async fn listen(&self) -> Result<Box<dyn Rendezvous>, ProtocolError>;

    /// Open an outbound connection to a peer.
    async fn connect(&self, addr: SocketAddr) -> Result<BoxedStream, ProtocolError>;
}
