//! Transport layer and wire framing for trailtalk.
//!
//! This crate defines the seam to the underlying discoverable-socket
//! capability (the [`Transport`] and [`Rendezvous`] traits), a TCP backend,
//! and the newline-delimited text framing used by peer sessions.

pub mod error;
#[cfg(feature = "mock")]
pub mod mock;
pub mod tcp;
pub mod transport;
pub mod wire;

pub use error::ProtocolError;
pub use tcp::TcpTransport;
pub use transport::{BoxedStream, PeerStream, Rendezvous, Transport};
pub use wire::{MessageReceiver, MessageSender};
