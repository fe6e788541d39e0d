//! Peer link daemon for trailtalk.
//!
//! Implements the session manager for the peer-to-peer chat and
//! friend-request channel: peer directory refresh, the single-use inbound
//! rendezvous, outbound dialing with supersession, and the single live
//! session with its receive loop.

pub mod config;
pub mod daemon;
pub mod error;
pub mod session;
pub mod setup;
pub mod state;

pub use config::Config;
pub use daemon::{Command, Daemon, DaemonEvent, DaemonStatus, LinkEvent, LinkHandle};
pub use error::DaemonError;
pub use session::Session;
pub use state::LinkPhase;
