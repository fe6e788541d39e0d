//! Daemon errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("daemon not running")]
    NotRunning,

    #[error("protocol error: {0}")]
    Protocol(#[from] trailtalk_protocol::ProtocolError),

    #[error("discovery error: {0}")]
    Discovery(#[from] trailtalk_discovery::DiscoveryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
