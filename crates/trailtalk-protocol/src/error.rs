//! Transport and framing errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("bind failed: {0}")]
    BindFailed(String),

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("frame of {len} bytes exceeds maximum {max}")]
    FrameTooLong { len: usize, max: usize },

    #[error("stream closed unexpectedly")]
    StreamClosed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
