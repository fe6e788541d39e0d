//! Shared types for trailtalk.
//!
//! This crate contains the types shared across the trailtalk workspace:
//! peer identity, the chat-channel message kinds, and the line-oriented
//! wire codec they travel in.

pub mod message;
pub mod peer;

pub use message::{ChatMessage, FRIEND_REQUEST_TAG, SERVICE_ID};
pub use peer::PeerId;
