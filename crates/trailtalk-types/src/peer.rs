//! Peer identity types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a peer endpoint in the trailtalk network.
///
/// Wraps a UUID v4. Persisted across runs so a peer keeps its identity
/// between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(Uuid);

impl PeerId {
    /// Generate a new random peer ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a peer ID from an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PeerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PeerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_id_unique() {
        let a = PeerId::new();
        let b = PeerId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn peer_id_display() {
        let id = PeerId::new();
        let s = id.to_string();
        // UUID v4 format: 8-4-4-4-12
        assert_eq!(s.len(), 36);
    }

    #[test]
    fn peer_id_parse_roundtrip() {
        let id = PeerId::new();
        let parsed: PeerId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn peer_id_serde_roundtrip() {
        let id = PeerId::new();
        let json = serde_json::to_string(&id).unwrap();
        let decoded: PeerId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, decoded);
    }
}
