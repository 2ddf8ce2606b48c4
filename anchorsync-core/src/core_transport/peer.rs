//! Peer identity as seen by the transport

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique id of a participating instance, generated once per process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub Uuid);

impl PeerId {
    pub fn generate() -> Self {
        PeerId(Uuid::new_v4())
    }

    /// First eight hex digits, for log lines and status text
    pub fn short(&self) -> String {
        let mut s = self.0.simple().to_string();
        s.truncate(8);
        s
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display name plus stable id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: PeerId,
    pub display_name: String,
}

impl PeerInfo {
    pub fn new(display_name: impl Into<String>) -> Self {
        PeerInfo {
            id: PeerId::generate(),
            display_name: display_name.into(),
        }
    }
}

impl fmt::Display for PeerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_ids_are_unique() {
        let a = PeerInfo::new("iPad");
        let b = PeerInfo::new("iPad");

        assert_ne!(a.id, b.id);
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_id() {
        let id = PeerId::generate();
        assert_eq!(id.short().len(), 8);
        assert!(id.to_string().replace('-', "").starts_with(&id.short()));
    }
}
