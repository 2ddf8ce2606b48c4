//! Session state and map provenance

use std::fmt;

use serde::Serialize;

use crate::core_transport::PeerId;

/// Where an applied world map came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MapSource {
    /// Loaded from this device's saved map
    Local,
    Peer(PeerId),
}

impl MapSource {
    pub fn provider(&self) -> Option<PeerId> {
        match self {
            MapSource::Local => None,
            MapSource::Peer(peer) => Some(*peer),
        }
    }
}

impl fmt::Display for MapSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapSource::Local => write!(f, "local"),
            MapSource::Peer(peer) => write!(f, "peer {}", peer.short()),
        }
    }
}

/// Session lifecycle. `map_provider` only changes when a new map is
/// applied or the session is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SessionState {
    #[default]
    Idle,
    Relocalizing { pending_provider: Option<PeerId> },
    Tracking { map_provider: Option<PeerId> },
}

impl SessionState {
    pub fn is_relocalizing(&self) -> bool {
        matches!(self, SessionState::Relocalizing { .. })
    }

    /// Local anchors may be created in this state
    pub fn allows_local_anchors(&self) -> bool {
        !self.is_relocalizing()
    }

    /// Peer whose map we are tracking against, if any
    pub fn map_provider(&self) -> Option<PeerId> {
        match self {
            SessionState::Tracking { map_provider } => *map_provider,
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Relocalizing { pending_provider: Some(peer) } => {
                write!(f, "relocalizing (map from {})", peer.short())
            }
            SessionState::Relocalizing { pending_provider: None } => {
                write!(f, "relocalizing (local map)")
            }
            SessionState::Tracking { map_provider: Some(peer) } => {
                write!(f, "tracking (map from {})", peer.short())
            }
            SessionState::Tracking { map_provider: None } => write!(f, "tracking"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_creation_rules() {
        let peer = PeerId::generate();
        assert!(SessionState::Idle.allows_local_anchors());
        assert!(SessionState::Tracking { map_provider: Some(peer) }.allows_local_anchors());
        assert!(!SessionState::Relocalizing { pending_provider: Some(peer) }.allows_local_anchors());
    }

    #[test]
    fn test_provider_only_when_tracking() {
        let peer = PeerId::generate();
        assert_eq!(SessionState::Relocalizing { pending_provider: Some(peer) }.map_provider(), None);
        assert_eq!(SessionState::Tracking { map_provider: Some(peer) }.map_provider(), Some(peer));
        assert_eq!(MapSource::Peer(peer).provider(), Some(peer));
        assert_eq!(MapSource::Local.provider(), None);
    }
}
