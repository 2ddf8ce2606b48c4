//! Session events
//!
//! Everything a UI needs to reflect the session, fanned out to any number
//! of subscribers over a tokio broadcast channel.

use tokio::sync::broadcast;

use super::anchors::AnchorOrigin;
use super::reconciler::AnchorVerdict;
use super::state::{MapSource, SessionState};
use crate::core_codec::SpatialAnchor;
use crate::core_transport::{PeerId, PeerInfo};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    /// Whether the sketch action should be enabled
    SketchAvailability(bool),
    /// Whether saving the experience is currently possible
    SaveAvailability(bool),
    /// "Mapping: ...\nTracking: ..." after every tracking update
    StatusText(String),
    /// Session info line (interruptions, failures, listening address)
    Message(String),
    AnchorAdded {
        anchor: SpatialAnchor,
        origin: AnchorOrigin,
    },
    AnchorDropped {
        from: PeerId,
        name: String,
        reason: AnchorVerdict,
    },
    AnchorsCleared,
    MapApplied {
        source: MapSource,
        anchors: usize,
    },
    ExperienceSaved {
        anchors: usize,
        size: usize,
    },
    WorldMapShared {
        peers: usize,
        size: usize,
    },
    PeerJoined(PeerInfo),
    PeerLeft(PeerId),
    Alert {
        title: String,
        message: String,
    },
    /// The session stopped and will not accept further commands
    Fatal(String),
}

/// Fan-out of session events
#[derive(Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns the number of subscribers that received the event
    pub fn emit(&self, event: SessionEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn alert(&self, title: impl Into<String>, message: impl Into<String>) {
        self.emit(SessionEvent::Alert {
            title: title.into(),
            message: message.into(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_without_subscribers() {
        let events = SessionEvents::new(8);
        assert_eq!(events.emit(SessionEvent::AnchorsCleared), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let events = SessionEvents::new(8);
        let mut first = events.subscribe();
        let mut second = events.subscribe();

        assert_eq!(events.emit(SessionEvent::SketchAvailability(false)), 2);
        assert_eq!(first.recv().await.unwrap(), SessionEvent::SketchAvailability(false));
        assert_eq!(second.recv().await.unwrap(), SessionEvent::SketchAvailability(false));
    }
}
