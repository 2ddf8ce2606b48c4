/*
  Reconciler - the session state machine

  Pure state and transitions, no I/O. The session actor owns one Reconciler
  and performs whatever side effects a transition calls for (tracking
  calls, broadcasts, events).

  Transitions:
    apply_map(source)                 any state  -> Relocalizing(source provider)
    update_tracking(normal + mature)  Relocalizing(p) -> Tracking(p)
    reset()                           any state  -> Idle

  Anchor rules:
    - local anchors are refused while relocalizing
    - peer anchors are dropped while relocalizing or while a world map is
      still being decoded, and are never forwarded

  Ordering:
    - every world map gets a sequence number when its decode starts; a
      decoded map older than the last one applied from the same source is
      stale and must not be applied
    - tracking statuses from a generation older than the current tracking
      run are ignored
*/

use std::collections::HashMap;

use super::anchors::{AnchorEntry, AnchorOrigin, AnchorSet};
use super::errors::SessionError;
use super::state::{MapSource, SessionState};
use crate::core_codec::{AnchorId, Point3, Snapshot, SpatialAnchor, Transform, WorldMap};
use crate::core_tracking::TrackingStatus;
use crate::core_transport::PeerId;

/// Outcome of a received anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorVerdict {
    Applied,
    Duplicate,
    DroppedRelocalizing,
    DroppedMapInFlight,
}

impl AnchorVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchorVerdict::Applied => "applied",
            AnchorVerdict::Duplicate => "duplicate",
            AnchorVerdict::DroppedRelocalizing => "relocalizing",
            AnchorVerdict::DroppedMapInFlight => "map_in_flight",
        }
    }
}

#[derive(Debug, Default)]
pub struct Reconciler {
    state: SessionState,
    anchors: AnchorSet,
    snapshot: Option<Snapshot>,
    tracking: TrackingStatus,
    tracking_generation: u64,
    maps_in_flight: usize,
    map_seq: u64,
    applied_map_seq: HashMap<MapSource, u64>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn anchors(&self) -> &AnchorSet {
        &self.anchors
    }

    pub fn tracking_status(&self) -> TrackingStatus {
        self.tracking
    }

    /// Snapshot of the map being relocalized against
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn maps_in_flight(&self) -> usize {
        self.maps_in_flight
    }

    /// Create a line anchor from `source` to `destination`
    pub fn create_local_anchor(
        &mut self,
        source: Point3,
        destination: Point3,
    ) -> Result<SpatialAnchor, SessionError> {
        if !self.state.allows_local_anchors() {
            return Err(SessionError::AnchorCreationSuppressed);
        }
        if !source.is_finite() || !destination.is_finite() {
            return Err(SessionError::InvalidAnchor(format!(
                "segment {} -> {} is not finite",
                source, destination
            )));
        }

        let name = self.anchors.next_local_name();
        let transform = Transform::from_translation(source.x, source.y, source.z);
        let anchor = SpatialAnchor::line(name, transform, source, destination);
        self.anchors.insert(anchor.clone(), AnchorOrigin::Local);
        Ok(anchor)
    }

    /// Decide what happens to an anchor received from `from`
    pub fn receive_anchor(&mut self, from: PeerId, anchor: SpatialAnchor) -> AnchorVerdict {
        if self.state.is_relocalizing() {
            return AnchorVerdict::DroppedRelocalizing;
        }
        if self.maps_in_flight > 0 {
            return AnchorVerdict::DroppedMapInFlight;
        }
        if self.anchors.insert(anchor, AnchorOrigin::Peer(from)) {
            AnchorVerdict::Applied
        } else {
            AnchorVerdict::Duplicate
        }
    }

    /// Count a map decode as in flight. Returns the map's sequence number.
    pub fn map_decode_started(&mut self) -> u64 {
        self.maps_in_flight += 1;
        self.map_seq += 1;
        self.map_seq
    }

    pub fn map_decode_finished(&mut self) {
        self.maps_in_flight = self.maps_in_flight.saturating_sub(1);
    }

    /// Claim the right to apply map `seq` from `source`. Returns false when
    /// a newer map from the same source has already been applied.
    pub fn claim_map(&mut self, source: MapSource, seq: u64) -> bool {
        let latest = self.applied_map_seq.entry(source).or_insert(0);
        if seq <= *latest {
            return false;
        }
        *latest = seq;
        true
    }

    /// Replace everything with `map` and start relocalizing against it.
    /// Returns the parts to hand to the tracking subsystem.
    pub fn apply_map(&mut self, source: MapSource, mut map: WorldMap) -> (Vec<u8>, Vec<SpatialAnchor>) {
        self.snapshot = map.take_snapshot();
        self.anchors.clear();
        for anchor in &map.anchors {
            self.anchors.insert(anchor.clone(), AnchorOrigin::Map);
        }
        self.state = SessionState::Relocalizing {
            pending_provider: source.provider(),
        };
        map.into_tracking_parts()
    }

    pub fn tracking_generation(&self) -> u64 {
        self.tracking_generation
    }

    /// Tracking run started by the last `run_with_map` or reset
    pub fn set_tracking_generation(&mut self, generation: u64) {
        self.tracking_generation = self.tracking_generation.max(generation);
    }

    /// Status belongs to a tracking run that has since been replaced
    pub fn is_stale(&self, generation: u64) -> bool {
        generation < self.tracking_generation
    }

    /// Record a tracking update from run `generation`. Returns the new
    /// state when it changed. Stale updates change nothing.
    pub fn update_tracking(&mut self, status: TrackingStatus, generation: u64) -> Option<SessionState> {
        if self.is_stale(generation) {
            return None;
        }
        self.tracking = status;

        match self.state {
            SessionState::Relocalizing { pending_provider } if status.is_relocalized() => {
                self.state = SessionState::Tracking {
                    map_provider: pending_provider,
                };
                self.snapshot = None;
                Some(self.state)
            }
            _ => None,
        }
    }

    /// Check that the session may save its map. Returns the id of the
    /// latest local anchor, which must also be in the tracking frame.
    pub fn check_save(&self) -> Result<Option<AnchorId>, SessionError> {
        if self.state.is_relocalizing() {
            return Err(SessionError::SaveUnavailable("still relocalizing".to_string()));
        }
        match self.tracking.mapping {
            Some(mapping) if mapping.is_mature() => {}
            mapping => {
                let description = mapping.map_or("Not Available", |m| m.description());
                return Err(SessionError::SaveUnavailable(format!(
                    "mapping is {}",
                    description
                )));
            }
        }
        Ok(self.anchors.last_local().map(|anchor| anchor.id))
    }

    /// Local anchors, for peers that join late
    pub fn replay_anchors(&self) -> Vec<SpatialAnchor> {
        self.anchors.local_anchors()
    }

    pub fn entries(&self) -> Vec<AnchorEntry> {
        self.anchors.iter().cloned().collect()
    }

    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.anchors.reset();
        self.snapshot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_tracking::{LimitedReason, TrackingState, WorldMappingStatus};

    fn normal_mapped() -> TrackingStatus {
        TrackingStatus::new(TrackingState::Normal, Some(WorldMappingStatus::Mapped))
    }

    fn peer_anchor(name: &str) -> SpatialAnchor {
        SpatialAnchor::line(
            name,
            Transform::IDENTITY,
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.1, 0.0, 0.0),
        )
    }

    fn map_with(anchors: Vec<SpatialAnchor>) -> WorldMap {
        WorldMap::new(vec![1, 2, 3], anchors).with_snapshot(Snapshot::new(vec![0xFF, 0xD8]))
    }

    #[test]
    fn test_local_anchor_names() {
        let mut reconciler = Reconciler::new();
        let a = reconciler
            .create_local_anchor(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0))
            .unwrap();
        let b = reconciler
            .create_local_anchor(Point3::new(1.0, 0.0, 0.0), Point3::new(2.0, 0.0, 0.0))
            .unwrap();

        assert_eq!(a.name, "virtualObject0");
        assert_eq!(b.name, "virtualObject1");
        assert_eq!(a.transform.position(), Point3::new(0.0, 0.0, 0.0));
        assert_eq!(a.segment(), Some((Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0))));
    }

    #[test]
    fn test_non_finite_segment_refused_without_using_a_name() {
        let mut reconciler = Reconciler::new();
        let result = reconciler.create_local_anchor(Point3::new(f32::NAN, 0.0, 0.0), Point3::default());
        assert!(matches!(result, Err(SessionError::InvalidAnchor(_))));

        let anchor = reconciler
            .create_local_anchor(Point3::default(), Point3::new(0.0, 1.0, 0.0))
            .unwrap();
        assert_eq!(anchor.name, "virtualObject0");
    }

    #[test]
    fn test_peer_map_then_relocalize() {
        let mut reconciler = Reconciler::new();
        let provider = PeerId::generate();

        let (tracking, anchors) = reconciler.apply_map(MapSource::Peer(provider), map_with(vec![peer_anchor("virtualObject0")]));
        assert_eq!(tracking, vec![1, 2, 3]);
        assert_eq!(anchors.len(), 1);
        assert!(reconciler.snapshot().is_some());
        assert_eq!(
            reconciler.state(),
            SessionState::Relocalizing {
                pending_provider: Some(provider)
            }
        );

        // Normal tracking without mapping info is not enough
        assert_eq!(reconciler.update_tracking(TrackingStatus::new(TrackingState::Normal, None), 0), None);

        let next = reconciler.update_tracking(normal_mapped(), 0);
        assert_eq!(
            next,
            Some(SessionState::Tracking {
                map_provider: Some(provider)
            })
        );
        assert!(reconciler.snapshot().is_none());

        // Further updates leave the provider alone
        assert_eq!(reconciler.update_tracking(normal_mapped(), 0), None);
        assert_eq!(reconciler.state().map_provider(), Some(provider));
    }

    #[test]
    fn test_apply_map_clears_previous_anchors() {
        let mut reconciler = Reconciler::new();
        reconciler
            .create_local_anchor(Point3::default(), Point3::new(0.0, 0.0, 1.0))
            .unwrap();

        let from_map = peer_anchor("virtualObject7");
        reconciler.apply_map(MapSource::Local, map_with(vec![from_map.clone()]));

        let entries = reconciler.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].anchor, from_map);
        assert_eq!(entries[0].origin, AnchorOrigin::Map);
        assert_eq!(
            reconciler.state(),
            SessionState::Relocalizing {
                pending_provider: None
            }
        );
    }

    #[test]
    fn test_anchor_dropped_while_relocalizing() {
        let mut reconciler = Reconciler::new();
        reconciler.apply_map(MapSource::Peer(PeerId::generate()), map_with(vec![]));

        let verdict = reconciler.receive_anchor(PeerId::generate(), peer_anchor("virtualObject0"));
        assert_eq!(verdict, AnchorVerdict::DroppedRelocalizing);
        assert!(reconciler.anchors().is_empty());

        let local = reconciler.create_local_anchor(Point3::default(), Point3::new(1.0, 1.0, 1.0));
        assert!(matches!(local, Err(SessionError::AnchorCreationSuppressed)));
    }

    #[test]
    fn test_anchor_dropped_while_map_decoding() {
        let mut reconciler = Reconciler::new();
        reconciler.map_decode_started();

        let verdict = reconciler.receive_anchor(PeerId::generate(), peer_anchor("virtualObject0"));
        assert_eq!(verdict, AnchorVerdict::DroppedMapInFlight);

        reconciler.map_decode_finished();
        let verdict = reconciler.receive_anchor(PeerId::generate(), peer_anchor("virtualObject0"));
        assert_eq!(verdict, AnchorVerdict::Applied);
    }

    #[test]
    fn test_status_from_previous_run_ignored() {
        let mut reconciler = Reconciler::new();
        let provider = PeerId::generate();

        reconciler.apply_map(MapSource::Peer(provider), map_with(vec![]));
        reconciler.set_tracking_generation(3);

        // Queued before the map was applied
        assert_eq!(reconciler.update_tracking(normal_mapped(), 2), None);
        assert!(reconciler.state().is_relocalizing());
        assert_eq!(reconciler.tracking_status(), TrackingStatus::default());

        let next = reconciler.update_tracking(normal_mapped(), 3);
        assert_eq!(
            next,
            Some(SessionState::Tracking {
                map_provider: Some(provider)
            })
        );
    }

    #[test]
    fn test_older_map_from_same_source_not_claimed() {
        let mut reconciler = Reconciler::new();
        let peer = MapSource::Peer(PeerId::generate());
        let other = MapSource::Peer(PeerId::generate());

        let first = reconciler.map_decode_started();
        let second = reconciler.map_decode_started();
        let third = reconciler.map_decode_started();

        // The second map finished decoding first
        assert!(reconciler.claim_map(peer, second));
        assert!(!reconciler.claim_map(peer, first));
        // Sources are ordered independently
        assert!(reconciler.claim_map(other, first));
        assert!(reconciler.claim_map(peer, third));
        assert!(!reconciler.claim_map(peer, third));
    }

    #[test]
    fn test_duplicate_anchor_id() {
        let mut reconciler = Reconciler::new();
        let anchor = peer_anchor("virtualObject0");
        let from = PeerId::generate();

        assert_eq!(reconciler.receive_anchor(from, anchor.clone()), AnchorVerdict::Applied);
        assert_eq!(reconciler.receive_anchor(from, anchor), AnchorVerdict::Duplicate);
    }

    #[test]
    fn test_save_gating() {
        let mut reconciler = Reconciler::new();
        assert!(matches!(reconciler.check_save(), Err(SessionError::SaveUnavailable(_))));

        reconciler.update_tracking(
            TrackingStatus::new(TrackingState::Normal, Some(WorldMappingStatus::Limited)),
            0,
        );
        assert!(reconciler.check_save().is_err());

        reconciler.update_tracking(
            TrackingStatus::new(
                TrackingState::Limited(LimitedReason::ExcessiveMotion),
                Some(WorldMappingStatus::Extending),
            ),
            0,
        );
        assert_eq!(reconciler.check_save().unwrap(), None);

        let anchor = reconciler
            .create_local_anchor(Point3::default(), Point3::new(0.0, 0.5, 0.0))
            .unwrap();
        assert_eq!(reconciler.check_save().unwrap(), Some(anchor.id));

        reconciler.apply_map(MapSource::Local, map_with(vec![]));
        reconciler.update_tracking(normal_mapped(), 0);
        reconciler.map_decode_started();
        assert!(reconciler.check_save().is_ok());
    }

    #[test]
    fn test_replay_only_local_anchors() {
        let mut reconciler = Reconciler::new();
        let local = reconciler
            .create_local_anchor(Point3::default(), Point3::new(0.0, 0.0, 0.2))
            .unwrap();
        reconciler.receive_anchor(PeerId::generate(), peer_anchor("virtualObject0"));

        assert_eq!(reconciler.replay_anchors(), vec![local]);
    }

    #[test]
    fn test_reset() {
        let mut reconciler = Reconciler::new();
        reconciler
            .create_local_anchor(Point3::default(), Point3::new(0.0, 0.0, 0.2))
            .unwrap();
        reconciler.apply_map(MapSource::Peer(PeerId::generate()), map_with(vec![]));

        reconciler.reset();
        assert_eq!(reconciler.state(), SessionState::Idle);
        assert!(reconciler.anchors().is_empty());
        assert!(reconciler.snapshot().is_none());

        let anchor = reconciler
            .create_local_anchor(Point3::default(), Point3::new(0.0, 0.0, 0.2))
            .unwrap();
        assert_eq!(anchor.name, "virtualObject0");
    }
}
