/*
  SimulatedTracking - in-memory tracking backend

  Stands in for a device tracking stack in the CLI and in tests. Status
  changes are driven from the outside (`set_status`, `interrupt`, ...) and
  published as TrackingEvents on an unbounded channel, so a driver never
  waits on the session. Running with a map switches tracking to
  Limited(Relocalizing) until the driver reports Normal again.

  Every run_with_map and reset starts a new generation. Statuses are
  stamped with the generation current when they were reported.

  The "tracking data" is an opaque byte pattern; a captured map returns it
  unchanged together with the anchors added so far.
*/

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use super::backend::{TrackingBackend, TrackingUnavailableError};
use super::status::{LimitedReason, TrackingEvent, TrackingState, TrackingStatus, WorldMappingStatus};
use crate::core_codec::{AnchorId, Snapshot, SpatialAnchor, WorldMap};

const DEFAULT_TRACKING_DATA_LEN: usize = 16 * 1024;

/// JPEG start-of-image marker, so snapshots look like images to tooling
const SNAPSHOT_PREFIX: [u8; 4] = [0xFF, 0xD8, 0xFF, 0xE0];

#[derive(Debug)]
struct SimState {
    status: TrackingStatus,
    tracking_data: Vec<u8>,
    anchors: Vec<SpatialAnchor>,
    snapshots_taken: u32,
    runs_with_map: u32,
    snapshot_available: bool,
    generation: u64,
}

#[derive(Debug)]
pub struct SimulatedTracking {
    state: Mutex<SimState>,
    events: mpsc::UnboundedSender<TrackingEvent>,
}

fn feature_pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(31) % 251) as u8).collect()
}

impl SimulatedTracking {
    /// New backend with a generated tracking blob
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TrackingEvent>) {
        Self::with_tracking_data(feature_pattern(DEFAULT_TRACKING_DATA_LEN))
    }

    pub fn with_tracking_data(tracking_data: Vec<u8>) -> (Self, mpsc::UnboundedReceiver<TrackingEvent>) {
        let (events, event_rx) = mpsc::unbounded_channel();
        let backend = SimulatedTracking {
            state: Mutex::new(SimState {
                status: TrackingStatus::default(),
                tracking_data,
                anchors: Vec::new(),
                snapshots_taken: 0,
                runs_with_map: 0,
                snapshot_available: true,
                generation: 0,
            }),
            events,
        };
        (backend, event_rx)
    }

    fn publish(&self, event: TrackingEvent) {
        if self.events.send(event).is_err() {
            debug!("Tracking event receiver dropped");
        }
    }

    /// Report a new tracking/mapping status
    pub async fn set_status(&self, tracking: TrackingState, mapping: Option<WorldMappingStatus>) {
        let status = TrackingStatus::new(tracking, mapping);
        let mut state = self.state.lock().await;
        state.status = status;
        // Published under the lock so a concurrent reset cannot slip in between
        self.publish(TrackingEvent::StatusChanged {
            status,
            generation: state.generation,
        });
    }

    pub async fn interrupt(&self) {
        self.publish(TrackingEvent::Interrupted);
    }

    pub async fn resume(&self) {
        self.publish(TrackingEvent::InterruptionEnded);
    }

    pub async fn fail(&self, reason: impl Into<String>) {
        self.publish(TrackingEvent::Failed(reason.into()));
    }

    /// Make snapshot capture fail (or succeed again)
    pub async fn set_snapshot_available(&self, available: bool) {
        self.state.lock().await.snapshot_available = available;
    }

    pub async fn status(&self) -> TrackingStatus {
        self.state.lock().await.status
    }

    pub async fn anchors(&self) -> Vec<SpatialAnchor> {
        self.state.lock().await.anchors.clone()
    }

    pub async fn tracking_data(&self) -> Vec<u8> {
        self.state.lock().await.tracking_data.clone()
    }

    /// How many times a map was applied
    pub async fn runs_with_map(&self) -> u32 {
        self.state.lock().await.runs_with_map
    }

    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }
}

#[async_trait]
impl TrackingBackend for SimulatedTracking {
    async fn current_world_map(&self) -> Result<WorldMap, TrackingUnavailableError> {
        let state = self.state.lock().await;

        if state.status.tracking == TrackingState::NotAvailable {
            return Err(TrackingUnavailableError::NoFrame);
        }
        match state.status.mapping {
            Some(mapping) if mapping != WorldMappingStatus::NotAvailable => {}
            other => return Err(TrackingUnavailableError::InsufficientMapping(other)),
        }

        Ok(WorldMap::new(state.tracking_data.clone(), state.anchors.clone()))
    }

    async fn capture_snapshot(&self) -> Option<Snapshot> {
        let mut state = self.state.lock().await;
        if !state.snapshot_available {
            return None;
        }

        state.snapshots_taken += 1;
        let mut image = SNAPSHOT_PREFIX.to_vec();
        image.extend_from_slice(&state.snapshots_taken.to_be_bytes());
        image.extend(feature_pattern(256));
        Some(Snapshot::new(image))
    }

    async fn run_with_map(&self, tracking_data: Vec<u8>, anchors: Vec<SpatialAnchor>) -> u64 {
        let mut state = self.state.lock().await;
        state.tracking_data = tracking_data;
        state.anchors = anchors;
        state.runs_with_map += 1;
        state.generation += 1;
        state.status = TrackingStatus::new(
            TrackingState::Limited(LimitedReason::Relocalizing),
            Some(WorldMappingStatus::NotAvailable),
        );

        self.publish(TrackingEvent::StatusChanged {
            status: state.status,
            generation: state.generation,
        });
        state.generation
    }

    async fn reset(&self) -> u64 {
        let mut state = self.state.lock().await;
        state.anchors.clear();
        state.generation += 1;
        state.status = TrackingStatus::new(
            TrackingState::Limited(LimitedReason::Initializing),
            Some(WorldMappingStatus::NotAvailable),
        );

        self.publish(TrackingEvent::StatusChanged {
            status: state.status,
            generation: state.generation,
        });
        state.generation
    }

    async fn add_anchor(&self, anchor: SpatialAnchor) {
        self.state.lock().await.anchors.push(anchor);
    }

    async fn contains_anchor(&self, id: AnchorId) -> bool {
        self.state.lock().await.anchors.iter().any(|a| a.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_codec::Transform;

    #[tokio::test]
    async fn test_map_requires_mapping() {
        let (backend, _events) = SimulatedTracking::new();

        assert_eq!(
            backend.current_world_map().await,
            Err(TrackingUnavailableError::NoFrame)
        );

        backend.set_status(TrackingState::Normal, None).await;
        assert_eq!(
            backend.current_world_map().await,
            Err(TrackingUnavailableError::InsufficientMapping(None))
        );

        backend
            .set_status(TrackingState::Normal, Some(WorldMappingStatus::Limited))
            .await;
        assert!(backend.current_world_map().await.is_ok());
    }

    #[tokio::test]
    async fn test_run_with_map_relocalizes() {
        let (backend, mut events) = SimulatedTracking::new();
        let anchor = SpatialAnchor::new("virtualObject0", Transform::IDENTITY);

        backend.add_anchor(SpatialAnchor::new("stale", Transform::IDENTITY)).await;
        let generation = backend.run_with_map(vec![7; 32], vec![anchor.clone()]).await;
        assert_eq!(generation, 1);

        assert_eq!(backend.anchors().await, vec![anchor.clone()]);
        assert!(backend.contains_anchor(anchor.id).await);
        assert_eq!(backend.runs_with_map().await, 1);

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            TrackingEvent::StatusChanged {
                status: TrackingStatus::new(
                    TrackingState::Limited(LimitedReason::Relocalizing),
                    Some(WorldMappingStatus::NotAvailable),
                ),
                generation: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_statuses_stamped_with_generation() {
        let (backend, mut events) = SimulatedTracking::new();

        backend.set_status(TrackingState::Normal, Some(WorldMappingStatus::Mapped)).await;
        assert_eq!(backend.reset().await, 1);
        backend.set_status(TrackingState::Normal, Some(WorldMappingStatus::Extending)).await;

        let mut generations = Vec::new();
        while let Ok(TrackingEvent::StatusChanged { generation, .. }) = events.try_recv() {
            generations.push(generation);
        }
        assert_eq!(generations, vec![0, 1, 1]);
        assert_eq!(backend.generation().await, 1);
    }

    #[tokio::test]
    async fn test_snapshot_toggle() {
        let (backend, _events) = SimulatedTracking::new();
        let first = backend.capture_snapshot().await.unwrap();
        assert!(first.image_data.starts_with(&SNAPSHOT_PREFIX));

        backend.set_snapshot_available(false).await;
        assert!(backend.capture_snapshot().await.is_none());
    }
}
