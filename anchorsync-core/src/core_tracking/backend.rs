//! Boundary to the tracking subsystem
//!
//! The session never sees camera frames. It asks the backend for the
//! current world map and a preview snapshot, hands it maps to relocalize
//! against, and registers anchors with it.

use async_trait::async_trait;
use thiserror::Error;

use super::status::WorldMappingStatus;
use crate::core_codec::{AnchorId, Snapshot, SpatialAnchor, WorldMap};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackingUnavailableError {
    #[error("No tracking frame available")]
    NoFrame,

    #[error("World mapping is not sufficient ({})", .0.map_or("Not Available", |m| m.description()))]
    InsufficientMapping(Option<WorldMappingStatus>),

    #[error("Tracking failed: {0}")]
    Failed(String),
}

/// Tracking subsystem as seen by the session
#[async_trait]
pub trait TrackingBackend: Send + Sync {
    /// Capture the world map accumulated so far, anchors included
    async fn current_world_map(&self) -> Result<WorldMap, TrackingUnavailableError>;

    /// Preview image of the current view, `None` if it cannot be taken
    async fn capture_snapshot(&self) -> Option<Snapshot>;

    /// Reset tracking, drop existing anchors and relocalize against
    /// `tracking_data`. Returns the generation of the new tracking run;
    /// statuses from earlier runs carry a lower one.
    async fn run_with_map(&self, tracking_data: Vec<u8>, anchors: Vec<SpatialAnchor>) -> u64;

    /// Reset tracking and drop every anchor. Returns the new generation.
    async fn reset(&self) -> u64;

    async fn add_anchor(&self, anchor: SpatialAnchor);

    /// Whether the anchor is part of the current tracking frame
    async fn contains_anchor(&self, id: AnchorId) -> bool;
}
