//! Tracking and mapping status reported by the tracking subsystem

use std::fmt;

use serde::{Deserialize, Serialize};

/// Why tracking quality is limited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LimitedReason {
    Initializing,
    ExcessiveMotion,
    InsufficientFeatures,
    Relocalizing,
}

/// Camera tracking quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackingState {
    NotAvailable,
    Limited(LimitedReason),
    Normal,
}

/// How much of the surroundings has been mapped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorldMappingStatus {
    NotAvailable,
    Limited,
    Extending,
    Mapped,
}

impl WorldMappingStatus {
    /// Mapping is good enough to save, share or finish relocalizing
    pub fn is_mature(&self) -> bool {
        matches!(self, WorldMappingStatus::Extending | WorldMappingStatus::Mapped)
    }

    pub fn description(&self) -> &'static str {
        match self {
            WorldMappingStatus::NotAvailable => "Not Available",
            WorldMappingStatus::Limited => "Limited",
            WorldMappingStatus::Extending => "Extending",
            WorldMappingStatus::Mapped => "Mapped",
        }
    }
}

impl TrackingState {
    pub fn is_normal(&self) -> bool {
        matches!(self, TrackingState::Normal)
    }

    pub fn description(&self) -> &'static str {
        match self {
            TrackingState::NotAvailable => "Not Available",
            TrackingState::Normal => "Normal",
            TrackingState::Limited(LimitedReason::Initializing) => "Limited: Initializing",
            TrackingState::Limited(LimitedReason::ExcessiveMotion) => "Limited: Excessive Motion",
            TrackingState::Limited(LimitedReason::InsufficientFeatures) => {
                "Limited: Insufficient Features"
            }
            TrackingState::Limited(LimitedReason::Relocalizing) => "Limited: Relocalizing",
        }
    }
}

impl fmt::Display for WorldMappingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// One tracking update. `mapping` is absent when the frame carries no
/// mapping information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingStatus {
    pub tracking: TrackingState,
    pub mapping: Option<WorldMappingStatus>,
}

impl TrackingStatus {
    pub fn new(tracking: TrackingState, mapping: Option<WorldMappingStatus>) -> Self {
        TrackingStatus { tracking, mapping }
    }

    /// Tracking is normal and the map is extending or mapped
    pub fn is_relocalized(&self) -> bool {
        self.tracking.is_normal() && self.mapping.map_or(false, |m| m.is_mature())
    }

    /// Two-line status shown to the user
    pub fn status_text(&self) -> String {
        let mapping = self
            .mapping
            .map_or("Not Available", |m| m.description());
        format!("Mapping: {}\nTracking: {}", mapping, self.tracking.description())
    }
}

impl Default for TrackingStatus {
    fn default() -> Self {
        TrackingStatus {
            tracking: TrackingState::NotAvailable,
            mapping: None,
        }
    }
}

/// Notifications from the tracking subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingEvent {
    /// `generation` is the tracking run the status belongs to, as returned
    /// by `run_with_map` or `reset`
    StatusChanged {
        status: TrackingStatus,
        generation: u64,
    },
    Interrupted,
    InterruptionEnded,
    Failed(String),
}
