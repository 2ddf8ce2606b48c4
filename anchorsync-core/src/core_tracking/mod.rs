//! Tracking subsystem boundary
//!
//! Status types, the [`TrackingBackend`] trait the session drives, and a
//! simulated backend for the CLI and tests.

pub mod backend;
pub mod simulated;
pub mod status;

pub use backend::{TrackingBackend, TrackingUnavailableError};
pub use simulated::SimulatedTracking;
pub use status::{LimitedReason, TrackingEvent, TrackingState, TrackingStatus, WorldMappingStatus};
