//! Shared-session reconciliation
//!
//! The [`Reconciler`] holds the session state machine and anchor set; the
//! [`SessionHandle`] runs it as an actor fed by UI commands, tracking
//! updates and transport events.

pub mod anchors;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod reconciler;
pub mod session_manager;
pub mod state;

pub use anchors::{AnchorEntry, AnchorOrigin, AnchorSet, ANCHOR_NAME_PREFIX};
pub use errors::{SessionError, SessionResult};
pub use events::{SessionEvent, SessionEvents};
pub use reconciler::{AnchorVerdict, Reconciler};
pub use session_manager::{SessionCommand, SessionHandle, SessionStatus};
pub use state::{MapSource, SessionState};
