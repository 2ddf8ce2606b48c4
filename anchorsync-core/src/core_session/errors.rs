/*
    errors.rs - Session errors

    Everything a SessionHandle call can fail with. Only a corrupted local
    map is fatal; every other error leaves the session running.
*/

use thiserror::Error;

use crate::core_codec::{DecodeError, EncodeError};
use crate::core_storage::PersistenceError;
use crate::core_tracking::TrackingUnavailableError;
use crate::core_transport::TransportError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Anchors cannot be placed while relocalizing")]
    AnchorCreationSuppressed,

    #[error("Invalid anchor: {0}")]
    InvalidAnchor(String),

    #[error("Cannot save now: {0}")]
    SaveUnavailable(String),

    #[error("Failed to take snapshot")]
    SnapshotUnavailable,

    #[error("Saved map is corrupted: {0}")]
    CorruptedLocalMap(String),

    #[error(transparent)]
    Tracking(#[from] TrackingUnavailableError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Background task failed: {0}")]
    Task(String),

    #[error("Session stopped")]
    Stopped,
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    /// The session cannot continue after this error
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::CorruptedLocalMap(_))
    }
}

impl From<tokio::task::JoinError> for SessionError {
    fn from(err: tokio::task::JoinError) -> Self {
        SessionError::Task(err.to_string())
    }
}
