/*
    errors.rs - Transport error types

    Transport errors are recovered locally: a failed send or connect is
    logged and surfaced as an event, never allowed to abort the session.
*/

use thiserror::Error;

use super::peer::PeerId;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("Failed to connect to {addr}: {reason}")]
    Connect { addr: String, reason: String },

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Service mismatch: expected {expected}, got {actual}")]
    ServiceMismatch { expected: String, actual: String },

    #[error("Duplicate connection to peer {0}")]
    DuplicatePeer(PeerId),

    #[error("Peer not found: {0}")]
    PeerNotFound(PeerId),

    #[error("Send queue full for peer {0}")]
    QueueFull(PeerId),

    #[error("Message too large: {size} bytes exceeds max {max_size} bytes")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Operation timed out")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Transport not started")]
    NotStarted,

    #[error("Transport stopped")]
    Stopped,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<snow::Error> for TransportError {
    fn from(err: snow::Error) -> Self {
        TransportError::Crypto(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_display() {
        let err = TransportError::Bind {
            addr: "0.0.0.0:7420".to_string(),
            reason: "address in use".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to bind 0.0.0.0:7420: address in use");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err: TransportError = io.into();
        assert!(matches!(err, TransportError::Io(_)));
    }
}
