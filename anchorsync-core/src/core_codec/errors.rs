/*
    errors.rs - Error types for the wire codecs

    DecodeError covers every way peer-supplied or persisted bytes can be
    rejected. It is always handled where it occurs and never sent back to
    the peer that produced the bytes.
*/

use thiserror::Error;

use super::envelope::MessageKind;

/// Errors produced while decoding anchor or world-map blobs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Input shorter than the structure it claims to contain
    #[error("Truncated input: need at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// First four bytes are not a known message tag
    #[error("Unrecognized message tag: {0:02x?}")]
    BadMagic([u8; 4]),

    /// Known tag with a format version we cannot read
    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u8),

    /// Well-formed envelope of the other message kind
    #[error("Unexpected message kind: expected {expected}, got {actual}")]
    UnexpectedKind { expected: MessageKind, actual: MessageKind },

    /// Input exceeds the size bound for its kind
    #[error("Message too large: {size} bytes exceeds max {max_size} bytes")]
    TooLarge { size: usize, max_size: usize },

    /// Structurally valid but semantically invalid field
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// bincode rejected the body
    #[error("Deserialization error: {0}")]
    Serialization(String),
}

/// Errors produced while encoding anchor or world-map blobs
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Message too large: {size} bytes exceeds max {max_size} bytes")]
    TooLarge { size: usize, max_size: usize },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for DecodeError {
    fn from(err: bincode::Error) -> Self {
        DecodeError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for EncodeError {
    fn from(err: bincode::Error) -> Self {
        EncodeError::Serialization(err.to_string())
    }
}
