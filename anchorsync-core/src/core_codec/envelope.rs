/*
    envelope.rs - Explicit type tag for wire blobs

    Every blob exchanged between peers (or written to disk) starts with a
    5-byte header:

        [magic: 4][version: 1][body ...]

    "ASWM" marks a world map, "ASAN" a single anchor. The receiver inspects
    the tag instead of guessing the kind from which decoder happens to
    succeed. World maps are checked first, anchors second.
*/

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::DecodeError;

/// Current wire format version
pub const FORMAT_VERSION: u8 = 1;

/// Length of the envelope header
pub const HEADER_LEN: usize = 5;

const WORLD_MAP_MAGIC: [u8; 4] = *b"ASWM";
const ANCHOR_MAGIC: [u8; 4] = *b"ASAN";

/// Kind of blob carried by an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    WorldMap,
    Anchor,
}

impl MessageKind {
    /// Four-byte tag written at the start of the blob
    pub fn magic(&self) -> [u8; 4] {
        match self {
            MessageKind::WorldMap => WORLD_MAP_MAGIC,
            MessageKind::Anchor => ANCHOR_MAGIC,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::WorldMap => "world-map",
            MessageKind::Anchor => "anchor",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reads and writes envelope headers
pub struct Envelope;

impl Envelope {
    /// Determine the kind of a blob without decoding its body
    pub fn classify(bytes: &[u8]) -> Result<MessageKind, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                expected: HEADER_LEN,
                actual: bytes.len(),
            });
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[..4]);

        let kind = if magic == WORLD_MAP_MAGIC {
            MessageKind::WorldMap
        } else if magic == ANCHOR_MAGIC {
            MessageKind::Anchor
        } else {
            return Err(DecodeError::BadMagic(magic));
        };

        let version = bytes[4];
        if version != FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion(version));
        }

        Ok(kind)
    }

    /// Append a header for `kind` to `out`
    pub fn write_header(kind: MessageKind, out: &mut Vec<u8>) {
        out.extend_from_slice(&kind.magic());
        out.push(FORMAT_VERSION);
    }

    /// Check that `bytes` carries `expected` and return the body
    pub fn open(bytes: &[u8], expected: MessageKind) -> Result<&[u8], DecodeError> {
        let actual = Self::classify(bytes)?;
        if actual != expected {
            return Err(DecodeError::UnexpectedKind { expected, actual });
        }
        Ok(&bytes[HEADER_LEN..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_world_map() {
        let mut blob = Vec::new();
        Envelope::write_header(MessageKind::WorldMap, &mut blob);
        blob.extend_from_slice(b"body");

        assert_eq!(Envelope::classify(&blob), Ok(MessageKind::WorldMap));
    }

    #[test]
    fn test_classify_anchor() {
        let mut blob = Vec::new();
        Envelope::write_header(MessageKind::Anchor, &mut blob);

        assert_eq!(Envelope::classify(&blob), Ok(MessageKind::Anchor));
    }

    #[test]
    fn test_classify_rejects_short_input() {
        let result = Envelope::classify(b"ASW");
        assert_eq!(result, Err(DecodeError::Truncated { expected: 5, actual: 3 }));
    }

    #[test]
    fn test_classify_rejects_unknown_magic() {
        let result = Envelope::classify(b"JUNK\x01rest");
        assert!(matches!(result, Err(DecodeError::BadMagic(_))));
    }

    #[test]
    fn test_classify_rejects_future_version() {
        let result = Envelope::classify(b"ASAN\x09");
        assert_eq!(result, Err(DecodeError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_open_rejects_wrong_kind() {
        let mut blob = Vec::new();
        Envelope::write_header(MessageKind::WorldMap, &mut blob);

        let result = Envelope::open(&blob, MessageKind::Anchor);
        assert_eq!(
            result,
            Err(DecodeError::UnexpectedKind {
                expected: MessageKind::Anchor,
                actual: MessageKind::WorldMap,
            })
        );
    }

    #[test]
    fn test_open_returns_body() {
        let mut blob = Vec::new();
        Envelope::write_header(MessageKind::Anchor, &mut blob);
        blob.extend_from_slice(&[7, 8, 9]);

        assert_eq!(Envelope::open(&blob, MessageKind::Anchor).unwrap(), &[7, 8, 9]);
    }
}
