/*
    world_map.rs - World map type and its wire codec

    A world map bundles the opaque tracking blob produced by the tracking
    subsystem, the anchors placed in it, and an optional preview snapshot
    used only to guide the user while relocalizing.

    Blob layout:

        [envelope header "ASWM" v1]
        [metadata length: u64 LE]
        [bincode(MapMetadata)]         anchor entries + snapshot pseudo-anchor
        [tracking blob ...]            raw bytes, rest of the buffer

    The snapshot travels as a pseudo-anchor appended to the anchor list and
    is split back out on decode. The tracking blob never goes through serde,
    so multi-megabyte maps cost one copy on encode and none on decode_vec.
*/

use bincode::Options;
use serde::{Deserialize, Serialize};

use super::anchor::SpatialAnchor;
use super::envelope::{Envelope, MessageKind, HEADER_LEN};
use super::errors::{DecodeError, EncodeError};
use super::wire_options;

/// Upper bound on an encoded world map (256 MiB)
pub const MAX_WORLD_MAP_SIZE: usize = 256 * 1024 * 1024;

/// Upper bound on the metadata section (anchors + snapshot image)
pub const MAX_MAP_METADATA_SIZE: usize = 32 * 1024 * 1024;

/// Name given to the snapshot pseudo-anchor inside an encoded map
pub const SNAPSHOT_ANCHOR_NAME: &str = "snapshot";

const LENGTH_PREFIX: usize = 8;

/// Compressed preview image embedded in a world map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub image_data: Vec<u8>,
}

impl Snapshot {
    pub fn new(image_data: Vec<u8>) -> Self {
        Snapshot { image_data }
    }

    pub fn len(&self) -> usize {
        self.image_data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_data.is_empty()
    }
}

/// Serializable snapshot of accumulated tracking state
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorldMap {
    /// Opaque blob owned by the tracking subsystem
    pub tracking_data: Vec<u8>,
    /// Anchors placed in the map
    pub anchors: Vec<SpatialAnchor>,
    /// Preview image, never handed to the tracking subsystem
    pub snapshot: Option<Snapshot>,
}

impl WorldMap {
    pub fn new(tracking_data: Vec<u8>, anchors: Vec<SpatialAnchor>) -> Self {
        WorldMap {
            tracking_data,
            anchors,
            snapshot: None,
        }
    }

    pub fn with_snapshot(mut self, snapshot: Snapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn take_snapshot(&mut self) -> Option<Snapshot> {
        self.snapshot.take()
    }

    pub fn anchor_named(&self, name: &str) -> Option<&SpatialAnchor> {
        self.anchors.iter().find(|a| a.name == name)
    }

    /// Parts handed to the tracking subsystem; the snapshot is dropped
    pub fn into_tracking_parts(self) -> (Vec<u8>, Vec<SpatialAnchor>) {
        (self.tracking_data, self.anchors)
    }
}

#[derive(Serialize)]
enum MapEntryRef<'a> {
    Anchor(&'a SpatialAnchor),
    Snapshot { name: &'a str, image_data: &'a Vec<u8> },
}

#[derive(Serialize)]
struct MapMetadataRef<'a> {
    entries: Vec<MapEntryRef<'a>>,
    tracking_len: u64,
}

#[derive(Deserialize)]
enum MapEntry {
    Anchor(SpatialAnchor),
    Snapshot { name: String, image_data: Vec<u8> },
}

#[derive(Deserialize)]
struct MapMetadata {
    entries: Vec<MapEntry>,
    tracking_len: u64,
}

/// Encode a world map, appending its snapshot as a pseudo-anchor
pub fn encode(map: &WorldMap) -> Result<Vec<u8>, EncodeError> {
    for anchor in &map.anchors {
        anchor
            .validate()
            .map_err(|(field, reason)| EncodeError::InvalidField { field, reason })?;
    }

    let mut entries: Vec<MapEntryRef<'_>> = map.anchors.iter().map(MapEntryRef::Anchor).collect();
    if let Some(snapshot) = &map.snapshot {
        entries.push(MapEntryRef::Snapshot {
            name: SNAPSHOT_ANCHOR_NAME,
            image_data: &snapshot.image_data,
        });
    }

    let metadata = MapMetadataRef {
        entries,
        tracking_len: map.tracking_data.len() as u64,
    };

    let metadata_len = wire_options(MAX_MAP_METADATA_SIZE).serialized_size(&metadata)? as usize;
    let total = HEADER_LEN + LENGTH_PREFIX + metadata_len + map.tracking_data.len();
    if total > MAX_WORLD_MAP_SIZE {
        return Err(EncodeError::TooLarge {
            size: total,
            max_size: MAX_WORLD_MAP_SIZE,
        });
    }

    let mut out = Vec::with_capacity(total);
    Envelope::write_header(MessageKind::WorldMap, &mut out);
    out.extend_from_slice(&(metadata_len as u64).to_le_bytes());
    wire_options(MAX_MAP_METADATA_SIZE).serialize_into(&mut out, &metadata)?;
    out.extend_from_slice(&map.tracking_data);

    Ok(out)
}

/// Decode a world map from a borrowed buffer
pub fn decode(bytes: &[u8]) -> Result<WorldMap, DecodeError> {
    let (metadata, tracking_offset) = parse_layout(bytes)?;
    let (anchors, snapshot) = split_entries(metadata.entries)?;

    Ok(WorldMap {
        tracking_data: bytes[tracking_offset..].to_vec(),
        anchors,
        snapshot,
    })
}

/// Decode a world map, reusing the buffer's allocation for the tracking blob
pub fn decode_vec(mut bytes: Vec<u8>) -> Result<WorldMap, DecodeError> {
    let (metadata, tracking_offset) = parse_layout(&bytes)?;
    let (anchors, snapshot) = split_entries(metadata.entries)?;

    bytes.drain(..tracking_offset);

    Ok(WorldMap {
        tracking_data: bytes,
        anchors,
        snapshot,
    })
}

fn parse_layout(bytes: &[u8]) -> Result<(MapMetadata, usize), DecodeError> {
    if bytes.len() > MAX_WORLD_MAP_SIZE {
        return Err(DecodeError::TooLarge {
            size: bytes.len(),
            max_size: MAX_WORLD_MAP_SIZE,
        });
    }

    let body = Envelope::open(bytes, MessageKind::WorldMap)?;
    if body.len() < LENGTH_PREFIX {
        return Err(DecodeError::Truncated {
            expected: HEADER_LEN + LENGTH_PREFIX,
            actual: bytes.len(),
        });
    }

    let mut len_buf = [0u8; LENGTH_PREFIX];
    len_buf.copy_from_slice(&body[..LENGTH_PREFIX]);
    let metadata_len = u64::from_le_bytes(len_buf);
    if metadata_len > MAX_MAP_METADATA_SIZE as u64 {
        return Err(DecodeError::TooLarge {
            size: usize::try_from(metadata_len).unwrap_or(usize::MAX),
            max_size: MAX_MAP_METADATA_SIZE,
        });
    }

    let metadata_end = LENGTH_PREFIX + metadata_len as usize;
    if body.len() < metadata_end {
        return Err(DecodeError::Truncated {
            expected: HEADER_LEN + metadata_end,
            actual: bytes.len(),
        });
    }

    let metadata: MapMetadata =
        wire_options(MAX_MAP_METADATA_SIZE).deserialize(&body[LENGTH_PREFIX..metadata_end])?;

    let tracking_offset = HEADER_LEN + metadata_end;
    let tracking_len = (bytes.len() - tracking_offset) as u64;
    if tracking_len < metadata.tracking_len {
        return Err(DecodeError::Truncated {
            expected: tracking_offset
                .saturating_add(usize::try_from(metadata.tracking_len).unwrap_or(usize::MAX)),
            actual: bytes.len(),
        });
    }
    if tracking_len > metadata.tracking_len {
        return Err(DecodeError::InvalidField {
            field: "tracking_data",
            reason: format!(
                "{} trailing bytes after declared blob",
                tracking_len - metadata.tracking_len
            ),
        });
    }

    Ok((metadata, tracking_offset))
}

fn split_entries(
    entries: Vec<MapEntry>,
) -> Result<(Vec<SpatialAnchor>, Option<Snapshot>), DecodeError> {
    let mut anchors = Vec::with_capacity(entries.len());
    let mut snapshot = None;

    for entry in entries {
        match entry {
            MapEntry::Anchor(anchor) => {
                anchor
                    .validate()
                    .map_err(|(field, reason)| DecodeError::InvalidField { field, reason })?;
                anchors.push(anchor);
            }
            MapEntry::Snapshot { name, image_data } => {
                if snapshot.is_some() {
                    return Err(DecodeError::InvalidField {
                        field: "snapshot",
                        reason: format!("duplicate snapshot entry '{}'", name),
                    });
                }
                snapshot = Some(Snapshot::new(image_data));
            }
        }
    }

    Ok((anchors, snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_codec::anchor::{self, Point3, Transform};

    fn sample_map() -> WorldMap {
        let anchors = vec![
            SpatialAnchor::line(
                "virtualObject0",
                Transform::from_translation(1.0, 0.0, -2.0),
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.1, 0.0, 0.0),
            ),
            SpatialAnchor::new("virtualObject1", Transform::IDENTITY),
        ];
        WorldMap::new(vec![0xAB; 4096], anchors)
            .with_snapshot(Snapshot::new(vec![0xFF, 0xD8, 0xFF, 0xE0, 1, 2, 3]))
    }

    #[test]
    fn test_roundtrip_preserves_anchors_and_blob() {
        let map = sample_map();
        let decoded = decode(&encode(&map).unwrap()).unwrap();

        assert_eq!(decoded, map);
    }

    #[test]
    fn test_snapshot_split_from_tracking_parts() {
        let map = sample_map();
        let decoded = decode_vec(encode(&map).unwrap()).unwrap();

        assert!(decoded.snapshot.is_some());
        assert!(decoded.anchor_named(SNAPSHOT_ANCHOR_NAME).is_none());

        let (tracking_data, anchors) = decoded.into_tracking_parts();
        assert_eq!(tracking_data, map.tracking_data);
        assert_eq!(anchors.len(), 2);
        assert!(anchors.iter().all(|a| a.name != SNAPSHOT_ANCHOR_NAME));
    }

    #[test]
    fn test_map_without_snapshot() {
        let map = WorldMap::new(vec![1, 2, 3], Vec::new());
        let decoded = decode(&encode(&map).unwrap()).unwrap();

        assert!(decoded.snapshot.is_none());
        assert!(decoded.anchors.is_empty());
        assert_eq!(decoded.tracking_data, vec![1, 2, 3]);
    }

    #[test]
    fn test_large_tracking_blob() {
        let tracking_data: Vec<u8> = (0..32 * 1024 * 1024).map(|i| (i % 251) as u8).collect();
        let map = WorldMap::new(tracking_data, Vec::new());

        let bytes = encode(&map).unwrap();
        let decoded = decode_vec(bytes).unwrap();

        assert_eq!(decoded.tracking_data.len(), map.tracking_data.len());
        assert!(decoded.tracking_data == map.tracking_data);
    }

    #[test]
    fn test_truncated_map_rejected() {
        let bytes = encode(&sample_map()).unwrap();

        for cut in [0, 4, 5, 12, 40, bytes.len() - 1] {
            assert!(decode(&bytes[..cut]).is_err(), "cut at {} decoded", cut);
        }
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode(&sample_map()).unwrap();
        bytes.extend_from_slice(&[0, 0]);

        let result = decode(&bytes);
        assert!(matches!(result, Err(DecodeError::InvalidField { field: "tracking_data", .. })));
    }

    #[test]
    fn test_anchor_blob_rejected_as_map() {
        let anchor = SpatialAnchor::new("virtualObject0", Transform::IDENTITY);
        let bytes = anchor::encode(&anchor).unwrap();

        let result = decode(&bytes);
        assert!(matches!(result, Err(DecodeError::UnexpectedKind { .. })));
    }

    #[test]
    fn test_metadata_length_bomb_rejected() {
        let mut bytes = Vec::new();
        Envelope::write_header(MessageKind::WorldMap, &mut bytes);
        bytes.extend_from_slice(&u64::MAX.to_le_bytes());

        let result = decode(&bytes);
        assert!(matches!(result, Err(DecodeError::TooLarge { .. })));
    }
}
