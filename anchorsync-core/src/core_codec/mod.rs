//! Wire codecs for anchors and world maps
//!
//! Both message kinds are wrapped in a tagged [`Envelope`] so a receiver can
//! tell them apart without trial decoding.

pub mod anchor;
pub mod envelope;
pub mod errors;
pub mod world_map;

pub use anchor::{AnchorId, Point3, SpatialAnchor, Transform, MAX_ANCHOR_BLOB_SIZE};
pub use envelope::{Envelope, MessageKind, FORMAT_VERSION};
pub use errors::{DecodeError, EncodeError};
pub use world_map::{Snapshot, WorldMap, MAX_WORLD_MAP_SIZE, SNAPSHOT_ANCHOR_NAME};

use bincode::Options;

/// bincode configuration shared by every blob body
pub(crate) fn wire_options(limit: usize) -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_limit(limit as u64)
        .reject_trailing_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn finite() -> impl Strategy<Value = f32> {
        -1.0e6f32..1.0e6f32
    }

    fn point() -> impl Strategy<Value = Point3> {
        (finite(), finite(), finite()).prop_map(|(x, y, z)| Point3::new(x, y, z))
    }

    fn transform() -> impl Strategy<Value = Transform> {
        proptest::array::uniform4(proptest::array::uniform4(finite())).prop_map(Transform)
    }

    fn spatial_anchor() -> impl Strategy<Value = SpatialAnchor> {
        (
            "[a-zA-Z0-9_]{1,40}",
            transform(),
            proptest::option::of(point()),
            proptest::option::of(point()),
        )
            .prop_map(|(name, transform, source, destination)| SpatialAnchor {
                id: AnchorId::generate(),
                name,
                transform,
                source,
                destination,
            })
    }

    proptest! {
        #[test]
        fn prop_anchor_roundtrip_is_exact(anchor in spatial_anchor()) {
            let decoded = anchor::decode(&anchor::encode(&anchor).unwrap()).unwrap();

            prop_assert_eq!(&decoded.name, &anchor.name);
            prop_assert_eq!(decoded.id, anchor.id);
            for (a, b) in decoded.transform.0.iter().flatten().zip(anchor.transform.0.iter().flatten()) {
                prop_assert_eq!(a.to_bits(), b.to_bits());
            }
            prop_assert_eq!(decoded.source.map(|p| (p.x.to_bits(), p.y.to_bits(), p.z.to_bits())),
                            anchor.source.map(|p| (p.x.to_bits(), p.y.to_bits(), p.z.to_bits())));
            prop_assert_eq!(decoded.destination.map(|p| (p.x.to_bits(), p.y.to_bits(), p.z.to_bits())),
                            anchor.destination.map(|p| (p.x.to_bits(), p.y.to_bits(), p.z.to_bits())));
        }

        #[test]
        fn prop_world_map_roundtrip(
            anchors in proptest::collection::vec(spatial_anchor(), 0..8),
            tracking_data in proptest::collection::vec(any::<u8>(), 0..2048),
            snapshot in proptest::option::of(proptest::collection::vec(any::<u8>(), 0..256)),
        ) {
            let mut map = WorldMap::new(tracking_data, anchors);
            map.snapshot = snapshot.map(Snapshot::new);

            let decoded = world_map::decode(&world_map::encode(&map).unwrap()).unwrap();
            prop_assert_eq!(&decoded.anchors, &map.anchors);
            prop_assert_eq!(&decoded.tracking_data, &map.tracking_data);
            prop_assert_eq!(&decoded.snapshot, &map.snapshot);
        }

        #[test]
        fn prop_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = Envelope::classify(&bytes);
            let _ = anchor::decode(&bytes);
            let _ = world_map::decode(&bytes);
        }
    }
}
