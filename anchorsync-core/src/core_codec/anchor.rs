/*
    anchor.rs - Spatial anchor type and its wire codec

    A spatial anchor is a named rigid pose in the tracking frame with an
    optional line-segment payload (the sketch stroke it represents).

    Blob layout:

        [envelope header "ASAN" v1][bincode(SpatialAnchor)]

    bincode runs with fixed-width integers, a size limit and trailing-byte
    rejection, so a truncated or padded blob never decodes into an anchor
    with garbage fields.
*/

use std::fmt;

use bincode::Options;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::envelope::{Envelope, MessageKind, HEADER_LEN};
use super::errors::{DecodeError, EncodeError};
use super::wire_options;

/// Upper bound on an encoded anchor blob (64 KiB)
pub const MAX_ANCHOR_BLOB_SIZE: usize = 64 * 1024;

/// Upper bound on an anchor name in bytes
pub const MAX_ANCHOR_NAME_LEN: usize = 1024;

/// A point in the tracking frame, in metres
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point3 {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Point3 { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl fmt::Display for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

/// 4x4 rigid pose matrix, stored as four columns
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform(pub [[f32; 4]; 4]);

impl Transform {
    pub const IDENTITY: Transform = Transform([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);

    /// Pure translation
    pub fn from_translation(x: f32, y: f32, z: f32) -> Self {
        let mut columns = Self::IDENTITY.0;
        columns[3] = [x, y, z, 1.0];
        Transform(columns)
    }

    pub fn columns(&self) -> &[[f32; 4]; 4] {
        &self.0
    }

    /// Translation component of the pose
    pub fn position(&self) -> Point3 {
        let t = self.0[3];
        Point3::new(t[0], t[1], t[2])
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().flatten().all(|v| v.is_finite())
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Stable identity of an anchor across peers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnchorId(pub Uuid);

impl AnchorId {
    pub fn generate() -> Self {
        AnchorId(Uuid::new_v4())
    }
}

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named pose with an optional line-segment payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialAnchor {
    pub id: AnchorId,
    pub name: String,
    pub transform: Transform,
    pub source: Option<Point3>,
    pub destination: Option<Point3>,
}

impl SpatialAnchor {
    /// Anchor without a payload
    pub fn new(name: impl Into<String>, transform: Transform) -> Self {
        SpatialAnchor {
            id: AnchorId::generate(),
            name: name.into(),
            transform,
            source: None,
            destination: None,
        }
    }

    /// Anchor carrying a sketched line segment
    pub fn line(
        name: impl Into<String>,
        transform: Transform,
        source: Point3,
        destination: Point3,
    ) -> Self {
        SpatialAnchor {
            source: Some(source),
            destination: Some(destination),
            ..Self::new(name, transform)
        }
    }

    /// Both segment endpoints, if the anchor carries a complete segment
    pub fn segment(&self) -> Option<(Point3, Point3)> {
        match (self.source, self.destination) {
            (Some(source), Some(destination)) => Some((source, destination)),
            _ => None,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), (&'static str, String)> {
        if self.name.is_empty() {
            return Err(("name", "must not be empty".to_string()));
        }
        if self.name.len() > MAX_ANCHOR_NAME_LEN {
            return Err((
                "name",
                format!("{} bytes exceeds max {}", self.name.len(), MAX_ANCHOR_NAME_LEN),
            ));
        }
        if !self.transform.is_finite() {
            return Err(("transform", "contains non-finite values".to_string()));
        }
        if self.source.map_or(false, |p| !p.is_finite()) {
            return Err(("source", "contains non-finite values".to_string()));
        }
        if self.destination.map_or(false, |p| !p.is_finite()) {
            return Err(("destination", "contains non-finite values".to_string()));
        }
        Ok(())
    }
}

/// Encode one anchor into a tagged blob
pub fn encode(anchor: &SpatialAnchor) -> Result<Vec<u8>, EncodeError> {
    anchor
        .validate()
        .map_err(|(field, reason)| EncodeError::InvalidField { field, reason })?;

    let mut out = Vec::with_capacity(HEADER_LEN + 128 + anchor.name.len());
    Envelope::write_header(MessageKind::Anchor, &mut out);
    wire_options(MAX_ANCHOR_BLOB_SIZE - HEADER_LEN).serialize_into(&mut out, anchor)?;

    Ok(out)
}

/// Decode one anchor from a tagged blob
pub fn decode(bytes: &[u8]) -> Result<SpatialAnchor, DecodeError> {
    if bytes.len() > MAX_ANCHOR_BLOB_SIZE {
        return Err(DecodeError::TooLarge {
            size: bytes.len(),
            max_size: MAX_ANCHOR_BLOB_SIZE,
        });
    }

    let body = Envelope::open(bytes, MessageKind::Anchor)?;
    let anchor: SpatialAnchor = wire_options(MAX_ANCHOR_BLOB_SIZE).deserialize(body)?;

    anchor
        .validate()
        .map_err(|(field, reason)| DecodeError::InvalidField { field, reason })?;

    Ok(anchor)
}
