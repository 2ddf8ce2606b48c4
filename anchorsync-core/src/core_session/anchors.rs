//! Anchors known to the session
//!
//! Keyed by [`AnchorId`] and kept in insertion order. Names are not unique:
//! two peers that each place their first anchor both call it
//! `virtualObject0`, and both anchors are kept. The recorded origin lets a
//! caller tell them apart.

use hashlink::LinkedHashMap;
use serde::Serialize;

use crate::core_codec::{AnchorId, SpatialAnchor};
use crate::core_transport::PeerId;

/// Prefix of locally generated anchor names
pub const ANCHOR_NAME_PREFIX: &str = "virtualObject";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AnchorOrigin {
    /// Created on this device
    Local,
    /// Received as a single anchor from a peer
    Peer(PeerId),
    /// Part of an applied world map
    Map,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnchorEntry {
    pub anchor: SpatialAnchor,
    pub origin: AnchorOrigin,
}

#[derive(Debug, Default)]
pub struct AnchorSet {
    entries: LinkedHashMap<AnchorId, AnchorEntry>,
    created: u64,
}

impl AnchorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Name for the next locally created anchor
    pub fn next_local_name(&mut self) -> String {
        let name = format!("{}{}", ANCHOR_NAME_PREFIX, self.created);
        self.created += 1;
        name
    }

    /// Insert unless an anchor with the same id is already present
    pub fn insert(&mut self, anchor: SpatialAnchor, origin: AnchorOrigin) -> bool {
        if self.entries.contains_key(&anchor.id) {
            return false;
        }
        self.entries.insert(anchor.id, AnchorEntry { anchor, origin });
        true
    }

    pub fn contains(&self, id: &AnchorId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &AnchorId) -> Option<&AnchorEntry> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnchorEntry> {
        self.entries.values()
    }

    pub fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a AnchorEntry> + 'a {
        self.entries.values().filter(move |entry| entry.anchor.name == name)
    }

    /// Anchors created on this device, oldest first
    pub fn local_anchors(&self) -> Vec<SpatialAnchor> {
        self.entries
            .values()
            .filter(|entry| entry.origin == AnchorOrigin::Local)
            .map(|entry| entry.anchor.clone())
            .collect()
    }

    /// Most recently created local anchor
    pub fn last_local(&self) -> Option<&SpatialAnchor> {
        self.entries
            .values()
            .rev()
            .find(|entry| entry.origin == AnchorOrigin::Local)
            .map(|entry| &entry.anchor)
    }

    /// Drop every anchor, keep the name counter
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop every anchor and restart naming at zero
    pub fn reset(&mut self) {
        self.entries.clear();
        self.created = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_codec::Transform;

    fn anchor(name: &str) -> SpatialAnchor {
        SpatialAnchor::new(name, Transform::IDENTITY)
    }

    #[test]
    fn test_names_are_sequential() {
        let mut set = AnchorSet::new();
        assert_eq!(set.next_local_name(), "virtualObject0");
        assert_eq!(set.next_local_name(), "virtualObject1");

        set.reset();
        assert_eq!(set.next_local_name(), "virtualObject0");
    }

    #[test]
    fn test_same_name_different_ids_coexist() {
        let mut set = AnchorSet::new();
        let peer = PeerId::generate();

        assert!(set.insert(anchor("virtualObject0"), AnchorOrigin::Local));
        assert!(set.insert(anchor("virtualObject0"), AnchorOrigin::Peer(peer)));

        let named: Vec<_> = set.named("virtualObject0").collect();
        assert_eq!(named.len(), 2);
        assert_eq!(named[0].origin, AnchorOrigin::Local);
        assert_eq!(named[1].origin, AnchorOrigin::Peer(peer));
    }

    #[test]
    fn test_duplicate_id_ignored() {
        let mut set = AnchorSet::new();
        let a = anchor("virtualObject0");

        assert!(set.insert(a.clone(), AnchorOrigin::Peer(PeerId::generate())));
        assert!(!set.insert(a, AnchorOrigin::Local));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_last_local_skips_peer_anchors() {
        let mut set = AnchorSet::new();
        let first = anchor("virtualObject0");
        let second = anchor("virtualObject1");

        set.insert(first, AnchorOrigin::Local);
        set.insert(second.clone(), AnchorOrigin::Local);
        set.insert(anchor("virtualObject0"), AnchorOrigin::Peer(PeerId::generate()));

        assert_eq!(set.last_local(), Some(&second));
        assert_eq!(set.local_anchors().len(), 2);
    }

    #[test]
    fn test_clear_keeps_counter() {
        let mut set = AnchorSet::new();
        set.next_local_name();
        set.insert(anchor("virtualObject0"), AnchorOrigin::Local);

        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.next_local_name(), "virtualObject1");
    }
}
