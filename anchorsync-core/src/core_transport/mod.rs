//! Peer transport
//!
//! Discovery, Noise-encrypted TCP connections and reliable delivery of
//! arbitrary-size messages between the peers of one session. The transport
//! knows nothing about anchors or maps; it moves opaque bytes tagged with
//! the sender's identity.

pub mod discovery;
pub mod errors;
pub mod framing;
pub mod metrics;
pub mod peer;
pub mod secure_channel;
pub mod transport_manager;

pub use discovery::{Beacon, DiscoveredPeer};
pub use errors::TransportError;
pub use peer::{PeerId, PeerInfo};
pub use transport_manager::{PeerLink, TransportCommand, TransportEvent, TransportHandle};
