//! Peer-to-peer anchor replication for shared AR sketching sessions
//!
//! Nodes on the same network find each other by service name, open
//! encrypted connections, and exchange two kinds of blobs: single line
//! anchors as they are drawn, and whole world maps that let a peer
//! relocalize into the sender's coordinate frame.

pub mod config;
pub mod core_codec;
pub mod core_session;
pub mod core_storage;
pub mod core_tracking;
pub mod core_transport;
pub mod logging;
pub mod node;

pub use config::Config;
pub use core_codec::{Point3, SpatialAnchor, WorldMap};
pub use core_session::{SessionError, SessionEvent, SessionHandle, SessionState};
pub use logging::{init_logging, LogLevel};
pub use node::{NodeError, SyncNode};
