/*
  Discovery - UDP beacons under a well-known service name

  Every node periodically broadcasts a small JSON beacon:

      { "service": "arsketchsession", "peer": {..PeerInfo..}, "tcp_port": 7420 }

  and listens on the same port for beacons from others. Beacons with a
  different service name, or our own, are ignored. Matching beacons are
  handed to the transport actor, which dials only when the local peer id
  is lower than the remote one, so two nodes that see each other open a
  single connection.

  Failing to bind the discovery port is reported and discovery is skipped;
  peers can still be dialed directly.
*/

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::errors::TransportError;
use super::metrics;
use super::peer::{PeerId, PeerInfo};
use crate::config::DiscoveryConfig;

const MAX_BEACON_SIZE: usize = 2048;

/// Advertisement broadcast by every node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Beacon {
    pub service: String,
    pub peer: PeerInfo,
    pub tcp_port: u16,
}

/// A peer seen through its beacon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    pub peer: PeerInfo,
    pub addr: SocketAddr,
}

/// Only the lower id dials, so each pair gets one connection
pub fn should_dial(local: PeerId, remote: PeerId) -> bool {
    local < remote
}

/// Parse a beacon and decide whether it is relevant to us
pub fn accept_beacon(
    bytes: &[u8],
    from: SocketAddr,
    service: &str,
    local: PeerId,
) -> Option<DiscoveredPeer> {
    let beacon: Beacon = match serde_json::from_slice(bytes) {
        Ok(beacon) => beacon,
        Err(e) => {
            trace!(from = %from, error = %e, "Ignoring malformed beacon");
            return None;
        }
    };

    if beacon.service != service || beacon.peer.id == local {
        return None;
    }

    Some(DiscoveredPeer {
        addr: SocketAddr::new(from.ip(), beacon.tcp_port),
        peer: beacon.peer,
    })
}

/// Beacon sender and listener
pub struct Discovery {
    config: DiscoveryConfig,
    beacon: Beacon,
}

impl Discovery {
    pub fn new(config: DiscoveryConfig, service: String, local: PeerInfo, tcp_port: u16) -> Self {
        Discovery {
            config,
            beacon: Beacon {
                service,
                peer: local,
                tcp_port,
            },
        }
    }

    /// Bind the discovery socket
    pub async fn bind(&self) -> Result<UdpSocket, TransportError> {
        let addr = SocketAddr::new(self.config.bind_address, self.config.port);
        let socket = UdpSocket::bind(addr).await.map_err(|e| TransportError::Bind {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;
        socket.set_broadcast(true)?;
        Ok(socket)
    }

    /// Run the beacon loop until the task is aborted
    pub fn spawn(self, socket: UdpSocket, found_tx: mpsc::Sender<DiscoveredPeer>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(socket, found_tx).await })
    }

    async fn run(self, socket: UdpSocket, found_tx: mpsc::Sender<DiscoveredPeer>) {
        let target = SocketAddr::new(self.config.broadcast_address, self.config.port);
        let payload = match serde_json::to_vec(&self.beacon) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize discovery beacon");
                return;
            }
        };

        let mut ticker = tokio::time::interval(self.config.beacon_interval);
        let mut buf = vec![0u8; MAX_BEACON_SIZE];

        debug!(
            service = %self.beacon.service,
            target = %target,
            "Discovery started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = socket.send_to(&payload, target).await {
                        debug!(target = %target, error = %e, "Failed to send beacon");
                    }
                }
                received = socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, from)) => {
                            let local = self.beacon.peer.id;
                            if let Some(found) = accept_beacon(&buf[..len], from, &self.beacon.service, local) {
                                metrics::beacon_received();
                                if found_tx.send(found).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            debug!(error = %e, "Discovery receive failed");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
            }
        }

        debug!("Discovery stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn beacon_bytes(service: &str, peer: &PeerInfo, port: u16) -> Vec<u8> {
        serde_json::to_vec(&Beacon {
            service: service.to_string(),
            peer: peer.clone(),
            tcp_port: port,
        })
        .unwrap()
    }

    #[test]
    fn test_accept_matching_beacon() {
        let local = PeerInfo::new("local");
        let remote = PeerInfo::new("remote");
        let from: SocketAddr = "192.168.1.20:7421".parse().unwrap();

        let found = accept_beacon(&beacon_bytes("arsketchsession", &remote, 7420), from, "arsketchsession", local.id)
            .unwrap();

        assert_eq!(found.peer, remote);
        assert_eq!(found.addr, "192.168.1.20:7420".parse().unwrap());
    }

    #[test]
    fn test_ignore_other_service() {
        let local = PeerInfo::new("local");
        let remote = PeerInfo::new("remote");
        let from: SocketAddr = "10.0.0.2:7421".parse().unwrap();

        assert!(accept_beacon(&beacon_bytes("other", &remote, 7420), from, "arsketchsession", local.id).is_none());
    }

    #[test]
    fn test_ignore_own_beacon() {
        let local = PeerInfo::new("local");
        let from: SocketAddr = "10.0.0.2:7421".parse().unwrap();

        assert!(accept_beacon(&beacon_bytes("arsketchsession", &local, 7420), from, "arsketchsession", local.id).is_none());
    }

    #[test]
    fn test_ignore_garbage() {
        let from: SocketAddr = "10.0.0.2:7421".parse().unwrap();
        assert!(accept_beacon(b"\x00\x01not json", from, "arsketchsession", PeerId::generate()).is_none());
    }

    #[test]
    fn test_exactly_one_side_dials() {
        let a = PeerId::generate();
        let b = PeerId::generate();

        assert_ne!(should_dial(a, b), should_dial(b, a));
        assert!(!should_dial(a, a));
    }
}
