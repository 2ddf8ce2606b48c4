/*
  SyncNode - one participant in a shared sketching session

  Wires the three actors together:

      tracking backend ──TrackingEvent──┐
                                        ▼
      TransportHandle ──TransportEvent─► SessionHandle ──► SessionEvent subscribers
            ▲                               │
            └──────── PeerLink (send) ──────┘

  The tracking backend is the simulated one; a device build would pass its
  own TrackingBackend implementation to SessionHandle::spawn instead.
*/

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::{Config, ConfigError};
use crate::core_session::{self, SessionHandle};
use crate::core_storage::MapStore;
use crate::core_tracking::SimulatedTracking;
use crate::core_transport::{self, PeerInfo, TransportError, TransportHandle};

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A running node: transport, session and tracking backend
pub struct SyncNode {
    local: PeerInfo,
    listen_addr: SocketAddr,
    transport: TransportHandle,
    session: SessionHandle,
    tracking: Arc<SimulatedTracking>,
    actors: Vec<JoinHandle<()>>,
    forwarders: Vec<JoinHandle<()>>,
}

impl SyncNode {
    /// Validate `config`, spawn every actor and start listening
    pub async fn start(config: Config, display_name: impl Into<String>) -> Result<Self, NodeError> {
        config.validate()?;

        core_transport::metrics::init_metrics();
        core_session::metrics::init_metrics();

        let local = PeerInfo::new(display_name);
        let (transport, mut transport_events, transport_task) =
            TransportHandle::new(config.transport.clone(), config.discovery.clone());
        let (tracking, mut tracking_events) = SimulatedTracking::new();
        let tracking = Arc::new(tracking);
        let store = MapStore::new(config.storage.map_path());

        let (session, session_task) = SessionHandle::spawn(
            config.session.clone(),
            tracking.clone(),
            Arc::new(transport.clone()),
            store,
        );

        let mut forwarders = Vec::with_capacity(2);

        let to_session = session.clone();
        forwarders.push(tokio::spawn(async move {
            while let Some(event) = transport_events.recv().await {
                if to_session.transport_event(event).await.is_err() {
                    break;
                }
            }
            debug!("Transport event forwarding stopped");
        }));

        let to_session = session.clone();
        forwarders.push(tokio::spawn(async move {
            while let Some(event) = tracking_events.recv().await {
                if to_session.tracking_event(event).await.is_err() {
                    break;
                }
            }
            debug!("Tracking event forwarding stopped");
        }));

        let mut node = SyncNode {
            local: local.clone(),
            listen_addr: config.transport.listen_address,
            transport,
            session,
            tracking,
            actors: vec![transport_task, session_task],
            forwarders,
        };

        match node.transport.start(local).await {
            Ok(addr) => node.listen_addr = addr,
            Err(e) => {
                node.shutdown().await;
                return Err(e.into());
            }
        }

        info!(
            peer = %node.local,
            addr = %node.listen_addr,
            service = %config.transport.service_name,
            "Node started"
        );
        Ok(node)
    }

    pub fn local(&self) -> &PeerInfo {
        &self.local
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn transport(&self) -> &TransportHandle {
        &self.transport
    }

    /// Driver for the simulated tracking backend
    pub fn tracking(&self) -> &Arc<SimulatedTracking> {
        &self.tracking
    }

    /// Connect to a peer whose address is already known
    pub async fn dial(&self, addr: impl Into<String>) -> Result<PeerInfo, NodeError> {
        Ok(self.transport.dial(addr).await?)
    }

    /// Stop the session and the transport, then wait for both actors
    pub async fn shutdown(self) {
        self.session.shutdown().await;
        self.transport.shutdown().await;

        for actor in self.actors {
            let _ = actor.await;
        }
        for forwarder in self.forwarders {
            forwarder.abort();
        }
        info!(peer = %self.local, "Node stopped");
    }
}
