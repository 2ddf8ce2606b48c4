/*
  TransportManager - peer connections for one session

  Owns every connection of the local node. Accepts and dials TCP, upgrades
  each socket through the secure channel (Noise XX + hello), and then keeps
  one reader task and one writer task per peer.

  Inputs (TransportCommand, via TransportHandle):
    - Start(local)        -> bind the listener, start discovery if enabled
    - Dial(addr)          -> connect to a known address
    - Broadcast(bytes)    -> queue to every connected peer
    - SendTo(peer, bytes) -> queue to one peer
    - Disconnect(peer), ConnectedPeers, Shutdown

  Outputs (TransportEvent):
    - Listening(addr)
    - PeerConnected(info)      emitted before any Received from that peer
    - Received { from, bytes } complete messages only, in per-peer order
    - PeerDisconnected(id)
    - Error(text)              bind and discovery failures, never fatal

  Internal Tasks:
  ┌──────────────┐   Connection   ┌──────────────┐
  │   Listener   │──────────────► │              │──► PeerConnected
  │ (accept loop)│                │    Actor     │
  ├──────────────┤   Discovered   │ (this loop)  │
  │  Discovery   │──────────────► │              │◄── Closed(conn_id)
  └──────────────┘                └──────┬───────┘
                                         │ bounded queue per peer
                            ┌────────────▼──┐   ┌──────────────┐
                            │  Writer Task  │   │ Reader Task  │──► Received
                            └───────────────┘   └──────────────┘

  A full send queue drops the message for that peer only; other peers are
  never blocked by a slow one. The first connection to a peer id wins, later
  ones are closed.
*/

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::discovery::{should_dial, DiscoveredPeer, Discovery};
use super::errors::TransportError;
use super::metrics;
use super::peer::{PeerId, PeerInfo};
use super::secure_channel::{establish, EstablishedChannel, Role, SecureReader, SecureWriter, StaticKeypair};
use crate::config::{DiscoveryConfig, TransportConfig};

const COMMAND_CHANNEL_CAPACITY: usize = 128;
const INTERNAL_CHANNEL_CAPACITY: usize = 128;

type Reply<T> = oneshot::Sender<Result<T, TransportError>>;
type ReadHalf = tokio::io::ReadHalf<TcpStream>;
type WriteHalf = tokio::io::WriteHalf<TcpStream>;

/// Commands sent to the transport actor
#[derive(Debug)]
pub enum TransportCommand {
    Start { local: PeerInfo, reply: Reply<SocketAddr> },
    Dial { addr: String, reply: Reply<PeerInfo> },
    Broadcast { bytes: Vec<u8>, reply: Reply<usize> },
    SendTo { peer: PeerId, bytes: Vec<u8>, reply: Reply<()> },
    ConnectedPeers(oneshot::Sender<Vec<PeerInfo>>),
    Disconnect(PeerId),
    Shutdown,
}

/// Events emitted by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Listening(SocketAddr),
    PeerConnected(PeerInfo),
    PeerDisconnected(PeerId),
    Received { from: PeerId, bytes: Vec<u8> },
    Error(String),
}

enum ConnectionOrigin {
    Accepted,
    Dialed(Reply<PeerInfo>),
    Discovered(PeerId),
}

enum Internal {
    Connection {
        result: Result<EstablishedChannel<TcpStream>, TransportError>,
        addr: String,
        origin: ConnectionOrigin,
    },
    Closed {
        peer: PeerId,
        conn_id: u64,
    },
}

/// Everything a connection task needs to secure a socket
struct ConnectionContext {
    keys: StaticKeypair,
    local: PeerInfo,
    service: String,
    max_message_size: usize,
    handshake_timeout: Duration,
}

impl ConnectionContext {
    async fn secure(&self, stream: TcpStream, role: Role) -> Result<EstablishedChannel<TcpStream>, TransportError> {
        stream.set_nodelay(true)?;
        let started = Instant::now();

        let outcome = tokio::time::timeout(
            self.handshake_timeout,
            establish(stream, role, &self.keys, &self.local, &self.service, self.max_message_size),
        )
        .await;

        match outcome {
            Ok(Ok(channel)) => {
                metrics::handshake_result("success");
                metrics::handshake_duration(started.elapsed().as_secs_f64());
                Ok(channel)
            }
            Ok(Err(e)) => {
                metrics::handshake_result("failed");
                Err(e)
            }
            Err(_) => {
                metrics::handshake_result("timeout");
                Err(TransportError::Timeout)
            }
        }
    }

    async fn dial(&self, addr: &str, connect_timeout: Duration) -> Result<EstablishedChannel<TcpStream>, TransportError> {
        let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Connect {
                addr: addr.to_string(),
                reason: "timed out".to_string(),
            })?
            .map_err(|e| TransportError::Connect {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;

        self.secure(stream, Role::Initiator).await
    }
}

struct PeerEntry {
    info: PeerInfo,
    conn_id: u64,
    queue: mpsc::Sender<Arc<Vec<u8>>>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl PeerEntry {
    fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

struct TransportManager {
    config: TransportConfig,
    discovery: DiscoveryConfig,
    event_tx: mpsc::Sender<TransportEvent>,
    internal_tx: mpsc::Sender<Internal>,
    discovered_tx: mpsc::Sender<DiscoveredPeer>,
    context: Option<Arc<ConnectionContext>>,
    listen_addr: Option<SocketAddr>,
    peers: HashMap<PeerId, PeerEntry>,
    dialing: HashSet<PeerId>,
    next_conn_id: u64,
    background: Vec<JoinHandle<()>>,
}

impl TransportManager {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<TransportCommand>,
        mut internal_rx: mpsc::Receiver<Internal>,
        mut discovered_rx: mpsc::Receiver<DiscoveredPeer>,
    ) {
        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(TransportCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(internal) = internal_rx.recv() => self.handle_internal(internal).await,
                Some(found) = discovered_rx.recv() => self.handle_discovered(found),
            }
        }

        self.stop();
    }

    async fn handle_command(&mut self, command: TransportCommand) {
        match command {
            TransportCommand::Start { local, reply } => {
                let result = self.handle_start(local).await;
                if let Err(e) = &result {
                    warn!(error = %e, "Transport failed to start");
                    self.emit(TransportEvent::Error(e.to_string())).await;
                }
                let _ = reply.send(result);
            }
            TransportCommand::Dial { addr, reply } => match self.context.clone() {
                Some(ctx) => self.spawn_dial(ctx, addr, ConnectionOrigin::Dialed(reply)),
                None => {
                    let _ = reply.send(Err(TransportError::NotStarted));
                }
            },
            TransportCommand::Broadcast { bytes, reply } => {
                let _ = reply.send(self.handle_broadcast(bytes));
            }
            TransportCommand::SendTo { peer, bytes, reply } => {
                let _ = reply.send(self.handle_send_to(peer, bytes));
            }
            TransportCommand::ConnectedPeers(reply) => {
                let _ = reply.send(self.peers.values().map(|entry| entry.info.clone()).collect());
            }
            TransportCommand::Disconnect(peer) => {
                if let Some(entry) = self.peers.remove(&peer) {
                    entry.abort();
                    info!(peer = %entry.info, "Disconnected peer");
                    metrics::set_active_peers(self.peers.len());
                    self.emit(TransportEvent::PeerDisconnected(peer)).await;
                }
            }
            TransportCommand::Shutdown => {}
        }
    }

    async fn handle_start(&mut self, local: PeerInfo) -> Result<SocketAddr, TransportError> {
        if let Some(addr) = self.listen_addr {
            debug!(addr = %addr, "Transport already started");
            return Ok(addr);
        }

        let bind_addr = self.config.listen_address;
        let listener = TcpListener::bind(bind_addr).await.map_err(|e| TransportError::Bind {
            addr: bind_addr.to_string(),
            reason: e.to_string(),
        })?;
        let addr = listener.local_addr()?;

        let ctx = Arc::new(ConnectionContext {
            keys: StaticKeypair::generate()?,
            local: local.clone(),
            service: self.config.service_name.clone(),
            max_message_size: self.config.max_message_size,
            handshake_timeout: self.config.handshake_timeout,
        });

        self.background
            .push(spawn_accept_loop(listener, ctx.clone(), self.internal_tx.clone()));

        if self.discovery.enabled {
            let discovery = Discovery::new(
                self.discovery.clone(),
                self.config.service_name.clone(),
                local.clone(),
                addr.port(),
            );
            match discovery.bind().await {
                Ok(socket) => {
                    self.background.push(discovery.spawn(socket, self.discovered_tx.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "Discovery unavailable, only direct dials will connect");
                    self.emit(TransportEvent::Error(format!("Discovery unavailable: {}", e)))
                        .await;
                }
            }
        }

        self.context = Some(ctx);
        self.listen_addr = Some(addr);

        info!(
            addr = %addr,
            peer = %local,
            service = %self.config.service_name,
            "Transport listening"
        );
        self.emit(TransportEvent::Listening(addr)).await;

        Ok(addr)
    }

    fn spawn_dial(&self, ctx: Arc<ConnectionContext>, addr: String, origin: ConnectionOrigin) {
        let internal_tx = self.internal_tx.clone();
        let connect_timeout = self.config.connect_timeout;

        tokio::spawn(async move {
            let result = ctx.dial(&addr, connect_timeout).await;
            let _ = internal_tx
                .send(Internal::Connection { result, addr, origin })
                .await;
        });
    }

    fn handle_discovered(&mut self, found: DiscoveredPeer) {
        let ctx = match &self.context {
            Some(ctx) => ctx.clone(),
            None => return,
        };

        let id = found.peer.id;
        if self.peers.contains_key(&id) || self.dialing.contains(&id) || !should_dial(ctx.local.id, id) {
            return;
        }

        debug!(peer = %found.peer, addr = %found.addr, "Dialing discovered peer");
        self.dialing.insert(id);
        self.spawn_dial(ctx, found.addr.to_string(), ConnectionOrigin::Discovered(id));
    }

    async fn handle_internal(&mut self, internal: Internal) {
        match internal {
            Internal::Connection { result, addr, origin } => {
                self.handle_connection(result, addr, origin).await;
            }
            Internal::Closed { peer, conn_id } => {
                let current = self.peers.get(&peer).map(|entry| entry.conn_id);
                if current != Some(conn_id) {
                    return;
                }
                if let Some(entry) = self.peers.remove(&peer) {
                    entry.abort();
                    info!(peer = %entry.info, "Peer disconnected");
                    metrics::set_active_peers(self.peers.len());
                    self.emit(TransportEvent::PeerDisconnected(peer)).await;
                }
            }
        }
    }

    async fn handle_connection(
        &mut self,
        result: Result<EstablishedChannel<TcpStream>, TransportError>,
        addr: String,
        origin: ConnectionOrigin,
    ) {
        let reply = match origin {
            ConnectionOrigin::Accepted => None,
            ConnectionOrigin::Dialed(reply) => Some(reply),
            ConnectionOrigin::Discovered(id) => {
                self.dialing.remove(&id);
                None
            }
        };

        let channel = match result {
            Ok(channel) => channel,
            Err(e) => {
                warn!(addr = %addr, error = %e, "Connection setup failed");
                if let Some(reply) = reply {
                    let _ = reply.send(Err(e));
                }
                return;
            }
        };

        let EstablishedChannel { remote, reader, writer } = channel;

        if self.peers.contains_key(&remote.id) {
            metrics::duplicate_connection();
            info!(peer = %remote, addr = %addr, "Closing duplicate connection");
            if let Some(reply) = reply {
                let _ = reply.send(Err(TransportError::DuplicatePeer(remote.id)));
            }
            return;
        }

        let conn_id = self.next_conn_id;
        self.next_conn_id += 1;

        let (queue_tx, queue_rx) = mpsc::channel(self.config.send_queue_capacity);
        let writer = tokio::spawn(run_writer(
            remote.id,
            conn_id,
            writer,
            queue_rx,
            self.internal_tx.clone(),
        ));

        info!(peer = %remote, addr = %addr, "Peer connected");
        self.emit(TransportEvent::PeerConnected(remote.clone())).await;

        // Reader starts after PeerConnected so no message can overtake it
        let reader = tokio::spawn(run_reader(
            remote.id,
            conn_id,
            reader,
            self.event_tx.clone(),
            self.internal_tx.clone(),
        ));

        self.peers.insert(
            remote.id,
            PeerEntry {
                info: remote.clone(),
                conn_id,
                queue: queue_tx,
                reader,
                writer,
            },
        );
        metrics::set_active_peers(self.peers.len());

        if let Some(reply) = reply {
            let _ = reply.send(Ok(remote));
        }
    }

    fn check_size(&self, len: usize) -> Result<(), TransportError> {
        if len > self.config.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: len,
                max_size: self.config.max_message_size,
            });
        }
        Ok(())
    }

    fn handle_broadcast(&mut self, bytes: Vec<u8>) -> Result<usize, TransportError> {
        self.check_size(bytes.len())?;

        let payload = Arc::new(bytes);
        let mut queued = 0;
        for entry in self.peers.values() {
            match entry.queue.try_send(payload.clone()) {
                Ok(()) => queued += 1,
                Err(TrySendError::Full(_)) => {
                    metrics::send_queue_full();
                    warn!(peer = %entry.info, size = payload.len(), "Send queue full, dropping message");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(peer = %entry.info, "Writer closed, dropping message");
                }
            }
        }

        debug!(size = payload.len(), peers = queued, "Broadcast queued");
        Ok(queued)
    }

    fn handle_send_to(&mut self, peer: PeerId, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.check_size(bytes.len())?;

        let entry = self.peers.get(&peer).ok_or(TransportError::PeerNotFound(peer))?;
        match entry.queue.try_send(Arc::new(bytes)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                metrics::send_queue_full();
                Err(TransportError::QueueFull(peer))
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::ConnectionClosed),
        }
    }

    async fn emit(&self, event: TransportEvent) {
        if self.event_tx.send(event).await.is_err() {
            debug!("Transport event receiver dropped");
        }
    }

    fn stop(&mut self) {
        for task in self.background.drain(..) {
            task.abort();
        }
        for (_, entry) in self.peers.drain() {
            entry.abort();
        }
        metrics::set_active_peers(0);
        info!("Transport stopped");
    }
}

fn spawn_accept_loop(
    listener: TcpListener,
    ctx: Arc<ConnectionContext>,
    internal_tx: mpsc::Sender<Internal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let ctx = ctx.clone();
                    let internal_tx = internal_tx.clone();
                    tokio::spawn(async move {
                        let result = ctx.secure(stream, Role::Responder).await;
                        let _ = internal_tx
                            .send(Internal::Connection {
                                result,
                                addr: addr.to_string(),
                                origin: ConnectionOrigin::Accepted,
                            })
                            .await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            }
        }
    })
}

async fn run_writer(
    peer: PeerId,
    conn_id: u64,
    mut writer: SecureWriter<WriteHalf>,
    mut queue: mpsc::Receiver<Arc<Vec<u8>>>,
    internal_tx: mpsc::Sender<Internal>,
) {
    while let Some(message) = queue.recv().await {
        if let Err(e) = writer.send(&message).await {
            warn!(peer = %peer, error = %e, "Send failed");
            break;
        }
        metrics::message_sent(message.len());
    }

    let _ = writer.shutdown().await;
    let _ = internal_tx.send(Internal::Closed { peer, conn_id }).await;
}

async fn run_reader(
    peer: PeerId,
    conn_id: u64,
    mut reader: SecureReader<ReadHalf>,
    event_tx: mpsc::Sender<TransportEvent>,
    internal_tx: mpsc::Sender<Internal>,
) {
    loop {
        match reader.recv().await {
            Ok(Some(bytes)) => {
                metrics::message_received(bytes.len());
                if event_tx.send(TransportEvent::Received { from: peer, bytes }).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                debug!(peer = %peer, "Connection closed by peer");
                break;
            }
            Err(e) => {
                warn!(peer = %peer, error = %e, "Receive failed, closing connection");
                break;
            }
        }
    }

    let _ = internal_tx.send(Internal::Closed { peer, conn_id }).await;
}

/// Handle to the transport actor
#[derive(Clone)]
pub struct TransportHandle {
    command_tx: mpsc::Sender<TransportCommand>,
}

impl TransportHandle {
    /// Create the transport and spawn its actor
    pub fn new(
        config: TransportConfig,
        discovery: DiscoveryConfig,
    ) -> (Self, mpsc::Receiver<TransportEvent>, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let (internal_tx, internal_rx) = mpsc::channel(INTERNAL_CHANNEL_CAPACITY);
        let (discovered_tx, discovered_rx) = mpsc::channel(INTERNAL_CHANNEL_CAPACITY);

        let manager = TransportManager {
            config,
            discovery,
            event_tx,
            internal_tx,
            discovered_tx,
            context: None,
            listen_addr: None,
            peers: HashMap::new(),
            dialing: HashSet::new(),
            next_conn_id: 1,
            background: Vec::new(),
        };

        let task = tokio::spawn(manager.run(command_rx, internal_rx, discovered_rx));

        (TransportHandle { command_tx }, event_rx, task)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> TransportCommand,
    ) -> Result<T, TransportError> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(build(reply))
            .await
            .map_err(|_| TransportError::Stopped)?;
        response.await.map_err(|_| TransportError::Stopped)?
    }

    /// Start listening (and advertising). Returns the bound address.
    pub async fn start(&self, local: PeerInfo) -> Result<SocketAddr, TransportError> {
        self.request(|reply| TransportCommand::Start { local, reply }).await
    }

    /// Connect to a peer at a known address
    pub async fn dial(&self, addr: impl Into<String>) -> Result<PeerInfo, TransportError> {
        let addr = addr.into();
        self.request(|reply| TransportCommand::Dial { addr, reply }).await
    }

    /// Queue `bytes` to every connected peer. Returns how many peers accepted it.
    pub async fn broadcast(&self, bytes: Vec<u8>) -> Result<usize, TransportError> {
        self.request(|reply| TransportCommand::Broadcast { bytes, reply }).await
    }

    pub async fn send_to(&self, peer: PeerId, bytes: Vec<u8>) -> Result<(), TransportError> {
        self.request(|reply| TransportCommand::SendTo { peer, bytes, reply }).await
    }

    pub async fn connected_peers(&self) -> Result<Vec<PeerInfo>, TransportError> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(TransportCommand::ConnectedPeers(reply))
            .await
            .map_err(|_| TransportError::Stopped)?;
        response.await.map_err(|_| TransportError::Stopped)
    }

    pub async fn disconnect(&self, peer: PeerId) -> Result<(), TransportError> {
        self.command_tx
            .send(TransportCommand::Disconnect(peer))
            .await
            .map_err(|_| TransportError::Stopped)
    }

    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(TransportCommand::Shutdown).await;
    }
}

/// Outbound side of the transport as seen by the session
#[async_trait]
pub trait PeerLink: Send + Sync {
    async fn broadcast(&self, bytes: Vec<u8>) -> Result<usize, TransportError>;

    async fn send_to(&self, peer: PeerId, bytes: Vec<u8>) -> Result<(), TransportError>;
}

#[async_trait]
impl PeerLink for TransportHandle {
    async fn broadcast(&self, bytes: Vec<u8>) -> Result<usize, TransportError> {
        TransportHandle::broadcast(self, bytes).await
    }

    async fn send_to(&self, peer: PeerId, bytes: Vec<u8>) -> Result<(), TransportError> {
        TransportHandle::send_to(self, peer, bytes).await
    }
}
