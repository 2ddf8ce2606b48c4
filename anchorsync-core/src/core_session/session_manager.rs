/*
  SessionManager - the session actor

  Owns the Reconciler and serializes every mutation onto one command queue:
  UI actions (sketch, save, load, share, reset), tracking updates and
  transport events all arrive as SessionCommands.

  Workflow:
  1. UI commands are validated against the current state and answered on a
     oneshot reply channel.
  2. World-map capture, encoding and decoding never run on the queue:
     capture is awaited in a spawned task, encode/decode run on the
     blocking pool, and decoded maps come back as an internal command.
  3. Inbound blobs are classified by envelope. Anchors are decoded inline
     (they are small); world maps are decoded in the background and anchors
     that arrive meanwhile are dropped. A decoded map older than one already
     applied from the same source is discarded.
  4. Newly connected peers receive the anchors created on this device.
  5. Outbound traffic goes through a single FIFO worker that owns the
     PeerLink. The actor only enqueues, so it never waits on the transport
     while the transport waits on it.

  Outputs:
    SessionEvents broadcast to every subscriber (state changes, status text,
    anchors, alerts). A saved map that cannot be decoded emits Fatal and
    stops the actor.
*/

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::anchors::{AnchorEntry, AnchorOrigin};
use super::errors::SessionError;
use super::events::{SessionEvent, SessionEvents};
use super::metrics;
use super::reconciler::{AnchorVerdict, Reconciler};
use super::state::{MapSource, SessionState};
use crate::config::SessionConfig;
use crate::core_codec::{anchor as anchor_codec, world_map, Envelope, MessageKind, Point3, SpatialAnchor, WorldMap};
use crate::core_storage::{MapStore, PersistenceError};
use crate::core_tracking::{TrackingBackend, TrackingEvent, TrackingStatus};
use crate::core_transport::{PeerId, PeerInfo, PeerLink, TransportError, TransportEvent};

const INTERNAL_CHANNEL_CAPACITY: usize = 16;
const REPLAY_RETRIES: u32 = 50;
const REPLAY_BACKOFF: Duration = Duration::from_millis(20);

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Commands accepted by the session actor
#[derive(Debug)]
pub enum SessionCommand {
    Sketch {
        source: Point3,
        destination: Point3,
        reply: Reply<SpatialAnchor>,
    },
    SaveExperience {
        reply: Reply<PathBuf>,
    },
    LoadExperience {
        reply: Reply<()>,
    },
    ShareWorldMap {
        reply: Reply<usize>,
    },
    Reset {
        reply: Reply<()>,
    },
    Status(oneshot::Sender<SessionStatus>),
    Tracking(TrackingEvent),
    Transport(TransportEvent),
    Shutdown,
}

/// Point-in-time view of the session
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub state: SessionState,
    pub tracking: TrackingStatus,
    pub anchors: Vec<AnchorEntry>,
    pub peers: Vec<PeerInfo>,
    pub has_snapshot: bool,
    pub maps_in_flight: usize,
    pub save_available: bool,
}

enum Internal {
    MapDecoded {
        source: MapSource,
        seq: u64,
        result: Result<WorldMap, SessionError>,
        reply: Option<Reply<()>>,
    },
}

/// Work for the outbound worker, sent in the order it must go out
enum Outbound {
    Broadcast {
        bytes: Vec<u8>,
        reply: Option<oneshot::Sender<Result<usize, TransportError>>>,
    },
    SendTo {
        peer: PeerId,
        bytes: Vec<u8>,
    },
}

struct SessionManager {
    config: SessionConfig,
    reconciler: Reconciler,
    backend: Arc<dyn TrackingBackend>,
    outbound: mpsc::UnboundedSender<Outbound>,
    store: MapStore,
    events: SessionEvents,
    internal_tx: mpsc::Sender<Internal>,
    peers: HashMap<PeerId, PeerInfo>,
    save_available: bool,
}

impl SessionManager {
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<SessionCommand>,
        mut internal_rx: mpsc::Receiver<Internal>,
    ) {
        loop {
            let flow = tokio::select! {
                command = command_rx.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(internal) = internal_rx.recv() => self.handle_internal(internal).await,
            };

            if flow.is_break() {
                break;
            }
        }

        info!("Session stopped");
    }

    async fn handle_command(&mut self, command: SessionCommand) -> ControlFlow<()> {
        match command {
            SessionCommand::Sketch {
                source,
                destination,
                reply,
            } => {
                let result = self.handle_sketch(source, destination).await;
                let _ = reply.send(result);
            }
            SessionCommand::SaveExperience { reply } => self.handle_save(reply).await,
            SessionCommand::LoadExperience { reply } => self.handle_load(reply),
            SessionCommand::ShareWorldMap { reply } => self.handle_share(reply),
            SessionCommand::Reset { reply } => {
                self.handle_reset().await;
                let _ = reply.send(Ok(()));
            }
            SessionCommand::Status(reply) => {
                let _ = reply.send(self.status());
            }
            SessionCommand::Tracking(event) => self.handle_tracking(event).await,
            SessionCommand::Transport(event) => self.handle_transport(event).await,
            SessionCommand::Shutdown => {}
        }
        ControlFlow::Continue(())
    }

    async fn handle_internal(&mut self, internal: Internal) -> ControlFlow<()> {
        match internal {
            Internal::MapDecoded {
                source,
                seq,
                result,
                reply,
            } => self.handle_map_decoded(source, seq, result, reply).await,
        }
    }

    async fn handle_sketch(
        &mut self,
        source: Point3,
        destination: Point3,
    ) -> Result<SpatialAnchor, SessionError> {
        let anchor = self.reconciler.create_local_anchor(source, destination)?;

        self.backend.add_anchor(anchor.clone()).await;
        metrics::anchor_created();
        metrics::set_session_anchors(self.reconciler.anchors().len());
        debug!(anchor = %anchor.name, id = %anchor.id, "Created anchor");

        self.events.emit(SessionEvent::AnchorAdded {
            anchor: anchor.clone(),
            origin: AnchorOrigin::Local,
        });

        match anchor_codec::encode(&anchor) {
            Ok(bytes) => self.send_outbound(Outbound::Broadcast { bytes, reply: None }),
            Err(e) => warn!(anchor = %anchor.name, error = %e, "Failed to encode anchor"),
        }

        self.refresh_save_availability().await;
        Ok(anchor)
    }

    async fn ensure_save_allowed(&self) -> Result<(), SessionError> {
        if let Some(last) = self.reconciler.check_save()? {
            if !self.backend.contains_anchor(last).await {
                return Err(SessionError::SaveUnavailable(
                    "latest anchor is not tracked yet".to_string(),
                ));
            }
        }
        Ok(())
    }

    async fn refresh_save_availability(&mut self) {
        let available = self.ensure_save_allowed().await.is_ok();
        if available != self.save_available {
            self.save_available = available;
            self.events.emit(SessionEvent::SaveAvailability(available));
        }
    }

    async fn handle_save(&mut self, reply: Reply<PathBuf>) {
        if let Err(e) = self.ensure_save_allowed().await {
            debug!(error = %e, "Save refused");
            let _ = reply.send(Err(e));
            return;
        }

        let backend = self.backend.clone();
        let store = self.store.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = save_experience(backend, store, &events).await;
            let _ = reply.send(result);
        });
    }

    fn handle_share(&mut self, reply: Reply<usize>) {
        let backend = self.backend.clone();
        let outbound = self.outbound.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = share_world_map(backend, outbound, &events).await;
            let _ = reply.send(result);
        });
    }

    fn send_outbound(&self, item: Outbound) {
        if self.outbound.send(item).is_err() {
            warn!("Outbound worker stopped, dropping message");
        }
    }

    fn handle_load(&mut self, reply: Reply<()>) {
        let seq = self.reconciler.map_decode_started();

        let store = self.store.clone();
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let result = match tokio::task::spawn_blocking(move || load_local_map(&store)).await {
                Ok(result) => result,
                Err(e) => Err(e.into()),
            };
            let _ = internal_tx
                .send(Internal::MapDecoded {
                    source: MapSource::Local,
                    seq,
                    result,
                    reply: Some(reply),
                })
                .await;
        });
    }

    async fn handle_map_decoded(
        &mut self,
        source: MapSource,
        seq: u64,
        result: Result<WorldMap, SessionError>,
        reply: Option<Reply<()>>,
    ) -> ControlFlow<()> {
        self.reconciler.map_decode_finished();

        match result {
            Ok(map) => {
                if self.reconciler.claim_map(source, seq) {
                    self.apply_map(source, map).await;
                } else {
                    debug!(source = %source, seq, "Discarding stale world map");
                    metrics::map_discarded();
                }
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(()));
                }
                ControlFlow::Continue(())
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, "Saved world map is unusable, stopping session");
                metrics::decode_failure("local_map");
                self.events.emit(SessionEvent::Fatal(e.to_string()));
                if let Some(reply) = reply {
                    let _ = reply.send(Err(e));
                }
                ControlFlow::Break(())
            }
            Err(e) => {
                match source {
                    MapSource::Peer(from) => {
                        warn!(peer = %from, error = %e, "Discarding undecodable world map");
                        metrics::decode_failure("world_map");
                    }
                    MapSource::Local => warn!(error = %e, "Failed to load saved map"),
                }
                if let Some(reply) = reply {
                    let _ = reply.send(Err(e));
                }
                ControlFlow::Continue(())
            }
        }
    }

    async fn apply_map(&mut self, source: MapSource, map: WorldMap) {
        let anchors = map.anchors.len();
        let (tracking_data, map_anchors) = self.reconciler.apply_map(source, map);
        let generation = self.backend.run_with_map(tracking_data, map_anchors).await;
        self.reconciler.set_tracking_generation(generation);

        info!(source = %source, anchors, "Applied world map, relocalizing");
        metrics::map_applied(match source {
            MapSource::Local => "local",
            MapSource::Peer(_) => "peer",
        });
        metrics::set_session_anchors(self.reconciler.anchors().len());

        self.events.emit(SessionEvent::AnchorsCleared);
        self.events.emit(SessionEvent::MapApplied { source, anchors });
        self.events.emit(SessionEvent::StateChanged(self.reconciler.state()));
        self.events.emit(SessionEvent::SketchAvailability(false));
        self.refresh_save_availability().await;
    }

    async fn handle_reset(&mut self) {
        self.reconciler.reset();
        let generation = self.backend.reset().await;
        self.reconciler.set_tracking_generation(generation);

        info!("Session reset");
        metrics::set_session_anchors(0);

        self.events.emit(SessionEvent::AnchorsCleared);
        self.events.emit(SessionEvent::StateChanged(SessionState::Idle));
        self.events.emit(SessionEvent::SketchAvailability(true));
        self.refresh_save_availability().await;
    }

    async fn handle_tracking(&mut self, event: TrackingEvent) {
        match event {
            TrackingEvent::StatusChanged { status, generation } => {
                if self.reconciler.is_stale(generation) {
                    debug!(
                        generation,
                        current = self.reconciler.tracking_generation(),
                        "Ignoring status from a previous tracking run"
                    );
                    return;
                }
                if let Some(state) = self.reconciler.update_tracking(status, generation) {
                    info!(state = %state, "Relocalized");
                    self.events.emit(SessionEvent::StateChanged(state));
                    self.events.emit(SessionEvent::SketchAvailability(true));
                }
                self.events.emit(SessionEvent::StatusText(status.status_text()));
                self.refresh_save_availability().await;
            }
            TrackingEvent::Interrupted => {
                info!("Tracking interrupted");
                self.events
                    .emit(SessionEvent::Message("Session was interrupted".to_string()));
            }
            TrackingEvent::InterruptionEnded => {
                info!("Tracking interruption ended");
                self.events
                    .emit(SessionEvent::Message("Session interruption ended".to_string()));
            }
            TrackingEvent::Failed(reason) => {
                warn!(reason = %reason, "Tracking failed");
                self.events
                    .emit(SessionEvent::Message(format!("Session failed: {}", reason)));
            }
        }
    }

    async fn handle_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Listening(addr) => {
                self.events
                    .emit(SessionEvent::Message(format!("Listening on {}", addr)));
            }
            TransportEvent::PeerConnected(info) => {
                info!(peer = %info, "Peer joined session");
                self.peers.insert(info.id, info.clone());
                self.events.emit(SessionEvent::PeerJoined(info.clone()));
                if self.config.replay_anchors_on_connect {
                    self.replay_anchors(info.id);
                }
            }
            TransportEvent::PeerDisconnected(id) => {
                if let Some(info) = self.peers.remove(&id) {
                    info!(peer = %info, "Peer left session");
                }
                self.events.emit(SessionEvent::PeerLeft(id));
            }
            TransportEvent::Received { from, bytes } => self.handle_blob(from, bytes).await,
            TransportEvent::Error(message) => {
                self.events.alert("Connection problem", message);
            }
        }
    }

    async fn handle_blob(&mut self, from: PeerId, bytes: Vec<u8>) {
        match Envelope::classify(&bytes) {
            Ok(MessageKind::WorldMap) => {
                let seq = self.reconciler.map_decode_started();
                debug!(peer = %from, size = bytes.len(), seq, "Received world map");

                let internal_tx = self.internal_tx.clone();
                tokio::spawn(async move {
                    let result =
                        match tokio::task::spawn_blocking(move || world_map::decode_vec(bytes)).await {
                            Ok(decoded) => decoded.map_err(SessionError::from),
                            Err(e) => Err(e.into()),
                        };
                    let _ = internal_tx
                        .send(Internal::MapDecoded {
                            source: MapSource::Peer(from),
                            seq,
                            result,
                            reply: None,
                        })
                        .await;
                });
            }
            Ok(MessageKind::Anchor) => match anchor_codec::decode(&bytes) {
                Ok(anchor) => self.handle_peer_anchor(from, anchor).await,
                Err(e) => {
                    warn!(peer = %from, error = %e, "Discarding undecodable anchor");
                    metrics::decode_failure("anchor");
                }
            },
            Err(e) => {
                warn!(peer = %from, size = bytes.len(), error = %e, "Discarding unrecognized message");
                metrics::decode_failure("unknown");
            }
        }
    }

    async fn handle_peer_anchor(&mut self, from: PeerId, anchor: SpatialAnchor) {
        match self.reconciler.receive_anchor(from, anchor.clone()) {
            AnchorVerdict::Applied => {
                self.backend.add_anchor(anchor.clone()).await;
                metrics::anchor_applied();
                metrics::set_session_anchors(self.reconciler.anchors().len());
                debug!(peer = %from, anchor = %anchor.name, "Applied peer anchor");

                self.events.emit(SessionEvent::AnchorAdded {
                    anchor,
                    origin: AnchorOrigin::Peer(from),
                });
            }
            verdict => {
                debug!(
                    peer = %from,
                    anchor = %anchor.name,
                    reason = verdict.as_str(),
                    "Dropped peer anchor"
                );
                metrics::anchor_dropped(verdict.as_str());
                self.events.emit(SessionEvent::AnchorDropped {
                    from,
                    name: anchor.name,
                    reason: verdict,
                });
            }
        }
    }

    fn replay_anchors(&self, peer: PeerId) {
        let anchors = self.reconciler.replay_anchors();
        if anchors.is_empty() {
            return;
        }

        debug!(peer = %peer, count = anchors.len(), "Replaying local anchors");
        for anchor in anchors {
            match anchor_codec::encode(&anchor) {
                Ok(bytes) => self.send_outbound(Outbound::SendTo { peer, bytes }),
                Err(e) => warn!(anchor = %anchor.name, error = %e, "Failed to encode anchor for replay"),
            }
        }
    }

    fn status(&self) -> SessionStatus {
        let mut peers: Vec<PeerInfo> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| a.display_name.cmp(&b.display_name));

        SessionStatus {
            state: self.reconciler.state(),
            tracking: self.reconciler.tracking_status(),
            anchors: self.reconciler.entries(),
            peers,
            has_snapshot: self.reconciler.snapshot().is_some(),
            maps_in_flight: self.reconciler.maps_in_flight(),
            save_available: self.save_available,
        }
    }
}

async fn capture_world_map(
    backend: &dyn TrackingBackend,
    events: &SessionEvents,
) -> Result<WorldMap, SessionError> {
    let map = match backend.current_world_map().await {
        Ok(map) => map,
        Err(e) => {
            warn!(error = %e, "Can't get current world map");
            events.alert("Can't get current world map", e.to_string());
            return Err(e.into());
        }
    };

    let snapshot = match backend.capture_snapshot().await {
        Some(snapshot) => snapshot,
        None => {
            warn!("Failed to take snapshot");
            events.alert("Can't get current world map", "Failed to take snapshot");
            return Err(SessionError::SnapshotUnavailable);
        }
    };

    Ok(map.with_snapshot(snapshot))
}

async fn encode_off_queue(map: WorldMap) -> Result<(Vec<u8>, usize), SessionError> {
    tokio::task::spawn_blocking(move || {
        let started = Instant::now();
        let blob = world_map::encode(&map)?;
        metrics::world_map_encode_duration(started.elapsed().as_secs_f64());
        Ok::<_, SessionError>((blob, map.anchors.len()))
    })
    .await?
}

async fn save_experience(
    backend: Arc<dyn TrackingBackend>,
    store: MapStore,
    events: &SessionEvents,
) -> Result<PathBuf, SessionError> {
    let map = capture_world_map(backend.as_ref(), events).await?;
    let path = store.path().to_path_buf();

    let written = async {
        let (blob, anchors) = encode_off_queue(map).await?;
        let size = blob.len();
        tokio::task::spawn_blocking(move || store.save(&blob)).await??;
        Ok::<_, SessionError>((anchors, size))
    }
    .await;

    match written {
        Ok((anchors, size)) => {
            events.emit(SessionEvent::ExperienceSaved { anchors, size });
            Ok(path)
        }
        Err(e) => {
            error!(path = %path.display(), error = %e, "Can't save map");
            events.alert("Can't save map", e.to_string());
            Err(e)
        }
    }
}

async fn share_world_map(
    backend: Arc<dyn TrackingBackend>,
    outbound: mpsc::UnboundedSender<Outbound>,
    events: &SessionEvents,
) -> Result<usize, SessionError> {
    let map = capture_world_map(backend.as_ref(), events).await?;
    let (blob, anchors) = encode_off_queue(map).await?;
    let size = blob.len();

    let (reply, sent) = oneshot::channel();
    outbound
        .send(Outbound::Broadcast {
            bytes: blob,
            reply: Some(reply),
        })
        .map_err(|_| SessionError::Stopped)?;
    let peers = sent.await.map_err(|_| SessionError::Stopped)??;
    info!(peers, size, anchors, "Shared world map");
    events.emit(SessionEvent::WorldMapShared { peers, size });
    Ok(peers)
}

fn load_local_map(store: &MapStore) -> Result<WorldMap, SessionError> {
    let blob = match store.load() {
        Ok(blob) => blob,
        Err(PersistenceError::Corrupted { reason, .. }) => {
            return Err(SessionError::CorruptedLocalMap(reason))
        }
        Err(e) => return Err(e.into()),
    };

    world_map::decode_vec(blob).map_err(|e| SessionError::CorruptedLocalMap(e.to_string()))
}

/// Deliver outbound messages one at a time, in the order they were queued
async fn run_outbound(link: Arc<dyn PeerLink>, mut outbound_rx: mpsc::UnboundedReceiver<Outbound>) {
    while let Some(item) = outbound_rx.recv().await {
        match item {
            Outbound::Broadcast { bytes, reply } => {
                let result = link.broadcast(bytes).await;
                match reply {
                    Some(reply) => {
                        let _ = reply.send(result);
                    }
                    None => match result {
                        Ok(peers) => debug!(peers, "Broadcast anchor"),
                        Err(e) => warn!(error = %e, "Failed to broadcast anchor"),
                    },
                }
            }
            Outbound::SendTo { peer, bytes } => {
                if let Err(e) = send_with_retry(link.as_ref(), peer, bytes).await {
                    warn!(peer = %peer, error = %e, "Failed to send anchor");
                }
            }
        }
    }
    debug!("Outbound worker stopped");
}

async fn send_with_retry(link: &dyn PeerLink, peer: PeerId, bytes: Vec<u8>) -> Result<(), TransportError> {
    let mut attempts = 0;
    loop {
        match link.send_to(peer, bytes.clone()).await {
            Err(TransportError::QueueFull(_)) if attempts < REPLAY_RETRIES => {
                attempts += 1;
                tokio::time::sleep(REPLAY_BACKOFF).await;
            }
            other => return other,
        }
    }
}

/// Handle to the session actor
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<SessionCommand>,
    events: SessionEvents,
}

impl SessionHandle {
    /// Spawn the session actor
    pub fn spawn(
        config: SessionConfig,
        backend: Arc<dyn TrackingBackend>,
        link: Arc<dyn PeerLink>,
        store: MapStore,
    ) -> (Self, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(config.command_channel_capacity);
        let (internal_tx, internal_rx) = mpsc::channel(INTERNAL_CHANNEL_CAPACITY);
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let events = SessionEvents::new(config.event_channel_capacity);

        tokio::spawn(run_outbound(link, outbound_rx));

        let manager = SessionManager {
            config,
            reconciler: Reconciler::new(),
            backend,
            outbound,
            store,
            events: events.clone(),
            internal_tx,
            peers: HashMap::new(),
            save_available: false,
        };

        let task = tokio::spawn(manager.run(command_rx, internal_rx));
        (SessionHandle { command_tx, events }, task)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> SessionCommand) -> Result<T, SessionError> {
        let (reply, response) = oneshot::channel();
        self.command_tx
            .send(build(reply))
            .await
            .map_err(|_| SessionError::Stopped)?;
        response.await.map_err(|_| SessionError::Stopped)?
    }

    async fn post(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SessionError::Stopped)
    }

    /// Place a line anchor from `source` to `destination`
    pub async fn sketch(&self, source: Point3, destination: Point3) -> Result<SpatialAnchor, SessionError> {
        self.request(|reply| SessionCommand::Sketch {
            source,
            destination,
            reply,
        })
        .await
    }

    /// Capture the current map and write it to the map file
    pub async fn save_experience(&self) -> Result<PathBuf, SessionError> {
        self.request(|reply| SessionCommand::SaveExperience { reply }).await
    }

    /// Apply the saved map. Resolves once the map has been applied.
    pub async fn load_experience(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::LoadExperience { reply }).await
    }

    /// Capture the current map and send it to every peer
    pub async fn share_world_map(&self) -> Result<usize, SessionError> {
        self.request(|reply| SessionCommand::ShareWorldMap { reply }).await
    }

    pub async fn reset(&self) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Reset { reply }).await
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        let (reply, response) = oneshot::channel();
        self.post(SessionCommand::Status(reply)).await?;
        response.await.map_err(|_| SessionError::Stopped)
    }

    pub async fn tracking_event(&self, event: TrackingEvent) -> Result<(), SessionError> {
        self.post(SessionCommand::Tracking(event)).await
    }

    pub async fn transport_event(&self, event: TransportEvent) -> Result<(), SessionError> {
        self.post(SessionCommand::Transport(event)).await
    }

    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(SessionCommand::Shutdown).await;
    }
}
