//! End-to-end session tests over real TCP
//!
//! Each test starts one or two full nodes on 127.0.0.1 with discovery
//! disabled, connects them by dialing, and drives the simulated tracking
//! backend to walk the session through its states.

use std::time::Duration;

use anchorsync_core::config::{Config, DEFAULT_MAP_FILE_NAME};
use anchorsync_core::core_codec::world_map;
use anchorsync_core::core_session::{AnchorOrigin, AnchorVerdict, MapSource, SessionError, SessionEvent, SessionState};
use anchorsync_core::core_storage::MapStore;
use anchorsync_core::core_tracking::{TrackingState, WorldMappingStatus};
use anchorsync_core::{Point3, SyncNode};
use tempfile::TempDir;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::timeout;

type Events = broadcast::Receiver<SessionEvent>;

async fn start_node(name: &str) -> (SyncNode, TempDir) {
    let dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.transport.listen_address = "127.0.0.1:0".parse().unwrap();
    config.discovery.enabled = false;
    config.storage.data_dir = dir.path().to_path_buf();

    let node = SyncNode::start(config, name).await.unwrap();
    (node, dir)
}

async fn wait_for<F>(events: &mut Events, mut predicate: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("session event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

async fn set_mapped(node: &SyncNode, events: &mut Events) {
    node.tracking()
        .set_status(TrackingState::Normal, Some(WorldMappingStatus::Mapped))
        .await;
    wait_for(events, |e| {
        *e == SessionEvent::StatusText("Mapping: Mapped\nTracking: Normal".to_string())
    })
    .await;
}

async fn connect(a: &SyncNode, a_events: &mut Events, b: &SyncNode, b_events: &mut Events) {
    let a_id = a.local().id;
    let b_id = b.local().id;

    b.dial(a.listen_addr().to_string()).await.unwrap();

    wait_for(a_events, |e| matches!(e, SessionEvent::PeerJoined(info) if info.id == b_id)).await;
    wait_for(b_events, |e| matches!(e, SessionEvent::PeerJoined(info) if info.id == a_id)).await;
}

fn segment(offset: f32) -> (Point3, Point3) {
    (
        Point3::new(offset, 0.0, -0.1),
        Point3::new(offset + 0.05, 0.0, -0.1),
    )
}

#[tokio::test]
async fn test_peer_map_relocalizes_then_tracks_provider() {
    let (a, _a_dir) = start_node("alpha").await;
    let (b, _b_dir) = start_node("bravo").await;
    let mut a_events = a.session().subscribe();
    let mut b_events = b.session().subscribe();

    set_mapped(&a, &mut a_events).await;
    let (src, dst) = segment(0.0);
    let anchor = a.session().sketch(src, dst).await.unwrap();

    connect(&a, &mut a_events, &b, &mut b_events).await;

    // The late joiner receives the anchor that already existed
    let id = anchor.id;
    wait_for(&mut b_events, |e| {
        matches!(e, SessionEvent::AnchorAdded { anchor, origin: AnchorOrigin::Peer(_) } if anchor.id == id)
    })
    .await;

    assert_eq!(a.session().share_world_map().await.unwrap(), 1);

    let applied = wait_for(&mut b_events, |e| matches!(e, SessionEvent::MapApplied { .. })).await;
    assert_eq!(
        applied,
        SessionEvent::MapApplied {
            source: MapSource::Peer(a.local().id),
            anchors: 1,
        }
    );

    let status = b.session().status().await.unwrap();
    assert_eq!(
        status.state,
        SessionState::Relocalizing {
            pending_provider: Some(a.local().id)
        }
    );
    assert!(status.has_snapshot);
    assert_eq!(status.anchors.len(), 1);
    assert_eq!(status.anchors[0].anchor, anchor);
    assert_eq!(status.anchors[0].origin, AnchorOrigin::Map);

    b.tracking()
        .set_status(TrackingState::Normal, Some(WorldMappingStatus::Mapped))
        .await;

    let tracking = SessionState::Tracking {
        map_provider: Some(a.local().id),
    };
    wait_for(&mut b_events, |e| *e == SessionEvent::StateChanged(tracking)).await;

    let status = b.session().status().await.unwrap();
    assert_eq!(status.state, tracking);
    assert!(!status.has_snapshot);

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_anchor_dropped_while_relocalizing() {
    let (a, _a_dir) = start_node("alpha").await;
    let (b, _b_dir) = start_node("bravo").await;
    let mut a_events = a.session().subscribe();
    let mut b_events = b.session().subscribe();

    set_mapped(&a, &mut a_events).await;
    connect(&a, &mut a_events, &b, &mut b_events).await;

    a.session().share_world_map().await.unwrap();
    wait_for(&mut b_events, |e| matches!(e, SessionEvent::MapApplied { .. })).await;

    let (src, dst) = segment(0.2);
    let anchor = a.session().sketch(src, dst).await.unwrap();

    let dropped = wait_for(&mut b_events, |e| matches!(e, SessionEvent::AnchorDropped { .. })).await;
    assert_eq!(
        dropped,
        SessionEvent::AnchorDropped {
            from: a.local().id,
            name: anchor.name.clone(),
            reason: AnchorVerdict::DroppedRelocalizing,
        }
    );
    assert!(b.session().status().await.unwrap().anchors.is_empty());

    // Sketching is refused on the relocalizing side
    let result = b.session().sketch(src, dst).await;
    assert!(matches!(result, Err(SessionError::AnchorCreationSuppressed)));

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_save_then_load_restores_anchor() {
    let (a, dir) = start_node("alpha").await;
    let mut events = a.session().subscribe();

    set_mapped(&a, &mut events).await;
    let (src, dst) = segment(0.0);
    let anchor = a.session().sketch(src, dst).await.unwrap();
    assert_eq!(anchor.name, "virtualObject0");

    let path = a.session().save_experience().await.unwrap();
    assert_eq!(path, dir.path().join(DEFAULT_MAP_FILE_NAME));
    wait_for(&mut events, |e| matches!(e, SessionEvent::ExperienceSaved { anchors: 1, .. })).await;

    let saved = world_map::decode_vec(MapStore::new(&path).load().unwrap()).unwrap();
    assert_eq!(saved.anchors, vec![anchor.clone()]);
    assert!(saved.snapshot.is_some());

    a.session().load_experience().await.unwrap();

    let status = a.session().status().await.unwrap();
    assert_eq!(
        status.state,
        SessionState::Relocalizing {
            pending_provider: None
        }
    );
    assert!(status.has_snapshot);
    assert_eq!(status.anchors.len(), 1);
    assert_eq!(status.anchors[0].anchor, anchor);

    // Tracking receives the anchors without the snapshot entry
    assert_eq!(a.tracking().anchors().await, vec![anchor]);

    a.shutdown().await;
}

#[tokio::test]
async fn test_colliding_names_are_kept() {
    let (a, _a_dir) = start_node("alpha").await;
    let (b, _b_dir) = start_node("bravo").await;
    let mut a_events = a.session().subscribe();
    let mut b_events = b.session().subscribe();

    connect(&a, &mut a_events, &b, &mut b_events).await;

    let (src, dst) = segment(0.0);
    let from_a = a.session().sketch(src, dst).await.unwrap();
    let (src, dst) = segment(0.5);
    let from_b = b.session().sketch(src, dst).await.unwrap();
    assert_eq!(from_a.name, from_b.name);

    let b_id = from_b.id;
    wait_for(&mut a_events, |e| {
        matches!(e, SessionEvent::AnchorAdded { anchor, .. } if anchor.id == b_id)
    })
    .await;
    let a_id = from_a.id;
    wait_for(&mut b_events, |e| {
        matches!(e, SessionEvent::AnchorAdded { anchor, .. } if anchor.id == a_id)
    })
    .await;

    for node in [&a, &b] {
        let status = node.session().status().await.unwrap();
        assert_eq!(status.anchors.len(), 2);
        assert!(status.anchors.iter().all(|e| e.anchor.name == "virtualObject0"));
        assert!(status.anchors.iter().any(|e| e.origin == AnchorOrigin::Local));
    }

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn test_corrupted_saved_map_stops_session() {
    let (a, dir) = start_node("alpha").await;
    let mut events = a.session().subscribe();

    MapStore::new(dir.path().join(DEFAULT_MAP_FILE_NAME))
        .save(b"definitely not a world map")
        .unwrap();

    let err = a.session().load_experience().await.unwrap_err();
    assert!(matches!(err, SessionError::CorruptedLocalMap(_)));

    wait_for(&mut events, |e| matches!(e, SessionEvent::Fatal(_))).await;
    assert!(matches!(a.session().status().await, Err(SessionError::Stopped)));

    a.shutdown().await;
}
