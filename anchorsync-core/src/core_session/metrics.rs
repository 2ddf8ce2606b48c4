/*
    Metrics - session reconciliation counters
*/

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Register metric descriptions (call once at startup)
pub fn init_metrics() {
    describe_counter!(
        "anchorsync_anchors_created_total",
        "Anchors created on this device"
    );

    describe_counter!(
        "anchorsync_anchors_applied_total",
        "Anchors received from peers and added to the session"
    );

    describe_counter!(
        "anchorsync_anchors_dropped_total",
        "Anchors received from peers and discarded, labeled by reason"
    );

    describe_counter!(
        "anchorsync_maps_applied_total",
        "World maps applied, labeled by source (local, peer)"
    );

    describe_counter!(
        "anchorsync_maps_discarded_total",
        "Decoded world maps superseded by a newer map from the same source"
    );

    describe_counter!(
        "anchorsync_decode_failures_total",
        "Inbound or persisted blobs that failed to decode, labeled by kind"
    );

    describe_histogram!(
        "anchorsync_world_map_encode_seconds",
        "Time spent encoding a captured world map"
    );

    describe_gauge!(
        "anchorsync_session_anchors",
        "Anchors currently held by the session"
    );
}

pub fn anchor_created() {
    counter!("anchorsync_anchors_created_total").increment(1);
}

pub fn anchor_applied() {
    counter!("anchorsync_anchors_applied_total").increment(1);
}

pub fn anchor_dropped(reason: &'static str) {
    counter!("anchorsync_anchors_dropped_total", "reason" => reason).increment(1);
}

pub fn map_applied(source: &'static str) {
    counter!("anchorsync_maps_applied_total", "source" => source).increment(1);
}

pub fn map_discarded() {
    counter!("anchorsync_maps_discarded_total").increment(1);
}

pub fn decode_failure(kind: &'static str) {
    counter!("anchorsync_decode_failures_total", "kind" => kind).increment(1);
}

pub fn world_map_encode_duration(duration_secs: f64) {
    histogram!("anchorsync_world_map_encode_seconds").record(duration_secs);
}

pub fn set_session_anchors(count: usize) {
    gauge!("anchorsync_session_anchors").set(count as f64);
}
