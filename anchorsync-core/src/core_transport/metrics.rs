/*
    Metrics - peer transport counters and gauges

    Covers connection lifecycle (active peers, handshakes), traffic volume
    (messages and bytes in both directions) and backpressure (dropped sends).
*/

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

/// Register metric descriptions (call once at startup)
pub fn init_metrics() {
    describe_gauge!(
        "anchorsync_active_peers",
        "Current number of connected peers"
    );

    describe_counter!(
        "anchorsync_handshakes_total",
        "Total number of peer handshakes, labeled by result (success, failed, timeout)"
    );

    describe_histogram!(
        "anchorsync_handshake_duration_seconds",
        "Time from TCP connect to completed hello exchange"
    );

    describe_counter!(
        "anchorsync_messages_sent_total",
        "Total number of application messages written to peers"
    );

    describe_counter!(
        "anchorsync_bytes_sent_total",
        "Total plaintext bytes written to peers"
    );

    describe_counter!(
        "anchorsync_messages_received_total",
        "Total number of complete application messages received"
    );

    describe_counter!(
        "anchorsync_bytes_received_total",
        "Total plaintext bytes received from peers"
    );

    describe_counter!(
        "anchorsync_send_queue_full_total",
        "Messages dropped because a peer send queue was full"
    );

    describe_counter!(
        "anchorsync_duplicate_connections_total",
        "Connections closed because the peer was already connected"
    );

    describe_counter!(
        "anchorsync_discovery_beacons_total",
        "Matching discovery beacons received"
    );
}

pub fn set_active_peers(count: usize) {
    gauge!("anchorsync_active_peers").set(count as f64);
}

pub fn handshake_result(result: &'static str) {
    counter!("anchorsync_handshakes_total", "result" => result).increment(1);
}

pub fn handshake_duration(duration_secs: f64) {
    histogram!("anchorsync_handshake_duration_seconds").record(duration_secs);
}

pub fn message_sent(bytes: usize) {
    counter!("anchorsync_messages_sent_total").increment(1);
    counter!("anchorsync_bytes_sent_total").increment(bytes as u64);
}

pub fn message_received(bytes: usize) {
    counter!("anchorsync_messages_received_total").increment(1);
    counter!("anchorsync_bytes_received_total").increment(bytes as u64);
}

pub fn send_queue_full() {
    counter!("anchorsync_send_queue_full_total").increment(1);
}

pub fn duplicate_connection() {
    counter!("anchorsync_duplicate_connections_total").increment(1);
}

pub fn beacon_received() {
    counter!("anchorsync_discovery_beacons_total").increment(1);
}
