#![no_main]

use anchorsync_core::core_codec::{anchor, world_map, Envelope, MessageKind};
use libfuzzer_sys::fuzz_target;

// Whatever a peer sends must classify and decode without panicking
fuzz_target!(|data: &[u8]| {
    match Envelope::classify(data) {
        Ok(MessageKind::WorldMap) => {
            let _ = world_map::decode(data);
            let _ = world_map::decode_vec(data.to_vec());
        }
        Ok(MessageKind::Anchor) => {
            let _ = anchor::decode(data);
        }
        Err(_) => {
            let _ = anchor::decode(data);
            let _ = world_map::decode(data);
        }
    }
});
