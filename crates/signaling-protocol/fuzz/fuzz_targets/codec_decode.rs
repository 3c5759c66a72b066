#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use signaling_protocol::codec::decode_envelope;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    // Drain every complete frame; must never panic, only return Err
    while let Ok(Some(_)) = decode_envelope(&mut buf) {}
});
