#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use media_stream_io::core::codec::EnvelopeCodec;
use media_stream_io::core::control::ControlToken;
use media_stream_io::core::header::WireHeader;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // header parsing, token classification and framing must never panic
    let _ = WireHeader::decode(data);
    let _ = ControlToken::match_prefix(data);

    let mut codec = EnvelopeCodec::new(64 * 1024);
    let mut src = BytesMut::from(data);
    while let Ok(Some(_)) = codec.decode(&mut src) {}
});
