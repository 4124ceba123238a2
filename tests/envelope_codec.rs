//! Async peers framing envelopes with `EnvelopeCodec` against a live server.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use media_stream_io::config::ServerConfig;
use media_stream_io::core::buffer::MessageBuffer;
use media_stream_io::core::codec::{Envelope, EnvelopeCodec};
use media_stream_io::core::header::{Direction, StreamType, HEADER_SIZE, MARKER};
use media_stream_io::error::{ProtocolError, Result};
use media_stream_io::service::TcpServer;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::codec::{Decoder, Encoder, Framed};

fn echo_server() -> TcpServer {
    let echo = |input: &MessageBuffer, output: &mut MessageBuffer| -> Result<()> {
        output.set_body(input.body())?;
        output.mark_updated();
        Ok(())
    };
    let mut server = TcpServer::new(ServerConfig {
        bind_address: "127.0.0.1".to_string(),
        port: 0,
        direction: Direction::Bidirectional,
        stream_type: "ECHO".to_string(),
        ..ServerConfig::default()
    })
    .unwrap()
    .with_processor(echo);
    server.initialize(4096).unwrap();
    server.start().unwrap();
    server
}

fn client_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn framed_peer_round_trips_through_server() {
    let server = echo_server();
    let addr = server.local_addr().unwrap();

    client_runtime().block_on(async {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut framed = Framed::new(stream, EnvelopeCodec::default());

        for body in [&b"PING"[..], &b"second frame"[..]] {
            framed
                .send(Envelope::new(StreamType::new("CTL"), Direction::Bidirectional, body))
                .await
                .unwrap();
            let reply = tokio::time::timeout(Duration::from_secs(2), framed.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            assert_eq!(&reply.payload[..], body);
            assert_eq!(reply.stream_type.as_str(), "ECHO");
            assert_eq!(reply.direction, Direction::Output);
        }

        framed.get_mut().write_all(b"exit").await.unwrap();
        framed.get_mut().flush().await.unwrap();
    });

    let deadline = Instant::now() + Duration::from_secs(2);
    while server.metrics().snapshot().graceful_closes == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    let snapshot = server.metrics().snapshot();
    assert_eq!(snapshot.graceful_closes, 1);
    assert_eq!(snapshot.messages_received, 2);
    assert_eq!(snapshot.messages_sent, 2);
}

#[test]
fn decoder_waits_for_complete_frames() {
    let mut codec = EnvelopeCodec::default();
    let mut wire = BytesMut::new();
    codec
        .encode(
            Envelope::new(StreamType::new("AUD"), Direction::Input, Bytes::from_static(&[1; 16])),
            &mut wire,
        )
        .unwrap();
    assert_eq!(wire.len(), HEADER_SIZE + 16);
    assert_eq!(&wire[..2], &MARKER.to_be_bytes());

    let mut incoming = BytesMut::new();
    for (i, byte) in wire.iter().enumerate() {
        incoming.extend_from_slice(&[*byte]);
        let decoded = codec.decode(&mut incoming).unwrap();
        if i + 1 < wire.len() {
            assert!(decoded.is_none());
        } else {
            let envelope = decoded.unwrap();
            assert_eq!(envelope.stream_type.as_str(), "AUD");
            assert_eq!(&envelope.payload[..], &[1; 16]);
        }
    }
}

#[test]
fn decoder_rejects_foreign_bytes_before_reading_length() {
    let mut codec = EnvelopeCodec::new(64);
    let mut garbage = BytesMut::from(&[0xFFu8; HEADER_SIZE][..]);
    assert!(matches!(
        codec.decode(&mut garbage),
        Err(ProtocolError::InvalidHeader(_))
    ));
}
