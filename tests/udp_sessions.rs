//! End-to-end tests for the UDP server and client over loopback.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::net::UdpSocket;
use std::thread;
use std::time::{Duration, Instant};

use media_stream_io::config::{ClientConfig, ServerConfig};
use media_stream_io::core::buffer::MessageBuffer;
use media_stream_io::core::header::{Direction, StreamType, WireHeader, HEADER_SIZE};
use media_stream_io::error::{codes, ProtocolError, Result};
use media_stream_io::service::UdpServer;
use media_stream_io::transport::UdpClient;

fn start(direction: Direction) -> UdpServer {
    let mut server = UdpServer::new(ServerConfig {
        bind_address: "127.0.0.1".to_string(),
        port: 0,
        direction,
        ..ServerConfig::default()
    })
    .unwrap();
    server.initialize(512).unwrap();
    server.start().unwrap();
    server
}

fn client_for(server: &UdpServer) -> UdpClient {
    let mut client = UdpClient::from_config(&ClientConfig {
        port: server.local_addr().unwrap().port(),
        buffer_size: 512,
        read_timeout: Duration::from_millis(100),
        stream_type: "AUD".to_string(),
        ..ClientConfig::default()
    })
    .unwrap();
    client.open().unwrap();
    client
}

fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < limit {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

fn next_input(server: &UdpServer) -> Vec<u8> {
    let mut buf = [0u8; 512];
    let mut n = 0;
    assert!(wait_until(Duration::from_secs(2), || {
        n = server.read_input_data(&mut buf).unwrap();
        n > 0
    }));
    buf[..n].to_vec()
}

#[test]
fn resend_succeeds_only_after_staging() {
    let server = start(Direction::Input);
    let mut client = client_for(&server);

    let err = client.write(None).unwrap_err();
    assert!(matches!(err, ProtocolError::NothingStaged));
    assert_eq!(err.code(), codes::NOTHING_STAGED);
    assert!(client.last_error().is_some());

    client.set_buffer(b"pcm-").unwrap();
    client.append_buffer(b"block").unwrap();
    assert_eq!(client.write(None).unwrap(), HEADER_SIZE + 9);
    assert_eq!(next_input(&server), b"pcm-block");

    // the staged body stays available for another resend
    client.write(None).unwrap();
    assert_eq!(next_input(&server), b"pcm-block");
}

#[test]
fn bidirectional_udp_echo() {
    let echo = |input: &MessageBuffer, output: &mut MessageBuffer| -> Result<()> {
        output.set_body(input.body())?;
        output.mark_updated();
        Ok(())
    };
    let mut server = UdpServer::new(ServerConfig {
        bind_address: "127.0.0.1".to_string(),
        port: 0,
        direction: Direction::Bidirectional,
        ..ServerConfig::default()
    })
    .unwrap()
    .with_processor(echo);
    server.initialize(512).unwrap();
    server.start().unwrap();

    let mut client = client_for(&server);
    client.write(Some(b"PING")).unwrap();

    let mut reply = [0u8; 16];
    let mut n = 0;
    assert!(wait_until(Duration::from_secs(2), || {
        n = client.read(&mut reply).unwrap();
        n > 0
    }));
    assert_eq!(&reply[..n], b"PING");
}

#[test]
fn session_ignores_other_peers() {
    let server = start(Direction::Input);
    let mut first = client_for(&server);
    let mut second = client_for(&server);

    first.write(Some(b"one")).unwrap();
    assert_eq!(next_input(&server), b"one");

    second.write(Some(b"intruder")).unwrap();
    first.write(Some(b"two")).unwrap();
    assert_eq!(next_input(&server), b"two");
    assert_eq!(server.metrics().snapshot().messages_received, 2);
    assert_eq!(server.num_active_sessions(), 1);
}

#[test]
fn truncated_token_datagram_does_not_wedge_the_session() {
    let server = start(Direction::Input);
    let target = server.local_addr().unwrap();
    let raw = UdpSocket::bind("127.0.0.1:0").unwrap();

    raw.send_to(b"ex", target).unwrap();
    let mut frame = WireHeader::new(StreamType::new("AUD"), 5, Direction::Input)
        .encode()
        .to_vec();
    frame.extend_from_slice(b"hello");
    raw.send_to(&frame, target).unwrap();

    assert_eq!(next_input(&server), b"hello");
    let snapshot = server.metrics().snapshot();
    assert_eq!(snapshot.protocol_errors, 1);
    assert_eq!(snapshot.messages_received, 1);
}

#[test]
fn silent_udp_peer_times_out_on_heartbeat() {
    let mut server = UdpServer::new(ServerConfig {
        bind_address: "127.0.0.1".to_string(),
        port: 0,
        direction: Direction::Input,
        heartbeat_interval: Duration::from_millis(50),
        ..ServerConfig::default()
    })
    .unwrap();
    server.initialize(512).unwrap();
    server.start().unwrap();

    let mut client = client_for(&server);
    client.write(Some(b"once")).unwrap();
    assert_eq!(next_input(&server), b"once");

    assert!(wait_until(Duration::from_secs(1), || server.num_active_sessions() == 0));
    let snapshot = server.metrics().snapshot();
    assert_eq!(snapshot.heartbeat_failures, 1);
    assert_eq!(snapshot.graceful_closes, 0);

    let mut scratch = [0u8; 8];
    let mut ended = false;
    assert!(wait_until(Duration::from_secs(1), || {
        ended = matches!(client.read(&mut scratch), Err(ProtocolError::PeerExit));
        ended
    }));
}

#[test]
fn stopping_sends_exit_to_the_peer() {
    let mut server = start(Direction::Input);
    let mut client = client_for(&server);
    client.write(Some(b"hello")).unwrap();
    assert_eq!(next_input(&server), b"hello");

    server.stop().unwrap();
    assert_eq!(server.num_active_sessions(), 0);

    let mut scratch = [0u8; 8];
    let mut ended = false;
    assert!(wait_until(Duration::from_secs(1), || {
        ended = matches!(client.read(&mut scratch), Err(ProtocolError::PeerExit));
        ended
    }));
}

#[test]
fn unopened_client_is_not_connected() {
    let mut client = UdpClient::new(64).unwrap();
    assert!(!client.is_connected());
    let err = client.write(Some(b"x")).unwrap_err();
    assert_eq!(err.code(), codes::NOT_CONNECTED);
}
