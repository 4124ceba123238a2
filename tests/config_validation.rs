//! Integration tests for configuration validation

#![allow(clippy::expect_used, clippy::unwrap_used)]

use media_stream_io::config::{ClientConfig, LoggingConfig, NetworkConfig, ServerConfig};
use media_stream_io::core::header::Direction;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::Level;

#[test]
fn test_default_config_validates() {
    let config = NetworkConfig::default();
    let errors = config.validate();
    assert!(
        errors.is_empty(),
        "Default config should be valid, but got errors: {:?}",
        errors
    );
}

#[test]
fn test_invalid_bind_address() {
    let mut config = NetworkConfig::default();
    config.server.bind_address = "not-an-ip".to_string();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Invalid bind address")));
}

#[test]
fn test_empty_bind_address() {
    let mut config = NetworkConfig::default();
    config.server.bind_address = String::new();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("cannot be empty")));
}

#[test]
fn test_buffer_without_body_room() {
    let mut config = NetworkConfig::default();
    config.server.buffer_size = 21;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Buffer size too small")));
}

#[test]
fn test_excessive_buffer_size() {
    let mut config = NetworkConfig::default();
    config.client.buffer_size = 512 * 1024 * 1024;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Buffer size too large")));
}

#[test]
fn test_empty_stream_type() {
    let mut config = NetworkConfig::default();
    config.server.stream_type = String::new();

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Stream type cannot be empty")));
}

#[test]
fn test_zero_poll_interval() {
    let mut config = NetworkConfig::default();
    config.server.poll_interval = Duration::ZERO;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Poll interval must be greater than 0")));
}

#[test]
fn test_heartbeat_shorter_than_poll_interval() {
    let mut config = NetworkConfig::default();
    config.server.poll_interval = Duration::from_millis(100);
    config.server.heartbeat_interval = Duration::from_millis(50);

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Heartbeat interval shorter than poll interval")));
}

#[test]
fn test_output_heartbeat_needs_ack_timeout() {
    let mut config = NetworkConfig::default();
    config.server.direction = Direction::Output;
    config.server.heartbeat_interval = Duration::from_millis(500);
    config.server.ack_timeout = Duration::ZERO;

    let errors = config.validate();
    assert!(errors.iter().any(|e| e.contains("Ack timeout must be greater than 0")));

    // disabled heartbeat needs no ack timeout
    config.server.heartbeat_interval = Duration::ZERO;
    assert!(config.validate().is_empty());
}

#[test]
fn test_ephemeral_server_port_allowed_client_port_not() {
    let mut config = NetworkConfig::default();
    config.server.port = 0;
    assert!(config.validate().is_empty());

    config.client.port = 0;
    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Client port must be greater than 0")));
}

#[test]
fn test_zero_client_read_timeout() {
    let mut config = NetworkConfig::default();
    config.client.read_timeout = Duration::ZERO;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("Read timeout must be greater than 0")));
}

#[test]
fn test_log_to_file_without_path() {
    let mut config = NetworkConfig::default();
    config.logging.log_to_file = true;
    config.logging.log_file_path = None;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("log_file_path must be specified")));
}

#[test]
fn test_no_logging_outputs() {
    let mut config = NetworkConfig::default();
    config.logging.log_to_console = false;
    config.logging.log_to_file = false;

    let errors = config.validate();
    assert!(errors
        .iter()
        .any(|e| e.contains("At least one logging output")));
}

#[test]
fn test_validate_strict_with_invalid_config() {
    let mut config = NetworkConfig::default();
    config.server.bind_address = String::new();

    let err = config.validate_strict().unwrap_err();
    assert!(err.to_string().contains("Configuration validation failed"));
    assert!(err.code() < 0);
}

#[test]
fn test_multiple_validation_errors() {
    let mut config = NetworkConfig::default();
    config.server.bind_address = String::new();
    config.server.buffer_size = 4;
    config.client.host = String::new();
    config.logging.app_name = String::new();

    let errors = config.validate();
    assert!(
        errors.len() >= 4,
        "Expected at least 4 errors, got {}: {:?}",
        errors.len(),
        errors
    );
}

#[test]
fn test_toml_overrides_and_defaults() {
    let config = NetworkConfig::from_toml(
        r#"
        [server]
        port = 7400
        direction = "bidirectional"
        heartbeat_interval = 250
        persistent = false
        stream_type = "VID"

        [client]
        host = "media.local"
        read_timeout = 750

        [logging]
        log_level = "debug"
        "#,
    )
    .unwrap();

    assert_eq!(config.server.port, 7400);
    assert_eq!(config.server.direction, Direction::Bidirectional);
    assert_eq!(config.server.heartbeat_interval, Duration::from_millis(250));
    assert!(!config.server.persistent);
    assert_eq!(config.server.stream_type().as_str(), "VID");
    assert_eq!(config.server.buffer_size, ServerConfig::default().buffer_size);
    assert_eq!(config.client.host, "media.local");
    assert_eq!(config.client.read_timeout, Duration::from_millis(750));
    assert_eq!(config.logging.log_level, Level::DEBUG);
}

#[test]
fn test_unknown_direction_rejected() {
    let result = NetworkConfig::from_toml("[server]\ndirection = \"sideways\"\n");
    assert!(result.is_err());
}

#[test]
fn test_save_and_reload() {
    let config = NetworkConfig {
        server: ServerConfig {
            port: 9100,
            direction: Direction::Output,
            heartbeat_interval: Duration::from_secs(2),
            ..ServerConfig::default()
        },
        client: ClientConfig {
            port: 9100,
            ..ClientConfig::default()
        },
        logging: LoggingConfig {
            app_name: "capture-node".to_string(),
            log_level: Level::WARN,
            ..LoggingConfig::default()
        },
    };

    let file = NamedTempFile::new().unwrap();
    config.save_to_file(file.path()).unwrap();
    let reloaded = NetworkConfig::from_file(file.path()).unwrap();

    assert_eq!(reloaded.server.port, 9100);
    assert_eq!(reloaded.server.direction, Direction::Output);
    assert_eq!(reloaded.server.heartbeat_interval, Duration::from_secs(2));
    assert_eq!(reloaded.logging.app_name, "capture-node");
    assert_eq!(reloaded.logging.log_level, Level::WARN);
}

#[test]
fn test_example_config_parses() {
    let example = NetworkConfig::example_config();
    let parsed = NetworkConfig::from_toml(&example).unwrap();
    assert!(parsed.validate().is_empty());
}

#[test]
fn test_default_with_overrides() {
    let config = NetworkConfig::default_with_overrides(|c| {
        c.server.persistent = false;
        c.client.stream_type = "AUD".to_string();
    });
    assert!(!config.server.persistent);
    assert_eq!(config.client.stream_type().as_str(), "AUD");
}
