//! Structured logging setup.
//!
//! Installs a `tracing-subscriber` fmt subscriber driven by [`LoggingConfig`].
//! Library code only emits `tracing` events; calling [`init_logging`] is left to
//! the embedding application.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing::info;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ProtocolError::ConfigError(errors.join("; ")));
    }

    let writer = make_writer(config)?;
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(config.log_to_console && !config.log_to_file)
        .with_writer(writer)
        .try_init()
        .map_err(|e| ProtocolError::ConfigError(format!("Failed to install subscriber: {e}")))?;

    info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    Ok(())
}

fn make_writer(config: &LoggingConfig) -> Result<BoxMakeWriter> {
    if !config.log_to_file {
        return Ok(BoxMakeWriter::new(std::io::stdout));
    }

    let path = config
        .log_file_path
        .as_deref()
        .ok_or_else(|| ProtocolError::ConfigError("log_file_path is not set".to_string()))?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ProtocolError::ConfigError(format!("Failed to open log file {path}: {e}")))?;

    if config.log_to_console {
        use tracing_subscriber::fmt::writer::MakeWriterExt;
        Ok(BoxMakeWriter::new(Mutex::new(file).and(std::io::stdout)))
    } else {
        Ok(BoxMakeWriter::new(Mutex::new(file)))
    }
}
