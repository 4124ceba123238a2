//! Timeout constants and async timeout wrappers.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Longest single probe for inbound bytes.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Bound on one read or write transaction inside a session.
pub const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait for `ack` after a `beat` probe.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause after a failed accept.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// TCP connect bound for client endpoints.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Socket read timeout for client endpoints.
pub const CLIENT_READ_TIMEOUT: Duration = Duration::from_secs(2);

/// Run `fut`, mapping an elapsed deadline to [`ProtocolError::Timeout`].
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(result) => result,
        Err(_) => Err(ProtocolError::Timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn elapsed_deadline_maps_to_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        };
        let result = with_timeout_error(slow, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(ProtocolError::Timeout)));
    }

    #[tokio::test]
    async fn inner_error_passes_through() {
        let failing = async { Err::<(), _>(ProtocolError::MissingAck) };
        let result = with_timeout_error(failing, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ProtocolError::MissingAck)));
    }
}
