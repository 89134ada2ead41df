//! Transport layer.
//!
//! - [`TcpClient`]: TCP client with connect/read/write timeouts
//! - [`Backoff`]: reconnect delay schedule shared by the connectors

mod tcp;

pub use tcp::*;

use async_trait::async_trait;
use std::time::Duration;

/// Transport trait for connection lifecycle management.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connects to the remote endpoint.
    async fn connect(&self) -> crate::Result<()>;

    /// Disconnects from the remote endpoint.
    async fn disconnect(&self) -> crate::Result<()>;

    /// Returns the current connection state.
    fn state(&self) -> crate::ConnectionState;

    /// Returns whether the transport is connected.
    fn is_connected(&self) -> bool {
        self.state() == crate::ConnectionState::Connected
    }
}

/// Initial reconnect delay.
pub const BACKOFF_INITIAL: Duration = Duration::from_secs(1);

/// Reconnect delay ceiling.
pub const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Exponential reconnect delay: starts at 1 s, doubles per failure, caps at
/// 30 s, resets on success.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    /// Creates a backoff with the given bounds.
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Returns the delay to wait before the next attempt and advances the
    /// schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    /// Resets the schedule after a successful attempt.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BACKOFF_INITIAL, BACKOFF_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::default();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(2));
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
        assert_eq!(backoff.next_delay(), Duration::from_secs(8));
        assert_eq!(backoff.next_delay(), Duration::from_secs(16));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
        assert_eq!(backoff.next_delay(), Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_resets_on_success() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }
}
