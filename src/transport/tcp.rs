//! TCP client implementation.

use crate::types::ConnectionStats;
use crate::{ConnectionState, LoggerError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tracing::{debug, info};

/// TCP client configuration.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Remote host name or address
    pub host: String,
    /// Remote port
    pub port: u16,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Read timeout
    pub read_timeout: Duration,
    /// Write timeout
    pub write_timeout: Duration,
    /// TCP_NODELAY
    pub tcp_nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 502,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(2),
            tcp_nodelay: true,
        }
    }
}

/// TCP client used by the MODBUS protocol layer.
///
/// Reconnect policy lives in the connector; the client itself performs single
/// connection attempts and request/response IO with timeouts.
pub struct TcpClient {
    config: TcpConfig,
    state: RwLock<ConnectionState>,
    stream: Mutex<Option<TcpStream>>,
    stats: RwLock<ConnectionStats>,
}

impl TcpClient {
    /// Creates a new TCP client.
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            stream: Mutex::new(None),
            stats: RwLock::new(ConnectionStats::default()),
        }
    }

    /// Remote address as `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    async fn set_state(&self, new_state: ConnectionState) {
        let mut state = self.state.write().await;
        if *state != new_state {
            debug!("TCP state: {:?} -> {:?}", *state, new_state);
            *state = new_state;
        }
    }

    /// Sends a request frame.
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        let mut stream_guard = self.stream.lock().await;
        let stream = stream_guard.as_mut().ok_or_else(|| LoggerError::NotConnected {
            connection_id: self.address(),
        })?;

        timeout(self.config.write_timeout, stream.write_all(data))
            .await
            .map_err(|_| LoggerError::ResponseTimeout { transaction_id: 0 })?
            .map_err(|_| LoggerError::ConnectionReset {
                address: self.address(),
            })?;

        let mut stats = self.stats.write().await;
        stats.bytes_sent += data.len() as u64;
        stats.requests_total += 1;
        Ok(())
    }

    /// Receives exactly `len` bytes within the read timeout.
    ///
    /// A clean EOF surfaces as `ConnectionReset` so the caller can tear the
    /// session down.
    pub async fn recv_exact(&self, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        {
            let mut stream_guard = self.stream.lock().await;
            let stream = stream_guard.as_mut().ok_or_else(|| LoggerError::NotConnected {
                connection_id: self.address(),
            })?;

            timeout(self.config.read_timeout, stream.read_exact(&mut buffer))
                .await
                .map_err(|_| LoggerError::ResponseTimeout { transaction_id: 0 })?
                .map_err(|_| LoggerError::ConnectionReset {
                    address: self.address(),
                })?;
        }

        self.stats.write().await.bytes_received += len as u64;
        Ok(buffer)
    }

    /// Records a failed request in the stats.
    pub async fn record_failure(&self) {
        self.stats.write().await.requests_failed += 1;
    }

    /// Returns a snapshot of the transfer statistics.
    pub async fn stats(&self) -> ConnectionStats {
        self.stats.read().await.clone()
    }
}

#[async_trait]
impl super::Transport for TcpClient {
    async fn connect(&self) -> Result<()> {
        self.set_state(ConnectionState::Connecting).await;

        let connect_fut = TcpStream::connect((self.config.host.as_str(), self.config.port));
        let stream = match timeout(self.config.connect_timeout, connect_fut).await {
            Err(_) => {
                self.set_state(ConnectionState::Disconnected).await;
                return Err(LoggerError::ConnectionTimeout {
                    address: self.address(),
                    timeout_ms: self.config.connect_timeout.as_millis() as u32,
                });
            }
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Disconnected).await;
                return Err(LoggerError::ConnectionFailed {
                    address: self.address(),
                    reason: e.to_string(),
                });
            }
            Ok(Ok(stream)) => stream,
        };

        stream.set_nodelay(self.config.tcp_nodelay)?;

        *self.stream.lock().await = Some(stream);
        self.set_state(ConnectionState::Connected).await;

        info!("Connected to {}", self.address());
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let mut stream_guard = self.stream.lock().await;
        if let Some(stream) = stream_guard.take() {
            drop(stream);
        }
        drop(stream_guard);
        self.set_state(ConnectionState::Disconnected).await;
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.state
            .try_read()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Disconnected)
    }
}
