//! MODBUS TCP protocol implementation.
//!
//! MBAP framing over [`TcpClient`]. Only the four read function codes are
//! issued: 0x01 ReadCoils, 0x02 ReadDiscreteInputs, 0x03 ReadHoldingRegisters,
//! 0x04 ReadInputRegisters.

use crate::transport::{TcpClient, TcpConfig, Transport};
use crate::types::{ConnectionStats, RegisterType};
use crate::{ConnectionState, LoggerError, Result};
use std::sync::atomic::{AtomicU16, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// MODBUS read request.
#[derive(Debug, Clone)]
pub struct ModbusReadRequest {
    /// Register type
    pub register_type: RegisterType,
    /// Starting address
    pub address: u16,
    /// Number of registers or bits
    pub quantity: u16,
}

/// Decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ModbusPayload {
    /// 16-bit register values (FC 0x03 / 0x04)
    Registers(Vec<u16>),
    /// Bit values (FC 0x01 / 0x02)
    Bits(Vec<bool>),
}

/// MODBUS TCP client.
pub struct ModbusTcpClient {
    tcp: TcpClient,
    unit_id: u8,
    /// Transaction ID counter; zero is skipped
    transaction_id: AtomicU16,
    /// Serializes request/response exchanges on the single stream
    io_lock: Mutex<()>,
}

impl ModbusTcpClient {
    /// Creates a new MODBUS TCP client.
    pub fn new(tcp_config: TcpConfig, unit_id: u8) -> Self {
        Self {
            tcp: TcpClient::new(tcp_config),
            unit_id,
            transaction_id: AtomicU16::new(1),
            io_lock: Mutex::new(()),
        }
    }

    /// Remote address as `host:port`.
    pub fn address(&self) -> String {
        self.tcp.address()
    }

    /// Connects to the device.
    pub async fn connect(&self) -> Result<()> {
        self.tcp.connect().await
    }

    /// Disconnects from the device.
    pub async fn disconnect(&self) -> Result<()> {
        self.tcp.disconnect().await
    }

    /// Returns whether the client is connected.
    pub fn is_connected(&self) -> bool {
        self.tcp.is_connected()
    }

    /// Returns the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.tcp.state()
    }

    /// Returns a snapshot of the transfer statistics.
    pub async fn stats(&self) -> ConnectionStats {
        self.tcp.stats().await
    }

    /// Generates the next transaction ID, never zero.
    fn next_transaction_id(&self) -> u16 {
        let id = self.transaction_id.fetch_add(1, Ordering::SeqCst);
        if id == 0 {
            self.transaction_id.fetch_add(1, Ordering::SeqCst)
        } else {
            id
        }
    }

    /// Reads registers or bits from the device.
    pub async fn read(&self, request: ModbusReadRequest) -> Result<ModbusPayload> {
        let limit = request.register_type.max_read_quantity();
        if request.quantity == 0 || request.quantity > limit {
            return Err(LoggerError::Internal {
                reason: format!(
                    "read quantity {} outside 1-{} for {:?}",
                    request.quantity, limit, request.register_type
                ),
            });
        }

        let _io = self.io_lock.lock().await;

        let transaction_id = self.next_transaction_id();
        let function_code = request.register_type.read_function_code();

        let pdu = [
            function_code,
            (request.address >> 8) as u8,
            (request.address & 0xFF) as u8,
            (request.quantity >> 8) as u8,
            (request.quantity & 0xFF) as u8,
        ];

        let mbap = build_mbap(transaction_id, self.unit_id, pdu.len());
        let mut frame = Vec::with_capacity(mbap.len() + pdu.len());
        frame.extend_from_slice(&mbap);
        frame.extend_from_slice(&pdu);

        debug!(
            transaction_id,
            function_code,
            address = request.address,
            quantity = request.quantity,
            "MODBUS read"
        );

        if let Err(e) = self.tcp.send(&frame).await {
            self.tcp.record_failure().await;
            return Err(e);
        }

        let header = match self.tcp.recv_exact(7).await {
            Ok(h) => h,
            Err(e) => {
                self.tcp.record_failure().await;
                return Err(match e {
                    LoggerError::ResponseTimeout { .. } => {
                        LoggerError::ResponseTimeout { transaction_id }
                    }
                    other => other,
                });
            }
        };

        let resp_transaction_id = u16::from_be_bytes([header[0], header[1]]);
        let protocol_id = u16::from_be_bytes([header[2], header[3]]);
        let length = u16::from_be_bytes([header[4], header[5]]) as usize;

        if protocol_id != 0 {
            self.tcp.record_failure().await;
            return Err(LoggerError::InvalidResponse {
                reason: format!("invalid protocol ID {}", protocol_id),
            });
        }
        if !(2..=256).contains(&length) {
            self.tcp.record_failure().await;
            return Err(LoggerError::InvalidResponse {
                reason: format!("implausible MBAP length {}", length),
            });
        }

        // Header already carried the unit ID; the rest is the PDU
        let pdu = match self.tcp.recv_exact(length - 1).await {
            Ok(p) => p,
            Err(e) => {
                self.tcp.record_failure().await;
                return Err(e);
            }
        };

        if resp_transaction_id != transaction_id {
            self.tcp.record_failure().await;
            return Err(LoggerError::TransactionMismatch {
                expected: transaction_id,
                actual: resp_transaction_id,
            });
        }

        if pdu.is_empty() {
            self.tcp.record_failure().await;
            return Err(LoggerError::InvalidResponse {
                reason: "empty PDU".into(),
            });
        }

        // Exception responses set the high bit of the function code
        if pdu[0] & 0x80 != 0 {
            self.tcp.record_failure().await;
            let exception_code = pdu.get(1).copied().unwrap_or(0);
            return Err(LoggerError::modbus_exception(pdu[0] & 0x7F, exception_code));
        }

        if pdu[0] != function_code {
            self.tcp.record_failure().await;
            return Err(LoggerError::InvalidResponse {
                reason: format!("function code mismatch: sent {:#04X}, got {:#04X}", function_code, pdu[0]),
            });
        }

        let byte_count = pdu.get(1).copied().unwrap_or(0) as usize;
        let data = pdu.get(2..2 + byte_count).ok_or_else(|| LoggerError::InvalidResponse {
            reason: format!("byte count {} exceeds PDU", byte_count),
        })?;

        if request.register_type.is_bit() {
            Ok(ModbusPayload::Bits(unpack_bits(data, request.quantity as usize)))
        } else {
            if byte_count != request.quantity as usize * 2 {
                return Err(LoggerError::InvalidResponse {
                    reason: format!(
                        "expected {} data bytes, got {}",
                        request.quantity as usize * 2,
                        byte_count
                    ),
                });
            }
            let values = data
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            Ok(ModbusPayload::Registers(values))
        }
    }
}

/// Builds an MBAP header: transaction ID, protocol 0, length, unit ID.
fn build_mbap(transaction_id: u16, unit_id: u8, pdu_length: usize) -> [u8; 7] {
    let length = (pdu_length + 1) as u16; // PDU + unit_id
    [
        (transaction_id >> 8) as u8,
        (transaction_id & 0xFF) as u8,
        0x00,
        0x00,
        (length >> 8) as u8,
        (length & 0xFF) as u8,
        unit_id,
    ]
}

/// Unpacks a bit-read response, LSB-first within each byte.
fn unpack_bits(data: &[u8], quantity: usize) -> Vec<bool> {
    let mut bits = Vec::with_capacity(quantity);
    for (i, byte) in data.iter().enumerate() {
        for bit in 0..8 {
            if i * 8 + bit >= quantity {
                break;
            }
            bits.push(byte & (1 << bit) != 0);
        }
    }
    bits
}
