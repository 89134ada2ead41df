//! Error types for the data logger.

use thiserror::Error;

/// Result type alias for logger operations.
pub type Result<T> = std::result::Result<T, LoggerError>;

/// Data logger error types.
#[derive(Error, Debug)]
pub enum LoggerError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================

    /// Invalid configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },

    /// Settings file could not be read or parsed
    #[error("Failed to load configuration from {path}: {reason}")]
    ConfigLoad {
        path: String,
        reason: String,
    },

    // =========================================================================
    // Transport Errors
    // =========================================================================

    /// TCP connection failed
    #[error("Connection failed to {address}: {reason}")]
    ConnectionFailed {
        address: String,
        reason: String,
    },

    /// Connection timeout
    #[error("Connection timeout to {address} after {timeout_ms}ms")]
    ConnectionTimeout {
        address: String,
        timeout_ms: u32,
    },

    /// Connection reset or closed by peer
    #[error("Connection reset by {address}")]
    ConnectionReset {
        address: String,
    },

    /// Not connected
    #[error("Not connected to {connection_id}")]
    NotConnected {
        connection_id: String,
    },

    /// Response timeout
    #[error("Response timeout for transaction {transaction_id}")]
    ResponseTimeout {
        transaction_id: u16,
    },

    // =========================================================================
    // Protocol Errors
    // =========================================================================

    /// MODBUS exception response
    #[error("MODBUS exception {exception_code:#04X} ({name})")]
    ModbusException {
        function_code: u8,
        exception_code: u8,
        name: &'static str,
    },

    /// Invalid response frame
    #[error("Invalid response: {reason}")]
    InvalidResponse {
        reason: String,
    },

    /// Transaction ID mismatch
    #[error("Transaction ID mismatch: expected {expected}, got {actual}")]
    TransactionMismatch {
        expected: u16,
        actual: u16,
    },

    /// No OPC-UA endpoint matched the configured security pair
    #[error("No endpoint at {endpoint_url} matches mode {mode} / policy {policy}")]
    NoMatchingEndpoint {
        endpoint_url: String,
        mode: String,
        policy: String,
    },

    /// OPC-UA session or service failure
    #[error("OPC-UA failure: {reason}")]
    OpcUa {
        reason: String,
    },

    // =========================================================================
    // Decode Errors
    // =========================================================================

    /// Decoder received an empty register array
    #[error("Cannot decode from empty register array")]
    EmptyInput,

    /// Decoder received fewer registers than the data type requires
    #[error("Insufficient registers: need {need}, got {got}")]
    InsufficientRegisters {
        need: usize,
        got: usize,
    },

    // =========================================================================
    // Analysis Errors
    // =========================================================================

    /// A numeric value was required but the sample carried none
    #[error("Non-numeric value for tag {tag_name}")]
    NonNumericValue {
        tag_name: String,
    },

    // =========================================================================
    // Sink Errors
    // =========================================================================

    /// Sink write or flush failure
    #[error("Sink write failed for {path}: {reason}")]
    SinkWrite {
        path: String,
        reason: String,
    },

    // =========================================================================
    // Internal Errors
    // =========================================================================

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send error
    #[error("Channel send error")]
    ChannelSend,

    /// Internal error
    #[error("Internal error: {reason}")]
    Internal {
        reason: String,
    },
}

impl LoggerError {
    /// Returns a stable numeric code for event payloads.
    pub fn error_code(&self) -> u16 {
        match self {
            // Configuration errors: 1xx
            Self::InvalidConfig { .. } => 100,
            Self::ConfigLoad { .. } => 101,

            // Transport errors: 2xx
            Self::ConnectionFailed { .. } => 200,
            Self::ConnectionTimeout { .. } => 201,
            Self::ConnectionReset { .. } => 202,
            Self::NotConnected { .. } => 203,
            Self::ResponseTimeout { .. } => 204,

            // Protocol errors: 3xx
            Self::ModbusException { exception_code, .. } => 300 + *exception_code as u16,
            Self::InvalidResponse { .. } => 330,
            Self::TransactionMismatch { .. } => 331,
            Self::NoMatchingEndpoint { .. } => 340,
            Self::OpcUa { .. } => 341,

            // Decode errors: 4xx
            Self::EmptyInput => 400,
            Self::InsufficientRegisters { .. } => 401,

            // Analysis errors: 5xx
            Self::NonNumericValue { .. } => 500,

            // Sink errors: 6xx
            Self::SinkWrite { .. } => 600,

            // Internal errors: 9xx
            Self::Io(_) => 900,
            Self::ChannelSend => 901,
            Self::Internal { .. } => 902,
        }
    }

    /// Returns whether this error is recovered locally (reconnect or retry)
    /// rather than ending the session.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::ConnectionTimeout { .. } => true,
            Self::ConnectionReset { .. } => true,
            Self::ResponseTimeout { .. } => true,
            Self::ModbusException { exception_code, .. } => {
                // Acknowledge and Busy clear on their own
                *exception_code == 0x05 || *exception_code == 0x06
            }
            Self::SinkWrite { .. } => true,
            _ => false,
        }
    }

    /// Creates a MODBUS exception error from a raw exception code.
    pub fn modbus_exception(function_code: u8, exception_code: u8) -> Self {
        Self::ModbusException {
            function_code,
            exception_code,
            name: modbus_exception_name(exception_code),
        }
    }
}

/// Canonical name of a MODBUS exception code.
///
/// The names flow into sample error messages and the CSV log, so they are
/// spelled compactly without spaces.
pub fn modbus_exception_name(exception_code: u8) -> &'static str {
    match exception_code {
        0x01 => "IllegalFunction",
        0x02 => "IllegalDataAddress",
        0x03 => "IllegalDataValue",
        0x04 => "SlaveDeviceFailure",
        0x05 => "Acknowledge",
        0x06 => "SlaveDeviceBusy",
        0x07 => "NegativeAcknowledge",
        0x08 => "MemoryParityError",
        0x0A => "GatewayPathUnavailable",
        0x0B => "GatewayTargetDeviceFailedToRespond",
        _ => "UnknownException",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = LoggerError::ConnectionTimeout {
            address: "192.168.1.10:502".into(),
            timeout_ms: 2000,
        };
        assert_eq!(err.error_code(), 201);

        let err = LoggerError::modbus_exception(0x03, 0x02);
        assert_eq!(err.error_code(), 302);
    }

    #[test]
    fn test_exception_names() {
        assert_eq!(modbus_exception_name(0x02), "IllegalDataAddress");
        assert_eq!(modbus_exception_name(0x04), "SlaveDeviceFailure");
        assert_eq!(modbus_exception_name(0xFF), "UnknownException");
    }

    #[test]
    fn test_recoverable() {
        let err = LoggerError::ResponseTimeout { transaction_id: 1 };
        assert!(err.is_recoverable());

        let err = LoggerError::modbus_exception(0x03, 0x06);
        assert!(err.is_recoverable());

        let err = LoggerError::modbus_exception(0x03, 0x02);
        assert!(!err.is_recoverable());

        let err = LoggerError::InvalidConfig { reason: "bad".into() };
        assert!(!err.is_recoverable());
    }
}
