//! Common types for the data logger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Data Types
// =============================================================================

/// Supported tag data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    /// Boolean (single bit or register)
    Bool = 0,
    /// Signed 16-bit integer
    Int16 = 1,
    /// Unsigned 16-bit integer
    UInt16 = 2,
    /// Signed 32-bit integer (2 registers)
    Int32 = 3,
    /// Unsigned 32-bit integer (2 registers)
    UInt32 = 4,
    /// 32-bit floating point (2 registers)
    Float32 = 5,
}

impl DataType {
    /// Returns the number of 16-bit registers consumed by this data type.
    pub fn word_count(&self) -> u16 {
        match self {
            Self::Bool | Self::Int16 | Self::UInt16 => 1,
            Self::Int32 | Self::UInt32 | Self::Float32 => 2,
        }
    }
}

impl Default for DataType {
    fn default() -> Self {
        Self::UInt16
    }
}

// =============================================================================
// Register Types
// =============================================================================

/// Register types in MODBUS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum RegisterType {
    /// Holding registers (FC 03)
    HoldingRegister = 0,
    /// Input registers (FC 04)
    InputRegister = 1,
    /// Coils (FC 01)
    Coil = 2,
    /// Discrete inputs (FC 02)
    DiscreteInput = 3,
}

impl RegisterType {
    /// Returns the MODBUS function code for reading this register type.
    pub fn read_function_code(&self) -> u8 {
        match self {
            Self::HoldingRegister => 0x03,
            Self::InputRegister => 0x04,
            Self::Coil => 0x01,
            Self::DiscreteInput => 0x02,
        }
    }

    /// Returns true for bit-addressed register types (coils, discrete inputs).
    pub fn is_bit(&self) -> bool {
        matches!(self, Self::Coil | Self::DiscreteInput)
    }

    /// Maximum quantity readable in one request for this register type.
    ///
    /// 125 words for register reads, 2000 bits for bit reads.
    pub fn max_read_quantity(&self) -> u16 {
        if self.is_bit() {
            2000
        } else {
            125
        }
    }
}

impl Default for RegisterType {
    fn default() -> Self {
        Self::HoldingRegister
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Connection state of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ConnectionState {
    /// Not connected
    Disconnected = 0,
    /// Connection in progress
    Connecting = 1,
    /// Connected and ready
    Connected = 2,
    /// Attempting to reconnect
    Reconnecting = 3,
}

// =============================================================================
// Alarm State
// =============================================================================

/// Per-sample alarm classification.
///
/// Every observed sample is classified independently against the current
/// thresholds; there is no hysteresis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AlarmState {
    /// Within all configured bands
    Normal = 0,
    /// At or below the low threshold
    Low = 1,
    /// At or below the low-low threshold
    LowLow = 2,
    /// At or above the high threshold
    High = 3,
    /// At or above the high-high threshold
    HighHigh = 4,
    /// Deviates from the baseline by more than the sigma factor
    Outlier = 5,
    /// Bad quality or non-numeric where numeric was required
    Error = 6,
}

impl std::fmt::Display for AlarmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Normal => "Normal",
            Self::Low => "Low",
            Self::LowLow => "LowLow",
            Self::High => "High",
            Self::HighHigh => "HighHigh",
            Self::Outlier => "Outlier",
            Self::Error => "Error",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Value Types
// =============================================================================

/// A tag value that can hold different primitive types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TagValue {
    /// Boolean
    Bool(bool),
    /// Signed 16-bit
    I16(i16),
    /// Unsigned 16-bit
    U16(u16),
    /// Signed 32-bit
    I32(i32),
    /// Unsigned 32-bit
    U32(u32),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// String
    Text(String),
    /// No value
    Null,
}

impl TagValue {
    /// Coerces to f64 for statistics and threshold comparison.
    ///
    /// Booleans, strings and null are not numeric and return `None`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::I16(v) => Some(*v as f64),
            Self::U16(v) => Some(*v as f64),
            Self::I32(v) => Some(*v as f64),
            Self::U32(v) => Some(*v as f64),
            Self::F32(v) => Some(*v as f64),
            Self::F64(v) => Some(*v),
            Self::Bool(_) | Self::Text(_) | Self::Null => None,
        }
    }

    /// Returns true if the value coerces to f64.
    pub fn is_numeric(&self) -> bool {
        self.as_f64().is_some()
    }

    /// Returns true if the value is null or an empty string.
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl std::fmt::Display for TagValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::I16(v) => write!(f, "{}", v),
            Self::U16(v) => write!(f, "{}", v),
            Self::I32(v) => write!(f, "{}", v),
            Self::U32(v) => write!(f, "{}", v),
            Self::F32(v) => write!(f, "{}", v),
            Self::F64(v) => write!(f, "{}", v),
            Self::Text(s) => f.write_str(s),
            Self::Null => Ok(()),
        }
    }
}

// =============================================================================
// Samples
// =============================================================================

/// A raw sample produced by a connector.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Connection that produced the sample
    pub connection_id: String,
    /// Tag name
    pub tag_name: String,
    /// Acquisition timestamp (UTC)
    pub timestamp: DateTime<Utc>,
    /// The sampled value
    pub value: TagValue,
    /// Data quality
    pub is_good_quality: bool,
    /// Error detail when quality is bad
    pub error_message: Option<String>,
}

impl Sample {
    /// Creates a good-quality sample stamped with the current time.
    pub fn good(connection_id: &str, tag_name: &str, value: TagValue) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            tag_name: tag_name.to_string(),
            timestamp: Utc::now(),
            value,
            is_good_quality: true,
            error_message: None,
        }
    }

    /// Creates a bad-quality sample stamped with the current time.
    pub fn bad(connection_id: &str, tag_name: &str, error_message: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            tag_name: tag_name.to_string(),
            timestamp: Utc::now(),
            value: TagValue::Null,
            is_good_quality: false,
            error_message: Some(error_message.into()),
        }
    }
}

/// A sample enriched by the analyzer, ready for persistence.
#[derive(Debug, Clone)]
pub struct AnnotatedSample {
    /// The underlying sample
    pub sample: Sample,
    /// Alarm classification for this observation
    pub alarm_state: AlarmState,
    /// Baseline mean after this observation, if statistics ran
    pub mean: Option<f64>,
    /// Baseline standard deviation after this observation, if statistics ran
    pub stddev: Option<f64>,
    /// Rendered alarm message when the state is not Normal
    pub alarm_message: Option<String>,
    /// True when this observation changed the tag's alarm state
    pub state_changed: bool,
}

// =============================================================================
// Connection Statistics
// =============================================================================

/// Per-connection transfer statistics.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStats {
    /// Bytes sent
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_received: u64,
    /// Requests issued
    pub requests_total: u64,
    /// Requests that failed
    pub requests_failed: u64,
}
