//! Configuration types for the data logger.

use crate::types::*;
use crate::{LoggerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Smallest allowed baseline window.
pub const MIN_BASELINE_SAMPLE_SIZE: u32 = 5;

/// Smallest allowed OPC-UA sampling interval in milliseconds.
pub const MIN_SAMPLING_INTERVAL_MS: u32 = 50;

// =============================================================================
// Logger Configuration
// =============================================================================

/// Complete logger configuration, the top-level shape of the settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// Connection configurations
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,

    /// Base directory for logged data
    #[serde(default = "default_output_base_dir")]
    pub output_base_dir: PathBuf,
}

impl LoggerConfig {
    /// Parses a configuration from a JSON string.
    ///
    /// Unknown fields are ignored; missing optional fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| LoggerError::InvalidConfig {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration from a settings file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| LoggerError::ConfigLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json_str(&json).map_err(|e| LoggerError::ConfigLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for connection in &self.connections {
            let name = connection.connection_name();
            if name.is_empty() {
                return Err(LoggerError::InvalidConfig {
                    reason: "connection_name must not be empty".into(),
                });
            }
            if !names.insert(name.to_string()) {
                return Err(LoggerError::InvalidConfig {
                    reason: format!("duplicate connection_name: {}", name),
                });
            }
            connection.validate()?;
        }
        Ok(())
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            connections: Vec::new(),
            output_base_dir: default_output_base_dir(),
        }
    }
}

// =============================================================================
// Connection Configuration
// =============================================================================

/// A single connection entry, tagged by protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionConfig {
    /// MODBUS TCP connection
    Modbus(ModbusConnectionConfig),
    /// OPC-UA connection
    Opcua(OpcUaConnectionConfig),
}

impl ConnectionConfig {
    /// Returns the connection name.
    pub fn connection_name(&self) -> &str {
        match self {
            Self::Modbus(c) => &c.connection_name,
            Self::Opcua(c) => &c.connection_name,
        }
    }

    /// Returns whether the connection is enabled.
    pub fn enabled(&self) -> bool {
        match self {
            Self::Modbus(c) => c.enabled,
            Self::Opcua(c) => c.enabled,
        }
    }

    /// Validates the connection configuration.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Modbus(c) => c.validate(),
            Self::Opcua(c) => c.validate(),
        }
    }
}

// =============================================================================
// MODBUS Configuration
// =============================================================================

/// MODBUS TCP connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConnectionConfig {
    /// Unique connection name
    pub connection_name: String,

    /// Whether the connection participates in logging
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Device host name or IP address
    pub host: String,

    /// MODBUS port (default 502)
    #[serde(default = "default_modbus_port")]
    pub port: u16,

    /// MODBUS unit/slave ID (1-247)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Scan cycle interval in milliseconds
    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u32,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u32,

    /// Response timeout in milliseconds
    #[serde(default = "default_response_timeout")]
    pub response_timeout_ms: u32,

    /// Monitored tags
    #[serde(default)]
    pub tags: Vec<ModbusTagConfig>,
}

impl ModbusConnectionConfig {
    /// Validates the connection and all of its tags.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(LoggerError::InvalidConfig {
                reason: format!("{}: host must not be empty", self.connection_name),
            });
        }
        if self.unit_id == 0 || self.unit_id > 247 {
            return Err(LoggerError::InvalidConfig {
                reason: format!(
                    "{}: unit_id {} out of range 1-247",
                    self.connection_name, self.unit_id
                ),
            });
        }
        if self.scan_interval_ms == 0 {
            return Err(LoggerError::InvalidConfig {
                reason: format!("{}: scan_interval_ms must be > 0", self.connection_name),
            });
        }
        for tag in &self.tags {
            tag.validate(&self.connection_name)?;
        }
        Ok(())
    }
}

/// MODBUS tag configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusTagConfig {
    /// Tag name
    pub tag_name: String,

    /// Register address (0-based)
    pub address: u16,

    /// Register type
    #[serde(default)]
    pub register_type: RegisterType,

    /// Configured data type; bit registers always report Bool
    #[serde(default)]
    data_type: DataType,

    /// Whether the tag is polled
    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Alarm and outlier analysis settings
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl ModbusTagConfig {
    /// Creates a tag with the given addressing and data type.
    pub fn new(tag_name: &str, address: u16, register_type: RegisterType, data_type: DataType) -> Self {
        Self {
            tag_name: tag_name.to_string(),
            address,
            register_type,
            data_type,
            is_active: true,
            analysis: AnalysisConfig::default(),
        }
    }

    /// Returns the effective data type.
    ///
    /// Coils and discrete inputs are single bits; their data type is Bool no
    /// matter what the settings file carries.
    pub fn data_type(&self) -> DataType {
        if self.register_type.is_bit() {
            DataType::Bool
        } else {
            self.data_type
        }
    }

    /// Sets the data type. Ignored for bit register types.
    pub fn set_data_type(&mut self, data_type: DataType) {
        if !self.register_type.is_bit() {
            self.data_type = data_type;
        }
    }

    /// Number of registers (or bits) this tag occupies.
    pub fn word_count(&self) -> u16 {
        self.data_type().word_count()
    }

    /// Last register (or bit) address this tag occupies.
    pub fn end_address(&self) -> u16 {
        self.address + self.word_count() - 1
    }

    fn validate(&self, connection_name: &str) -> Result<()> {
        if self.tag_name.is_empty() {
            return Err(LoggerError::InvalidConfig {
                reason: format!("{}: tag_name must not be empty", connection_name),
            });
        }
        if u32::from(self.address) + u32::from(self.word_count()) > 0x10000 {
            return Err(LoggerError::InvalidConfig {
                reason: format!(
                    "{}/{}: tag overruns the register address space",
                    connection_name, self.tag_name
                ),
            });
        }
        self.analysis.validate(connection_name, &self.tag_name)
    }
}

// =============================================================================
// OPC-UA Configuration
// =============================================================================

/// OPC-UA connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpcUaConnectionConfig {
    /// Unique connection name
    pub connection_name: String,

    /// Whether the connection participates in logging
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Endpoint URL, e.g. `opc.tcp://host:4840`
    pub endpoint_url: String,

    /// Endpoint security selection
    #[serde(default)]
    pub security: SecurityConfig,

    /// User authentication
    #[serde(default)]
    pub user_auth: UserAuth,

    /// Accept server certificates that are not in the trusted store.
    ///
    /// Off by default; enabling it downgrades the PKI check and is reported
    /// as a Warning event on connect.
    #[serde(default)]
    pub auto_accept_untrusted: bool,

    /// Monitored tags
    #[serde(default)]
    pub tags: Vec<OpcUaTagConfig>,
}

impl OpcUaConnectionConfig {
    /// Validates the connection and all of its tags.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint_url.is_empty() {
            return Err(LoggerError::InvalidConfig {
                reason: format!("{}: endpoint_url must not be empty", self.connection_name),
            });
        }
        for tag in &self.tags {
            tag.validate(&self.connection_name)?;
        }
        Ok(())
    }

    /// Publishing interval for the connection's subscription: the smallest
    /// sampling interval among active tags.
    pub fn publishing_interval_ms(&self) -> u32 {
        self.tags
            .iter()
            .filter(|t| t.is_active)
            .map(|t| t.sampling_interval_ms)
            .min()
            .unwrap_or(default_sampling_interval())
    }
}

/// Endpoint security mode and policy pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Message security mode
    #[serde(default)]
    pub mode: SecurityMode,
    /// Security policy
    #[serde(default)]
    pub policy: SecurityPolicy,
}

/// OPC-UA message security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecurityMode {
    /// No message security
    #[default]
    None,
    /// Messages are signed
    Sign,
    /// Messages are signed and encrypted
    SignAndEncrypt,
}

/// OPC-UA security policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SecurityPolicy {
    /// No security policy
    #[default]
    None,
    /// Basic256Sha256
    Basic256Sha256,
    /// Aes128-Sha256-RsaOaep
    #[serde(rename = "Aes128_Sha256_RsaOaep")]
    Aes128Sha256RsaOaep,
    /// Aes256-Sha256-RsaPss
    #[serde(rename = "Aes256_Sha256_RsaPss")]
    Aes256Sha256RsaPss,
}

/// User authentication for session activation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum UserAuth {
    /// Anonymous token
    #[default]
    Anonymous,
    /// Username and password token
    UserPass {
        username: String,
        password: String,
    },
}

/// OPC-UA tag configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpcUaTagConfig {
    /// Tag name
    pub tag_name: String,

    /// Node identifier, e.g. `ns=2;s=Pump.Speed` or `ns=5;i=1242`
    pub node_id: String,

    /// Server-side sampling interval in milliseconds (min 50)
    #[serde(default = "default_sampling_interval")]
    pub sampling_interval_ms: u32,

    /// Whether the tag is monitored
    #[serde(default = "default_true")]
    pub is_active: bool,

    /// Alarm and outlier analysis settings
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

impl OpcUaTagConfig {
    fn validate(&self, connection_name: &str) -> Result<()> {
        if self.tag_name.is_empty() {
            return Err(LoggerError::InvalidConfig {
                reason: format!("{}: tag_name must not be empty", connection_name),
            });
        }
        if self.node_id.is_empty() {
            return Err(LoggerError::InvalidConfig {
                reason: format!("{}/{}: node_id must not be empty", connection_name, self.tag_name),
            });
        }
        if self.sampling_interval_ms < MIN_SAMPLING_INTERVAL_MS {
            return Err(LoggerError::InvalidConfig {
                reason: format!(
                    "{}/{}: sampling_interval_ms {} below minimum {}",
                    connection_name, self.tag_name, self.sampling_interval_ms, MIN_SAMPLING_INTERVAL_MS
                ),
            });
        }
        self.analysis.validate(connection_name, &self.tag_name)
    }
}

// =============================================================================
// Analysis Configuration
// =============================================================================

/// Per-tag alarm thresholds and outlier detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Whether threshold alarming runs for this tag
    #[serde(default)]
    pub alarming_enabled: bool,

    /// Low-low threshold
    #[serde(default)]
    pub low_low: Option<f64>,

    /// Low threshold
    #[serde(default)]
    pub low: Option<f64>,

    /// High threshold
    #[serde(default)]
    pub high: Option<f64>,

    /// High-high threshold
    #[serde(default)]
    pub high_high: Option<f64>,

    /// Whether baseline outlier detection runs for this tag
    #[serde(default)]
    pub outlier_enabled: bool,

    /// Baseline window size in samples (min 5)
    #[serde(default = "default_baseline_sample_size")]
    pub baseline_sample_size: u32,

    /// Sigma multiplier for outlier classification (> 0)
    #[serde(default = "default_outlier_sigma_factor")]
    pub outlier_sigma_factor: f64,

    /// Alarm message template with `{TagName}`, `{AlarmState}` and `{Value}`
    /// placeholders
    #[serde(default = "default_alarm_message_format")]
    pub alarm_message_format: String,
}

impl AnalysisConfig {
    fn validate(&self, connection_name: &str, tag_name: &str) -> Result<()> {
        // Ordering constraint over every present pair
        let ordered = [self.low_low, self.low, self.high, self.high_high];
        let mut previous: Option<f64> = None;
        for threshold in ordered.into_iter().flatten() {
            if let Some(p) = previous {
                if threshold < p {
                    return Err(LoggerError::InvalidConfig {
                        reason: format!(
                            "{}/{}: thresholds must satisfy low_low <= low <= high <= high_high",
                            connection_name, tag_name
                        ),
                    });
                }
            }
            previous = Some(threshold);
        }

        if self.baseline_sample_size < MIN_BASELINE_SAMPLE_SIZE {
            return Err(LoggerError::InvalidConfig {
                reason: format!(
                    "{}/{}: baseline_sample_size {} below minimum {}",
                    connection_name, tag_name, self.baseline_sample_size, MIN_BASELINE_SAMPLE_SIZE
                ),
            });
        }

        if !(self.outlier_sigma_factor > 0.0) {
            return Err(LoggerError::InvalidConfig {
                reason: format!(
                    "{}/{}: outlier_sigma_factor must be > 0",
                    connection_name, tag_name
                ),
            });
        }

        Ok(())
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            alarming_enabled: false,
            low_low: None,
            low: None,
            high: None,
            high_high: None,
            outlier_enabled: false,
            baseline_sample_size: default_baseline_sample_size(),
            outlier_sigma_factor: default_outlier_sigma_factor(),
            alarm_message_format: default_alarm_message_format(),
        }
    }
}

// =============================================================================
// Default Value Functions
// =============================================================================

fn default_true() -> bool { true }
fn default_modbus_port() -> u16 { 502 }
fn default_unit_id() -> u8 { 1 }
fn default_scan_interval() -> u32 { 1000 }
fn default_connect_timeout() -> u32 { 5000 }
fn default_response_timeout() -> u32 { 2000 }
fn default_sampling_interval() -> u32 { 500 }
fn default_baseline_sample_size() -> u32 { 20 }
fn default_outlier_sigma_factor() -> f64 { 3.0 }
fn default_alarm_message_format() -> String { "{TagName}: {AlarmState} at {Value}".into() }
fn default_output_base_dir() -> PathBuf { PathBuf::from(".") }

#[cfg(test)]
mod tests {
    use super::*;

    fn modbus_json() -> &'static str {
        r#"{
            "connections": [
                {
                    "type": "modbus",
                    "connection_name": "line-1",
                    "host": "192.168.1.10",
                    "tags": [
                        {
                            "tag_name": "temperature",
                            "address": 100,
                            "register_type": "HoldingRegister",
                            "data_type": "Float32",
                            "analysis": {
                                "alarming_enabled": true,
                                "high": 80.0,
                                "high_high": 95.0
                            }
                        }
                    ]
                }
            ],
            "output_base_dir": "/var/log/plant"
        }"#
    }

    #[test]
    fn test_parse_modbus_connection() {
        let config = LoggerConfig::from_json_str(modbus_json()).unwrap();
        assert_eq!(config.connections.len(), 1);
        assert_eq!(config.output_base_dir, PathBuf::from("/var/log/plant"));

        match &config.connections[0] {
            ConnectionConfig::Modbus(c) => {
                assert_eq!(c.connection_name, "line-1");
                assert_eq!(c.port, 502);
                assert_eq!(c.unit_id, 1);
                assert_eq!(c.scan_interval_ms, 1000);
                assert_eq!(c.response_timeout_ms, 2000);
                let tag = &c.tags[0];
                assert_eq!(tag.data_type(), DataType::Float32);
                assert_eq!(tag.word_count(), 2);
                assert!(tag.is_active);
                assert_eq!(tag.analysis.high, Some(80.0));
            }
            _ => panic!("expected modbus connection"),
        }
    }

    #[test]
    fn test_parse_opcua_connection() {
        let json = r#"{
            "connections": [
                {
                    "type": "opcua",
                    "connection_name": "press-7",
                    "endpoint_url": "opc.tcp://10.0.0.5:4840",
                    "security": { "mode": "SignAndEncrypt", "policy": "Basic256Sha256" },
                    "user_auth": { "method": "UserPass", "username": "logger", "password": "secret" },
                    "tags": [
                        { "tag_name": "pressure", "node_id": "ns=2;s=Press.Pressure", "sampling_interval_ms": 100 },
                        { "tag_name": "count", "node_id": "ns=5;i=1242" }
                    ]
                }
            ]
        }"#;

        let config = LoggerConfig::from_json_str(json).unwrap();
        match &config.connections[0] {
            ConnectionConfig::Opcua(c) => {
                assert_eq!(c.security.mode, SecurityMode::SignAndEncrypt);
                assert_eq!(c.security.policy, SecurityPolicy::Basic256Sha256);
                assert!(!c.auto_accept_untrusted);
                assert!(matches!(c.user_auth, UserAuth::UserPass { .. }));
                assert_eq!(c.publishing_interval_ms(), 100);
            }
            _ => panic!("expected opcua connection"),
        }
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{
            "connections": [],
            "output_base_dir": ".",
            "some_future_field": 42
        }"#;
        assert!(LoggerConfig::from_json_str(json).is_ok());
    }

    #[test]
    fn test_threshold_ordering_enforced() {
        let mut tag = ModbusTagConfig::new("t", 0, RegisterType::HoldingRegister, DataType::Int16);
        tag.analysis.low = Some(10.0);
        tag.analysis.high = Some(5.0);

        let config = ModbusConnectionConfig {
            connection_name: "c".into(),
            enabled: true,
            host: "h".into(),
            port: 502,
            unit_id: 1,
            scan_interval_ms: 1000,
            connect_timeout_ms: 5000,
            response_timeout_ms: 2000,
            tags: vec![tag],
        };
        assert!(matches!(
            config.validate(),
            Err(LoggerError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_coil_locked_to_bool() {
        let mut tag = ModbusTagConfig::new("run", 12, RegisterType::Coil, DataType::Float32);
        assert_eq!(tag.data_type(), DataType::Bool);

        tag.set_data_type(DataType::Int32);
        assert_eq!(tag.data_type(), DataType::Bool);
        assert_eq!(tag.word_count(), 1);

        // Deserialized bit tags are locked too
        let json = r#"{
            "tag_name": "run",
            "address": 12,
            "register_type": "DiscreteInput",
            "data_type": "UInt32"
        }"#;
        let tag: ModbusTagConfig = serde_json::from_str(json).unwrap();
        assert_eq!(tag.data_type(), DataType::Bool);
    }

    #[test]
    fn test_unit_id_range() {
        let config = ModbusConnectionConfig {
            connection_name: "c".into(),
            enabled: true,
            host: "h".into(),
            port: 502,
            unit_id: 0,
            scan_interval_ms: 1000,
            connect_timeout_ms: 5000,
            response_timeout_ms: 2000,
            tags: vec![],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_baseline_minimum() {
        let mut tag = ModbusTagConfig::new("t", 0, RegisterType::HoldingRegister, DataType::Int16);
        tag.analysis.baseline_sample_size = 4;

        assert!(tag.validate("c").is_err());
        tag.analysis.baseline_sample_size = 5;
        assert!(tag.validate("c").is_ok());
    }

    #[test]
    fn test_duplicate_connection_names_rejected() {
        let json = r#"{
            "connections": [
                { "type": "modbus", "connection_name": "a", "host": "h1" },
                { "type": "modbus", "connection_name": "a", "host": "h2" }
            ]
        }"#;
        assert!(LoggerConfig::from_json_str(json).is_err());
    }

    #[test]
    fn test_sampling_interval_minimum() {
        let json = r#"{
            "connections": [
                {
                    "type": "opcua",
                    "connection_name": "u",
                    "endpoint_url": "opc.tcp://h:4840",
                    "tags": [
                        { "tag_name": "t", "node_id": "ns=2;s=T", "sampling_interval_ms": 20 }
                    ]
                }
            ]
        }"#;
        assert!(LoggerConfig::from_json_str(json).is_err());
    }
}
