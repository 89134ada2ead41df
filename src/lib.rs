//! # datalogger
//!
//! Industrial data logger for MODBUS TCP and OPC-UA devices.
//!
//! One process samples process variables from several devices concurrently,
//! annotates every sample with alarm and outlier classification, and appends
//! the result to daily CSV files.
//!
//! ## Architecture
//!
//! The pipeline follows a layered architecture:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 ACQUISITION & ANALYSIS PIPELINE                  │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Layer 4: Orchestration                                           │
//! │   • LoggerPipeline, EventBus                                     │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Layer 3: Acquisition                                             │
//! │   • ModbusConnector, OpcUaConnector                              │
//! │   • TagAnalyzer, SampleSink                                      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Layer 2: Protocol                                                │
//! │   • ModbusTcpClient, register decoder                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Layer 1: Transport                                               │
//! │   • TcpClient, Backoff                                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use datalogger::{LoggerConfig, LoggerPipeline, LoggerEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LoggerConfig::load("settings.json")?;
//!
//!     let mut pipeline = LoggerPipeline::new(config);
//!     let mut events = pipeline.events().subscribe();
//!     pipeline.start().await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let LoggerEvent::AlarmRaised { message, .. } = event {
//!             println!("{}", message);
//!         }
//!     }
//!
//!     pipeline.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `modbus-tcp`: MODBUS TCP acquisition (default)
//! - `opcua-client`: OPC-UA acquisition via the `opcua` crate (default)
//!
//! ## Data flow
//!
//! Connector -> raw [`Sample`] -> [`analysis::TagAnalyzer`] -> annotated
//! sample -> [`sink::SampleSink`] and the [`events::EventBus`]. Control flows
//! the other way: the [`pipeline::LoggerPipeline`] issues connect, start,
//! stop and disconnect.

pub mod analysis;
pub mod config;
pub mod connector;
pub mod decode;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod protocol;
pub mod sink;
pub mod transport;
pub mod types;

// Re-exports
pub use config::{AnalysisConfig, ConnectionConfig, LoggerConfig};
pub use error::{LoggerError, Result};
pub use events::{EventBus, LoggerEvent};
pub use pipeline::LoggerPipeline;
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
