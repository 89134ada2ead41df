//! Protocol implementations.
//!
//! - [`ModbusTcpClient`]: MODBUS TCP master, read-only

mod modbus;

pub use modbus::*;
