//! Acquisition connectors.
//!
//! One connector per configured connection:
//! - [`ModbusConnector`]: polled MODBUS TCP acquisition
//! - [`OpcUaConnector`]: subscription-driven OPC-UA acquisition (requires the
//!   `opcua-client` feature)
//!
//! Connectors produce [`SampleBatch`]es on an mpsc channel and publish
//! connection state changes on the event bus. Control flows the other way:
//! the pipeline calls connect/start/stop/disconnect.

mod modbus;

pub use modbus::*;

#[cfg(feature = "opcua-client")]
mod opcua;

#[cfg(feature = "opcua-client")]
pub use opcua::*;

use crate::events::{EventBus, LoggerEvent};
use crate::types::{ConnectionState, Sample};
use async_trait::async_trait;
use std::sync::Mutex;

/// A batch of raw samples from one completed scan cycle or publish cycle.
#[derive(Debug, Clone)]
pub struct SampleBatch {
    /// Producing connection
    pub connection_id: String,
    /// Samples in production order
    pub samples: Vec<Sample>,
}

/// Common contract of the acquisition connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The connection this connector serves.
    fn connection_id(&self) -> &str;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Opens the session to the device.
    async fn connect(&self) -> crate::Result<()>;

    /// Closes the session. Safe to call from any state.
    async fn disconnect(&self) -> crate::Result<()>;

    /// Begins acquisition. Idempotent.
    async fn start_monitoring(&self) -> crate::Result<()>;

    /// Ceases acquisition after the current cycle.
    async fn stop_monitoring(&self);
}

/// Connection state shared between a connector and its acquisition task.
///
/// Every observed change is published as a `ConnectionStateChanged` event.
pub(crate) struct StateCell {
    connection_id: String,
    state: Mutex<ConnectionState>,
    bus: EventBus,
}

impl StateCell {
    pub(crate) fn new(connection_id: &str, bus: EventBus) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            state: Mutex::new(ConnectionState::Disconnected),
            bus,
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.state.lock().unwrap()
    }

    pub(crate) fn set(&self, new_state: ConnectionState) {
        let mut state = self.state.lock().unwrap();
        if *state != new_state {
            *state = new_state;
            drop(state);
            self.bus.publish(LoggerEvent::ConnectionStateChanged {
                connection_id: self.connection_id.clone(),
                state: new_state,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_cell_publishes_changes() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        let cell = StateCell::new("c1", bus);

        assert_eq!(cell.get(), ConnectionState::Disconnected);

        cell.set(ConnectionState::Connecting);
        cell.set(ConnectionState::Connecting); // no duplicate event
        cell.set(ConnectionState::Connected);

        let mut states = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let LoggerEvent::ConnectionStateChanged { state, .. } = event {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![ConnectionState::Connecting, ConnectionState::Connected]
        );
    }
}
