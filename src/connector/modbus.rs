//! MODBUS polling connector.
//!
//! Groups active tags into covering read ranges, polls them on a
//! drift-resistant cadence and emits one sample batch per scan cycle. A
//! failed range marks only its own tags bad; a transport failure tears the
//! session down and reconnects with backoff.

use crate::config::{ModbusConnectionConfig, ModbusTagConfig};
use crate::connector::{Connector, SampleBatch, StateCell};
use crate::decode::decode;
use crate::events::EventBus;
use crate::protocol::{ModbusPayload, ModbusReadRequest, ModbusTcpClient};
use crate::transport::{Backoff, TcpConfig};
use crate::types::{ConnectionState, ConnectionStats, Sample, TagValue};
use crate::{LoggerError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Consecutive response timeouts tolerated before the session is torn down.
const MAX_CONSECUTIVE_TIMEOUTS: u32 = 2;

/// How long `disconnect` waits for the scan task to observe cancellation.
const DISCONNECT_GRACE: Duration = Duration::from_secs(2);

// =============================================================================
// Read Range Planning
// =============================================================================

/// A covering read request over consecutive tag addresses.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReadRange {
    register_type: crate::types::RegisterType,
    start: u16,
    quantity: u16,
    /// Indices into the active-tag list, in configuration order
    tag_indices: Vec<usize>,
}

/// Groups active tags into minimal covering ranges.
///
/// Tags are grouped by register type and merged while their addresses stay
/// consecutive (a 32-bit tag extends its span by one register) and the range
/// fits one read request.
pub(crate) fn plan_ranges(tags: &[&ModbusTagConfig]) -> Vec<ReadRange> {
    use crate::types::RegisterType;

    let mut ranges = Vec::new();

    for register_type in [
        RegisterType::HoldingRegister,
        RegisterType::InputRegister,
        RegisterType::Coil,
        RegisterType::DiscreteInput,
    ] {
        let mut group: Vec<usize> = tags
            .iter()
            .enumerate()
            .filter(|(_, t)| t.register_type == register_type)
            .map(|(i, _)| i)
            .collect();
        group.sort_by_key(|&i| tags[i].address);

        let limit = u32::from(register_type.max_read_quantity());
        let mut current: Option<(u16, u16, Vec<usize>)> = None; // (start, end, indices)

        for idx in group {
            let tag = tags[idx];
            let (start, end) = (tag.address, tag.end_address());

            match current.as_mut() {
                Some((range_start, range_end, indices))
                    if u32::from(start) <= u32::from(*range_end) + 1
                        && u32::from(end.max(*range_end)) - u32::from(*range_start) + 1 <= limit =>
                {
                    *range_end = (*range_end).max(end);
                    indices.push(idx);
                }
                _ => {
                    if let Some((s, e, indices)) = current.take() {
                        ranges.push(ReadRange {
                            register_type,
                            start: s,
                            quantity: e - s + 1,
                            tag_indices: indices,
                        });
                    }
                    current = Some((start, end, vec![idx]));
                }
            }
        }

        if let Some((s, e, indices)) = current.take() {
            ranges.push(ReadRange {
                register_type,
                start: s,
                quantity: e - s + 1,
                tag_indices: indices,
            });
        }
    }

    ranges
}

// =============================================================================
// Connector
// =============================================================================

/// MODBUS TCP acquisition connector.
pub struct ModbusConnector {
    config: Arc<ModbusConnectionConfig>,
    client: Arc<ModbusTcpClient>,
    batch_tx: mpsc::Sender<SampleBatch>,
    bus: EventBus,
    state: Arc<StateCell>,
    cancel: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ModbusConnector {
    /// Creates a connector for the given connection.
    pub fn new(
        config: ModbusConnectionConfig,
        batch_tx: mpsc::Sender<SampleBatch>,
        bus: EventBus,
    ) -> Self {
        let tcp_config = TcpConfig {
            host: config.host.clone(),
            port: config.port,
            connect_timeout: Duration::from_millis(u64::from(config.connect_timeout_ms)),
            read_timeout: Duration::from_millis(u64::from(config.response_timeout_ms)),
            write_timeout: Duration::from_millis(u64::from(config.response_timeout_ms)),
            ..Default::default()
        };
        let client = Arc::new(ModbusTcpClient::new(tcp_config, config.unit_id));
        let state = Arc::new(StateCell::new(&config.connection_name, bus.clone()));

        Self {
            config: Arc::new(config),
            client,
            batch_tx,
            bus,
            state,
            cancel: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Returns a snapshot of the transfer statistics.
    pub async fn stats(&self) -> ConnectionStats {
        self.client.stats().await
    }

    /// Verifies the device answers by reading the first active tag.
    ///
    /// A protocol exception still proves the device is reachable.
    async fn ping(&self) -> Result<()> {
        let Some(tag) = self.config.tags.iter().find(|t| t.is_active) else {
            return Ok(());
        };
        match self
            .client
            .read(ModbusReadRequest {
                register_type: tag.register_type,
                address: tag.address,
                quantity: tag.word_count(),
            })
            .await
        {
            Ok(_) | Err(LoggerError::ModbusException { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Connector for ModbusConnector {
    fn connection_id(&self) -> &str {
        &self.config.connection_name
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn connect(&self) -> Result<()> {
        self.state.set(ConnectionState::Connecting);

        if let Err(e) = self.client.connect().await {
            self.state.set(ConnectionState::Disconnected);
            return Err(e);
        }
        if let Err(e) = self.ping().await {
            let _ = self.client.disconnect().await;
            self.state.set(ConnectionState::Disconnected);
            return Err(e);
        }

        self.state.set(ConnectionState::Connected);
        info!(connection = %self.config.connection_name, "MODBUS connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(cancel) = self.cancel.lock().await.take() {
            let _ = cancel.send(true);
        }
        if let Some(mut task) = self.task.lock().await.take() {
            if timeout(DISCONNECT_GRACE, &mut task).await.is_err() {
                warn!(
                    connection = %self.config.connection_name,
                    "scan task did not stop in time, closing socket anyway"
                );
                task.abort();
            }
        }
        self.client.disconnect().await?;
        self.state.set(ConnectionState::Disconnected);
        Ok(())
    }

    async fn start_monitoring(&self) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(());
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        *self.cancel.lock().await = Some(cancel_tx);

        let handle = tokio::spawn(run_scan_loop(
            self.config.clone(),
            self.client.clone(),
            self.batch_tx.clone(),
            self.bus.clone(),
            self.state.clone(),
            cancel_rx,
        ));
        *task = Some(handle);
        Ok(())
    }

    async fn stop_monitoring(&self) {
        if let Some(cancel) = self.cancel.lock().await.take() {
            let _ = cancel.send(true);
        }
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
    }
}

// =============================================================================
// Scan Loop
// =============================================================================

enum CycleOutcome {
    Completed,
    TransportFailure,
}

async fn run_scan_loop(
    config: Arc<ModbusConnectionConfig>,
    client: Arc<ModbusTcpClient>,
    batch_tx: mpsc::Sender<SampleBatch>,
    bus: EventBus,
    state: Arc<StateCell>,
    mut cancel: watch::Receiver<bool>,
) {
    let active_tags: Vec<&ModbusTagConfig> =
        config.tags.iter().filter(|t| t.is_active).collect();
    if active_tags.is_empty() {
        debug!(connection = %config.connection_name, "no active tags, scan loop idle");
        let _ = cancel.changed().await;
        return;
    }
    let ranges = plan_ranges(&active_tags);

    let period = Duration::from_millis(u64::from(config.scan_interval_ms));
    // Anchored to the previous tick, so cycles do not drift
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut consecutive_timeouts = 0u32;
    let mut backoff = Backoff::default();

    loop {
        tokio::select! {
            _ = cancel.changed() => break,
            _ = ticker.tick() => {}
        }
        if *cancel.borrow() {
            break;
        }

        if !client.is_connected() {
            state.set(ConnectionState::Reconnecting);
            let delay = backoff.next_delay();
            tokio::select! {
                _ = cancel.changed() => break,
                _ = sleep(delay) => {}
            }
            match client.connect().await {
                Ok(()) => {
                    backoff.reset();
                    consecutive_timeouts = 0;
                    state.set(ConnectionState::Connected);
                    info!(connection = %config.connection_name, "MODBUS reconnected");
                }
                Err(e) => {
                    bus.warn(
                        &config.connection_name,
                        format!("reconnect failed: {}", e),
                    );
                    continue;
                }
            }
        }

        let cycle_start = Instant::now();
        let (samples, outcome) = scan_cycle(
            &config,
            &active_tags,
            &ranges,
            &client,
            &mut consecutive_timeouts,
        )
        .await;

        if !samples.is_empty() {
            let batch = SampleBatch {
                connection_id: config.connection_name.clone(),
                samples,
            };
            tokio::select! {
                _ = cancel.changed() => break,
                sent = batch_tx.send(batch) => {
                    if sent.is_err() {
                        debug!(connection = %config.connection_name, "batch channel closed, stopping scans");
                        break;
                    }
                }
            }
        }

        if let CycleOutcome::TransportFailure = outcome {
            let _ = client.disconnect().await;
            state.set(ConnectionState::Reconnecting);
            bus.warn(
                &config.connection_name,
                "transport failure, scheduling reconnect",
            );
        }

        let elapsed = cycle_start.elapsed();
        if elapsed > period {
            warn!(
                connection = %config.connection_name,
                elapsed_ms = elapsed.as_millis() as u64,
                interval_ms = config.scan_interval_ms,
                "scan cycle overran the interval, skipping missed ticks"
            );
        }
    }
}

/// Executes one scan cycle. Returns the samples in tag configuration order.
async fn scan_cycle(
    config: &ModbusConnectionConfig,
    active_tags: &[&ModbusTagConfig],
    ranges: &[ReadRange],
    client: &ModbusTcpClient,
    consecutive_timeouts: &mut u32,
) -> (Vec<Sample>, CycleOutcome) {
    let connection_id = &config.connection_name;
    let mut slots: Vec<Option<Sample>> = vec![None; active_tags.len()];
    let mut outcome = CycleOutcome::Completed;

    for range in ranges {
        let result = client
            .read(ModbusReadRequest {
                register_type: range.register_type,
                address: range.start,
                quantity: range.quantity,
            })
            .await;

        match result {
            Ok(payload) => {
                *consecutive_timeouts = 0;
                for &idx in &range.tag_indices {
                    let tag = active_tags[idx];
                    slots[idx] = Some(sample_from_payload(connection_id, tag, range.start, &payload));
                }
            }
            Err(e @ LoggerError::ModbusException { name, .. }) => {
                *consecutive_timeouts = 0;
                debug!(connection = %connection_id, error = %e, "range read rejected");
                for &idx in &range.tag_indices {
                    slots[idx] = Some(Sample::bad(connection_id, &active_tags[idx].tag_name, name));
                }
            }
            Err(e @ LoggerError::ResponseTimeout { .. }) => {
                *consecutive_timeouts += 1;
                for &idx in &range.tag_indices {
                    slots[idx] = Some(Sample::bad(
                        connection_id,
                        &active_tags[idx].tag_name,
                        "ResponseTimeout",
                    ));
                }
                if *consecutive_timeouts >= MAX_CONSECUTIVE_TIMEOUTS {
                    debug!(connection = %connection_id, error = %e, "repeated timeouts");
                    outcome = CycleOutcome::TransportFailure;
                    break;
                }
            }
            Err(e) => {
                for &idx in &range.tag_indices {
                    slots[idx] = Some(Sample::bad(
                        connection_id,
                        &active_tags[idx].tag_name,
                        e.to_string(),
                    ));
                }
                outcome = CycleOutcome::TransportFailure;
                break;
            }
        }
    }

    // Tags whose range never ran in an aborted cycle
    let samples = slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.unwrap_or_else(|| {
                Sample::bad(connection_id, &active_tags[idx].tag_name, "NotConnected")
            })
        })
        .collect();

    (samples, outcome)
}

/// Slices one tag's data out of a range payload and decodes it.
fn sample_from_payload(
    connection_id: &str,
    tag: &ModbusTagConfig,
    range_start: u16,
    payload: &ModbusPayload,
) -> Sample {
    let offset = (tag.address - range_start) as usize;
    match payload {
        ModbusPayload::Bits(bits) => match bits.get(offset) {
            Some(&bit) => Sample::good(connection_id, &tag.tag_name, TagValue::Bool(bit)),
            None => Sample::bad(connection_id, &tag.tag_name, "BitOutOfRange"),
        },
        ModbusPayload::Registers(regs) => {
            let need = tag.word_count() as usize;
            match regs.get(offset..offset + need) {
                Some(slice) => match decode(slice, tag.data_type()) {
                    Ok(value) => Sample::good(connection_id, &tag.tag_name, value),
                    Err(e) => Sample::bad(connection_id, &tag.tag_name, e.to_string()),
                },
                None => Sample::bad(
                    connection_id,
                    &tag.tag_name,
                    LoggerError::InsufficientRegisters {
                        need,
                        got: regs.len().saturating_sub(offset),
                    }
                    .to_string(),
                ),
            }
        }
    }
}
