//! Pipeline orchestrator.
//!
//! Owns one connector, analyzer and sink per enabled connection. Sample
//! batches flow connector -> analyzer -> sink and are republished on the
//! event bus; control (connect, start, stop, shutdown) flows the other way.

use crate::analysis::TagAnalyzer;
use crate::config::{ConnectionConfig, LoggerConfig};
use crate::connector::{Connector, ModbusConnector, SampleBatch};
use crate::events::{EventBus, LoggerEvent};
use crate::sink::SampleSink;
use crate::types::{AlarmState, ConnectionState};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{info, warn};

/// Per-connection batch channel depth.
const BATCH_CHANNEL_CAPACITY: usize = 64;

/// How long shutdown waits for each connector and router to drain.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct ConnectionRuntime {
    enabled: bool,
    connector: Option<Arc<dyn Connector>>,
    router: Option<JoinHandle<()>>,
}

/// The acquisition and analysis pipeline.
pub struct LoggerPipeline {
    config: LoggerConfig,
    bus: EventBus,
    connections: HashMap<String, ConnectionRuntime>,
    shutdown_tx: watch::Sender<bool>,
    started: bool,
}

impl LoggerPipeline {
    /// Creates a pipeline from a validated configuration.
    pub fn new(config: LoggerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            bus: EventBus::new(),
            connections: HashMap::new(),
            shutdown_tx,
            started: false,
        }
    }

    /// The pipeline's event bus.
    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    /// Names of all configured connections, enabled or not.
    pub fn connection_ids(&self) -> Vec<String> {
        self.config
            .connections
            .iter()
            .map(|c| c.connection_name().to_string())
            .collect()
    }

    /// State of a connection; idle or disabled connections report
    /// `Disconnected`.
    pub fn connection_state(&self, connection_id: &str) -> Option<ConnectionState> {
        let runtime = self.connections.get(connection_id)?;
        Some(
            runtime
                .connector
                .as_ref()
                .map(|c| c.state())
                .unwrap_or(ConnectionState::Disconnected),
        )
    }

    /// Starts one acquisition task per enabled connection. Idempotent.
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        self.started = true;

        for connection in self.config.connections.clone() {
            let name = connection.connection_name().to_string();

            if !connection.enabled() {
                info!(connection = %name, "connection disabled, represented but idle");
                self.connections.insert(
                    name,
                    ConnectionRuntime {
                        enabled: false,
                        connector: None,
                        router: None,
                    },
                );
                continue;
            }

            let (batch_tx, batch_rx) = mpsc::channel::<SampleBatch>(BATCH_CHANNEL_CAPACITY);
            let mut analyzer = TagAnalyzer::new();

            let connector: Option<Arc<dyn Connector>> = match &connection {
                ConnectionConfig::Modbus(c) => {
                    for tag in &c.tags {
                        analyzer.register_tag(&tag.tag_name, &tag.analysis);
                    }
                    Some(Arc::new(ModbusConnector::new(
                        c.clone(),
                        batch_tx,
                        self.bus.clone(),
                    )))
                }
                ConnectionConfig::Opcua(c) => {
                    #[cfg(feature = "opcua-client")]
                    {
                        for tag in &c.tags {
                            analyzer.register_tag(&tag.tag_name, &tag.analysis);
                        }
                        Some(Arc::new(crate::connector::OpcUaConnector::new(
                            c.clone(),
                            batch_tx,
                            self.bus.clone(),
                        )))
                    }
                    #[cfg(not(feature = "opcua-client"))]
                    {
                        let _ = c;
                        self.bus
                            .warn(&name, "built without opcua-client, connection idle");
                        None
                    }
                }
            };

            let Some(connector) = connector else {
                self.connections.insert(
                    name,
                    ConnectionRuntime {
                        enabled: true,
                        connector: None,
                        router: None,
                    },
                );
                continue;
            };

            let sink = SampleSink::new(&self.config.output_base_dir, &name, self.bus.clone());
            let router = tokio::spawn(run_router(
                name.clone(),
                analyzer,
                batch_rx,
                sink,
                self.bus.clone(),
                self.shutdown_tx.subscribe(),
            ));

            if let Err(e) = connector.connect().await {
                // The acquisition task reconnects with backoff on its own
                self.bus
                    .warn(&name, format!("initial connect failed: {}", e));
            }
            if let Err(e) = connector.start_monitoring().await {
                self.bus
                    .warn(&name, format!("failed to start monitoring: {}", e));
            }

            self.connections.insert(
                name,
                ConnectionRuntime {
                    enabled: true,
                    connector: Some(connector),
                    router: Some(router),
                },
            );
        }

        info!(
            connections = self.connections.len(),
            "pipeline started"
        );
        Ok(())
    }

    /// Stops all connectors, drains the routers and flushes the sinks.
    pub async fn shutdown(&mut self) {
        for (name, runtime) in self.connections.iter_mut() {
            if let Some(connector) = runtime.connector.take() {
                let stopped = timeout(SHUTDOWN_GRACE, async {
                    connector.stop_monitoring().await;
                    let _ = connector.disconnect().await;
                })
                .await;
                if stopped.is_err() {
                    warn!(connection = %name, "connector did not stop within the grace period");
                }
            }
        }

        // Routers drain their queues and close the sinks
        let _ = self.shutdown_tx.send(true);
        for (name, runtime) in self.connections.iter_mut() {
            if let Some(router) = runtime.router.take() {
                if timeout(SHUTDOWN_GRACE, router).await.is_err() {
                    warn!(connection = %name, "router did not drain within the grace period");
                }
            }
        }

        self.started = false;
        info!("pipeline stopped");
    }
}

async fn run_router(
    connection_id: String,
    mut analyzer: TagAnalyzer,
    mut batch_rx: mpsc::Receiver<SampleBatch>,
    sink: SampleSink,
    bus: EventBus,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            batch = batch_rx.recv() => {
                match batch {
                    Some(batch) => route_batch(&connection_id, &mut analyzer, &sink, &bus, batch),
                    None => break,
                }
            }
            _ = shutdown.changed() => {
                // Drain what producers already handed over, then stop
                while let Ok(batch) = batch_rx.try_recv() {
                    route_batch(&connection_id, &mut analyzer, &sink, &bus, batch);
                }
                break;
            }
        }
    }
    sink.close().await;
}

fn route_batch(
    connection_id: &str,
    analyzer: &mut TagAnalyzer,
    sink: &SampleSink,
    bus: &EventBus,
    batch: SampleBatch,
) {
    let mut annotated_batch = Vec::with_capacity(batch.samples.len());

    for sample in batch.samples {
        let annotated = analyzer.observe(sample);

        if annotated.state_changed && annotated.alarm_state != AlarmState::Normal {
            bus.publish(LoggerEvent::AlarmRaised {
                connection_id: connection_id.to_string(),
                tag_name: annotated.sample.tag_name.clone(),
                state: annotated.alarm_state,
                value: annotated.sample.value.clone(),
                message: annotated.alarm_message.clone().unwrap_or_default(),
            });
        }

        sink.enqueue(annotated.clone());
        annotated_batch.push(annotated);
    }

    bus.publish(LoggerEvent::SamplesReceived {
        connection_id: connection_id.to_string(),
        samples: annotated_batch,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModbusConnectionConfig, ModbusTagConfig};
    use crate::types::{DataType, RegisterType};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// MODBUS server answering every register read with value == address.
    async fn fake_modbus_server() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                tokio::spawn(async move {
                    loop {
                        let mut request = [0u8; 12];
                        if socket.read_exact(&mut request).await.is_err() {
                            return;
                        }
                        let function_code = request[7];
                        let address = u16::from_be_bytes([request[8], request[9]]);
                        let quantity = u16::from_be_bytes([request[10], request[11]]);

                        let mut pdu = vec![function_code, (quantity * 2) as u8];
                        for i in 0..quantity {
                            pdu.extend_from_slice(&(address + i).to_be_bytes());
                        }

                        let mut response = Vec::new();
                        response.extend_from_slice(&request[0..2]);
                        response.extend_from_slice(&[0, 0]);
                        response.extend_from_slice(&((pdu.len() + 1) as u16).to_be_bytes());
                        response.push(request[6]);
                        response.extend_from_slice(&pdu);
                        if socket.write_all(&response).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });

        port
    }

    fn pipeline_config(port: u16, base_dir: &std::path::Path) -> LoggerConfig {
        let mut tag = ModbusTagConfig::new(
            "level",
            200,
            RegisterType::HoldingRegister,
            DataType::UInt16,
        );
        tag.analysis.alarming_enabled = true;
        tag.analysis.high = Some(100.0);

        LoggerConfig {
            connections: vec![
                ConnectionConfig::Modbus(ModbusConnectionConfig {
                    connection_name: "plant-a".into(),
                    enabled: true,
                    host: "127.0.0.1".into(),
                    port,
                    unit_id: 1,
                    scan_interval_ms: 20,
                    connect_timeout_ms: 1000,
                    response_timeout_ms: 1000,
                    tags: vec![tag],
                }),
                ConnectionConfig::Modbus(ModbusConnectionConfig {
                    connection_name: "plant-b".into(),
                    enabled: false,
                    host: "127.0.0.1".into(),
                    port,
                    unit_id: 1,
                    scan_interval_ms: 1000,
                    connect_timeout_ms: 1000,
                    response_timeout_ms: 1000,
                    tags: vec![],
                }),
            ],
            output_base_dir: base_dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_pipeline_end_to_end() {
        let port = fake_modbus_server().await;
        let dir = tempfile::tempdir().unwrap();

        let mut pipeline = LoggerPipeline::new(pipeline_config(port, dir.path()));
        let mut events = pipeline.events().subscribe();
        pipeline.start().await.unwrap();

        // Register 200 reads back 200, which trips the High band once
        let mut saw_samples = false;
        let mut saw_alarm = false;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while (!saw_samples || !saw_alarm) && tokio::time::Instant::now() < deadline {
            let Ok(Some(event)) =
                timeout(Duration::from_millis(500), events.recv()).await
            else {
                continue;
            };
            match event {
                LoggerEvent::SamplesReceived { connection_id, samples } => {
                    assert_eq!(connection_id, "plant-a");
                    assert_eq!(samples.len(), 1);
                    assert_eq!(samples[0].alarm_state, AlarmState::High);
                    saw_samples = true;
                }
                LoggerEvent::AlarmRaised { tag_name, state, .. } => {
                    assert_eq!(tag_name, "level");
                    assert_eq!(state, AlarmState::High);
                    saw_alarm = true;
                }
                _ => {}
            }
        }
        assert!(saw_samples && saw_alarm);

        assert_eq!(
            pipeline.connection_state("plant-a"),
            Some(ConnectionState::Connected)
        );
        assert_eq!(
            pipeline.connection_state("plant-b"),
            Some(ConnectionState::Disconnected)
        );

        pipeline.shutdown().await;

        // The sink flushed samples for today's UTC date
        let date = chrono::Utc::now().date_naive();
        let path = dir
            .path()
            .join("LoggedData/plant-a")
            .join(format!("{}.csv", date.format("%Y-%m-%d")));
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.lines().count() >= 2);
        assert!(content.contains("level,200,true,High,"));
    }

    #[tokio::test]
    async fn test_disabled_connections_represented() {
        let dir = tempfile::tempdir().unwrap();
        let mut pipeline = LoggerPipeline::new(pipeline_config(1, dir.path()));

        // Nothing started yet: states unknown
        assert_eq!(pipeline.connection_state("plant-b"), None);

        pipeline.start().await.unwrap();
        assert_eq!(
            pipeline.connection_state("plant-b"),
            Some(ConnectionState::Disconnected)
        );
        assert_eq!(pipeline.connection_ids().len(), 2);

        pipeline.shutdown().await;
    }
}
