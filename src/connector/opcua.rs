//! OPC-UA subscription connector.
//!
//! Bootstraps a certificate-backed session against the configured endpoint,
//! creates one subscription per connection with a monitored item per active
//! tag, and converts data-change notifications into sample batches. The
//! underlying `opcua` client is synchronous; all session calls run on
//! blocking tasks and notifications arrive on the client's own thread.

use crate::config::{OpcUaConnectionConfig, SecurityMode as ConfigSecurityMode, SecurityPolicy as ConfigSecurityPolicy, UserAuth};
use crate::connector::{Connector, SampleBatch, StateCell};
use crate::events::EventBus;
use crate::transport::Backoff;
use crate::types::{ConnectionState, Sample, TagValue};
use crate::{LoggerError, Result};
use async_trait::async_trait;
use chrono::Utc;
use opcua::client::prelude::*;
use opcua::sync::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Keep-alive target between publish responses, in milliseconds.
const KEEP_ALIVE_TARGET_MS: f64 = 5000.0;

/// Requested session timeout in milliseconds.
const SESSION_TIMEOUT_MS: u32 = 60_000;

/// Default PKI directory layout root.
const DEFAULT_PKI_DIR: &str = "./pki";

/// A node discovered under the server's Objects folder.
#[derive(Debug, Clone)]
pub struct NodeReference {
    /// Node identifier in `ns=..;..` form
    pub node_id: String,
    /// Display name reported by the server
    pub display_name: String,
    /// Node class, e.g. `Variable` or `Object`
    pub node_class: String,
}

/// A live session plus the bits needed to stop it.
struct SessionHandle {
    session: Arc<RwLock<Session>>,
    stop_tx: Option<tokio::sync::oneshot::Sender<SessionCommand>>,
    subscription_id: Option<u32>,
}

/// OPC-UA acquisition connector.
pub struct OpcUaConnector {
    config: Arc<OpcUaConnectionConfig>,
    pki_dir: PathBuf,
    batch_tx: mpsc::Sender<SampleBatch>,
    bus: EventBus,
    state: Arc<StateCell>,
    slot: Arc<StdMutex<Option<SessionHandle>>>,
    monitoring: Arc<AtomicBool>,
    disc_tx: mpsc::UnboundedSender<()>,
    disc_rx: Mutex<Option<mpsc::UnboundedReceiver<()>>>,
    cancel: Mutex<Option<watch::Sender<bool>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl OpcUaConnector {
    /// Creates a connector for the given connection.
    pub fn new(
        config: OpcUaConnectionConfig,
        batch_tx: mpsc::Sender<SampleBatch>,
        bus: EventBus,
    ) -> Self {
        let state = Arc::new(StateCell::new(&config.connection_name, bus.clone()));
        let (disc_tx, disc_rx) = mpsc::unbounded_channel();

        Self {
            config: Arc::new(config),
            pki_dir: PathBuf::from(DEFAULT_PKI_DIR),
            batch_tx,
            bus,
            state,
            slot: Arc::new(StdMutex::new(None)),
            monitoring: Arc::new(AtomicBool::new(false)),
            disc_tx,
            disc_rx: Mutex::new(Some(disc_rx)),
            cancel: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Overrides the PKI directory root.
    pub fn with_pki_dir(mut self, pki_dir: impl Into<PathBuf>) -> Self {
        self.pki_dir = pki_dir.into();
        self
    }

    /// Browses the hierarchical references under the Objects folder.
    pub async fn browse_root(&self) -> Result<Vec<NodeReference>> {
        let session = self
            .slot
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| h.session.clone())
            .ok_or_else(|| LoggerError::NotConnected {
                connection_id: self.config.connection_name.clone(),
            })?;

        tokio::task::spawn_blocking(move || browse_objects_folder(&session))
            .await
            .map_err(|e| LoggerError::Internal {
                reason: format!("browse task failed: {}", e),
            })?
    }

    fn live_session(&self) -> Option<Arc<RwLock<Session>>> {
        self.slot.lock().unwrap().as_ref().map(|h| h.session.clone())
    }

    fn take_session(&self) -> Option<SessionHandle> {
        self.slot.lock().unwrap().take()
    }
}

#[async_trait]
impl Connector for OpcUaConnector {
    fn connection_id(&self) -> &str {
        &self.config.connection_name
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn connect(&self) -> Result<()> {
        if self.live_session().is_some() {
            return Ok(());
        }

        self.state.set(ConnectionState::Connecting);

        let config = self.config.clone();
        let pki_dir = self.pki_dir.clone();
        let disc_tx = self.disc_tx.clone();
        let batch_tx = self.batch_tx.clone();
        let bus = self.bus.clone();
        let subscribe = self.monitoring.load(Ordering::SeqCst);

        let bootstrap = tokio::task::spawn_blocking(move || {
            bootstrap_session(&config, &pki_dir, disc_tx, subscribe, batch_tx, bus)
        })
        .await
        .map_err(|e| LoggerError::Internal {
            reason: format!("bootstrap task failed: {}", e),
        })?;

        match bootstrap {
            Ok(handle) => {
                *self.slot.lock().unwrap() = Some(handle);
                self.state.set(ConnectionState::Connected);
                info!(connection = %self.config.connection_name, "OPC-UA session established");

                // Watch for session drops and reconnect with backoff
                let mut task = self.task.lock().await;
                if !task.as_ref().is_some_and(|t| !t.is_finished()) {
                    let (cancel_tx, cancel_rx) = watch::channel(false);
                    *self.cancel.lock().await = Some(cancel_tx);
                    let disc_rx = self
                        .disc_rx
                        .lock()
                        .await
                        .take()
                        .ok_or_else(|| LoggerError::Internal {
                            reason: "disconnect channel already taken".into(),
                        })?;
                    *task = Some(tokio::spawn(run_reconnect_watchdog(
                        self.config.clone(),
                        self.pki_dir.clone(),
                        self.batch_tx.clone(),
                        self.bus.clone(),
                        self.state.clone(),
                        self.slot.clone(),
                        self.monitoring.clone(),
                        self.disc_tx.clone(),
                        disc_rx,
                        cancel_rx,
                    )));
                }
                Ok(())
            }
            Err(e) => {
                self.state.set(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn disconnect(&self) -> Result<()> {
        if let Some(cancel) = self.cancel.lock().await.take() {
            let _ = cancel.send(true);
        }
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
        if let Some(mut handle) = self.take_session() {
            if let Some(stop_tx) = handle.stop_tx.take() {
                let _ = stop_tx.send(SessionCommand::Stop);
            }
        }
        self.state.set(ConnectionState::Disconnected);
        Ok(())
    }

    async fn start_monitoring(&self) -> Result<()> {
        if self.monitoring.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Subscription rides along at the next (re)connect when the session
        // is not up yet
        let Some(session) = self.live_session() else {
            return Ok(());
        };
        let already_subscribed = self
            .slot
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|h| h.subscription_id.is_some());
        if already_subscribed {
            return Ok(());
        }

        let config = self.config.clone();
        let batch_tx = self.batch_tx.clone();
        let bus = self.bus.clone();
        let subscription_id = tokio::task::spawn_blocking(move || {
            create_tag_subscription(&session, &config, batch_tx, bus)
        })
        .await
        .map_err(|e| LoggerError::Internal {
            reason: format!("subscription task failed: {}", e),
        })??;

        if let Some(handle) = self.slot.lock().unwrap().as_mut() {
            handle.subscription_id = Some(subscription_id);
        }
        Ok(())
    }

    async fn stop_monitoring(&self) {
        if !self.monitoring.swap(false, Ordering::SeqCst) {
            return;
        }

        let (session, subscription_id) = {
            let mut slot = self.slot.lock().unwrap();
            match slot.as_mut() {
                Some(handle) => (handle.session.clone(), handle.subscription_id.take()),
                None => return,
            }
        };

        if let Some(subscription_id) = subscription_id {
            let connection = self.config.connection_name.clone();
            let result = tokio::task::spawn_blocking(move || {
                let s = session.read();
                s.delete_subscription(subscription_id)
            })
            .await;
            if let Ok(Err(status)) = result {
                warn!(connection = %connection, %status, "failed to delete subscription");
            }
        }
    }
}

// =============================================================================
// Session Bootstrap
// =============================================================================

/// Builds the client, discovers and matches an endpoint, activates the
/// session and optionally creates the tag subscription.
///
/// Runs on a blocking task.
fn bootstrap_session(
    config: &OpcUaConnectionConfig,
    pki_dir: &std::path::Path,
    disc_tx: mpsc::UnboundedSender<()>,
    subscribe: bool,
    batch_tx: mpsc::Sender<SampleBatch>,
    bus: EventBus,
) -> Result<SessionHandle> {
    if config.auto_accept_untrusted {
        bus.warn(
            &config.connection_name,
            "auto_accept_untrusted is enabled; server certificates are not validated",
        );
    }

    let mut client = ClientBuilder::new()
        .application_name("Data Logger")
        .application_uri("urn:datalogger")
        .product_uri("urn:datalogger")
        .pki_dir(pki_dir.to_path_buf())
        .create_sample_keypair(true)
        .trust_server_certs(config.auto_accept_untrusted)
        .session_retry_limit(0)
        .session_timeout(SESSION_TIMEOUT_MS)
        .client()
        .ok_or_else(|| LoggerError::OpcUa {
            reason: "invalid client configuration".into(),
        })?;

    let endpoints = client
        .get_server_endpoints_from_url(config.endpoint_url.as_str())
        .map_err(|status| LoggerError::OpcUa {
            reason: format!("endpoint discovery at {} failed: {}", config.endpoint_url, status),
        })?;

    let mode = message_security_mode(config.security.mode);
    let policy_uri = security_policy_uri(config.security.policy);
    let endpoint = endpoints
        .iter()
        .find(|e| e.security_mode == mode && e.security_policy_uri.as_ref() == policy_uri)
        .cloned()
        .ok_or_else(|| LoggerError::NoMatchingEndpoint {
            endpoint_url: config.endpoint_url.clone(),
            mode: format!("{:?}", config.security.mode),
            policy: format!("{:?}", config.security.policy),
        })?;

    let identity_token = match &config.user_auth {
        UserAuth::Anonymous => IdentityToken::Anonymous,
        UserAuth::UserPass { username, password } => {
            IdentityToken::UserName(username.clone(), password.clone())
        }
    };

    let session = client
        .connect_to_endpoint(endpoint, identity_token)
        .map_err(|status| LoggerError::OpcUa {
            reason: format!("session activation failed: {}", status),
        })?;

    {
        let mut s = session.write();
        let tx = disc_tx.clone();
        s.set_connection_status_callback(ConnectionStatusCallback::new(move |connected| {
            if !connected {
                let _ = tx.send(());
            }
        }));
        let tx = disc_tx;
        s.set_session_closed_callback(SessionClosedCallback::new(move |_status| {
            let _ = tx.send(());
        }));
    }

    let subscription_id = if subscribe {
        Some(create_tag_subscription(&session, config, batch_tx, bus)?)
    } else {
        None
    };

    let stop_tx = Session::run_async(session.clone());

    Ok(SessionHandle {
        session,
        stop_tx: Some(stop_tx),
        subscription_id,
    })
}

/// Creates the connection's subscription and one monitored item per active
/// tag. Runs on a blocking task.
fn create_tag_subscription(
    session: &Arc<RwLock<Session>>,
    config: &OpcUaConnectionConfig,
    batch_tx: mpsc::Sender<SampleBatch>,
    bus: EventBus,
) -> Result<u32> {
    let active_tags: Vec<_> = config.tags.iter().filter(|t| t.is_active).collect();
    if active_tags.is_empty() {
        return Err(LoggerError::OpcUa {
            reason: format!("{}: no active tags to monitor", config.connection_name),
        });
    }

    let publishing_interval = f64::from(config.publishing_interval_ms());
    let (keep_alive_count, lifetime_count) = subscription_counts(publishing_interval);

    let tag_by_node: Arc<HashMap<String, String>> = Arc::new(
        active_tags
            .iter()
            .map(|t| (t.node_id.clone(), t.tag_name.clone()))
            .collect(),
    );
    let connection_id = config.connection_name.clone();

    let callback = DataChangeCallback::new(move |changed_items| {
        let mut samples = Vec::new();
        for item in changed_items.iter() {
            let node_id = item.item_to_monitor().node_id.to_string();
            let Some(tag_name) = tag_by_node.get(&node_id) else {
                continue;
            };
            samples.push(data_value_to_sample(
                &connection_id,
                tag_name,
                item.last_value(),
            ));
        }
        if samples.is_empty() {
            return;
        }
        let batch = SampleBatch {
            connection_id: connection_id.clone(),
            samples,
        };
        if batch_tx.try_send(batch).is_err() {
            warn!(connection = %connection_id, "sample channel full, dropping publish batch");
        }
    });

    let s = session.read();
    let subscription_id = s
        .create_subscription(
            publishing_interval,
            lifetime_count,
            keep_alive_count,
            0,
            0,
            true,
            callback,
        )
        .map_err(|status| LoggerError::OpcUa {
            reason: format!("create subscription failed: {}", status),
        })?;

    let mut items_to_create = Vec::with_capacity(active_tags.len());
    for (i, tag) in active_tags.iter().enumerate() {
        let node_id = NodeId::from_str(&tag.node_id).map_err(|_| LoggerError::OpcUa {
            reason: format!("invalid node_id for {}: {}", tag.tag_name, tag.node_id),
        })?;
        items_to_create.push(MonitoredItemCreateRequest::new(
            node_id.into(),
            MonitoringMode::Reporting,
            MonitoringParameters {
                client_handle: (i + 1) as u32,
                sampling_interval: f64::from(tag.sampling_interval_ms),
                filter: ExtensionObject::null(),
                queue_size: 1,
                discard_oldest: true,
            },
        ));
    }

    let results = s
        .create_monitored_items(subscription_id, TimestampsToReturn::Both, &items_to_create)
        .map_err(|status| LoggerError::OpcUa {
            reason: format!("create monitored items failed: {}", status),
        })?;

    for (result, tag) in results.iter().zip(active_tags.iter()) {
        if !result.status_code.is_good() {
            bus.warn(
                &config.connection_name,
                format!(
                    "monitored item for {} rejected: {}",
                    tag.tag_name, result.status_code
                ),
            );
        }
    }

    debug!(
        connection = %config.connection_name,
        subscription_id,
        items = items_to_create.len(),
        publishing_interval,
        "subscription created"
    );
    Ok(subscription_id)
}

/// Keep-alive and lifetime counts for a publishing interval, targeting a
/// 5 s keep-alive cadence.
fn subscription_counts(publishing_interval_ms: f64) -> (u32, u32) {
    let keep_alive = (KEEP_ALIVE_TARGET_MS / publishing_interval_ms).ceil().max(1.0) as u32;
    (keep_alive, keep_alive * 3)
}

fn browse_objects_folder(session: &Arc<RwLock<Session>>) -> Result<Vec<NodeReference>> {
    let browse_description = BrowseDescription {
        node_id: ObjectId::ObjectsFolder.into(),
        browse_direction: BrowseDirection::Forward,
        reference_type_id: ReferenceTypeId::HierarchicalReferences.into(),
        include_subtypes: true,
        node_class_mask: 0,
        result_mask: BrowseResultMask::All as u32,
    };

    let s = session.read();
    let results = s
        .browse(&[browse_description])
        .map_err(|status| LoggerError::OpcUa {
            reason: format!("browse failed: {}", status),
        })?;

    let mut nodes = Vec::new();
    if let Some(results) = results {
        for result in results {
            if let Some(references) = result.references {
                for reference in references {
                    nodes.push(NodeReference {
                        node_id: reference.node_id.node_id.to_string(),
                        display_name: reference.display_name.to_string(),
                        node_class: format!("{:?}", reference.node_class),
                    });
                }
            }
        }
    }
    Ok(nodes)
}

// =============================================================================
// Reconnect Watchdog
// =============================================================================

#[allow(clippy::too_many_arguments)]
async fn run_reconnect_watchdog(
    config: Arc<OpcUaConnectionConfig>,
    pki_dir: PathBuf,
    batch_tx: mpsc::Sender<SampleBatch>,
    bus: EventBus,
    state: Arc<StateCell>,
    slot: Arc<StdMutex<Option<SessionHandle>>>,
    monitoring: Arc<AtomicBool>,
    disc_tx: mpsc::UnboundedSender<()>,
    mut disc_rx: mpsc::UnboundedReceiver<()>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::default();

    loop {
        tokio::select! {
            _ = cancel.changed() => return,
            dropped = disc_rx.recv() => {
                if dropped.is_none() {
                    return;
                }
            }
        }
        if *cancel.borrow() {
            return;
        }

        // Session reported itself gone; drop our handle and rebuild
        if let Some(mut handle) = slot.lock().unwrap().take() {
            if let Some(stop_tx) = handle.stop_tx.take() {
                let _ = stop_tx.send(SessionCommand::Stop);
            }
        }
        state.set(ConnectionState::Reconnecting);
        bus.warn(&config.connection_name, "session lost, reconnecting");

        loop {
            let delay = backoff.next_delay();
            tokio::select! {
                _ = cancel.changed() => return,
                _ = sleep(delay) => {}
            }

            let cfg = config.clone();
            let pki = pki_dir.clone();
            let tx = disc_tx.clone();
            let batches = batch_tx.clone();
            let events = bus.clone();
            let subscribe = monitoring.load(Ordering::SeqCst);

            let bootstrap = tokio::task::spawn_blocking(move || {
                bootstrap_session(&cfg, &pki, tx, subscribe, batches, events)
            })
            .await;

            match bootstrap {
                Ok(Ok(handle)) => {
                    *slot.lock().unwrap() = Some(handle);
                    backoff.reset();
                    state.set(ConnectionState::Connected);
                    info!(connection = %config.connection_name, "OPC-UA session re-established");
                    // Drain stale drop notifications from the dead session
                    while disc_rx.try_recv().is_ok() {}
                    break;
                }
                Ok(Err(e)) => {
                    bus.warn(
                        &config.connection_name,
                        format!("reconnect failed: {}", e),
                    );
                }
                Err(e) => {
                    bus.warn(
                        &config.connection_name,
                        format!("reconnect task failed: {}", e),
                    );
                }
            }
        }
    }
}

// =============================================================================
// Value Mapping
// =============================================================================

/// Maps a data-change value to a sample, applying the quality rules.
fn data_value_to_sample(connection_id: &str, tag_name: &str, data_value: &DataValue) -> Sample {
    let status = data_value.status.unwrap_or(StatusCode::Good);
    let timestamp = data_value
        .source_timestamp
        .as_ref()
        .map(|t| t.as_chrono())
        .unwrap_or_else(Utc::now);

    if !status.is_good() {
        return Sample {
            connection_id: connection_id.to_string(),
            tag_name: tag_name.to_string(),
            timestamp,
            value: TagValue::Null,
            is_good_quality: false,
            error_message: Some(status.to_string()),
        };
    }

    let value = data_value
        .value
        .as_ref()
        .map(variant_to_tag_value)
        .unwrap_or(TagValue::Null);

    // A good status with no value is still unusable
    if value.is_null() {
        return Sample {
            connection_id: connection_id.to_string(),
            tag_name: tag_name.to_string(),
            timestamp,
            value: TagValue::Null,
            is_good_quality: false,
            error_message: Some("NullValue".into()),
        };
    }

    Sample {
        connection_id: connection_id.to_string(),
        tag_name: tag_name.to_string(),
        timestamp,
        value,
        is_good_quality: true,
        error_message: None,
    }
}

/// Maps an OPC-UA variant onto the logger's value union.
fn variant_to_tag_value(variant: &Variant) -> TagValue {
    match variant {
        Variant::Boolean(v) => TagValue::Bool(*v),
        Variant::SByte(v) => TagValue::I16(i16::from(*v)),
        Variant::Byte(v) => TagValue::U16(u16::from(*v)),
        Variant::Int16(v) => TagValue::I16(*v),
        Variant::UInt16(v) => TagValue::U16(*v),
        Variant::Int32(v) => TagValue::I32(*v),
        Variant::UInt32(v) => TagValue::U32(*v),
        Variant::Int64(v) => TagValue::F64(*v as f64),
        Variant::UInt64(v) => TagValue::F64(*v as f64),
        Variant::Float(v) => TagValue::F32(*v),
        Variant::Double(v) => TagValue::F64(*v),
        Variant::String(s) => TagValue::Text(s.to_string()),
        _ => TagValue::Null,
    }
}

fn message_security_mode(mode: ConfigSecurityMode) -> MessageSecurityMode {
    match mode {
        ConfigSecurityMode::None => MessageSecurityMode::None,
        ConfigSecurityMode::Sign => MessageSecurityMode::Sign,
        ConfigSecurityMode::SignAndEncrypt => MessageSecurityMode::SignAndEncrypt,
    }
}

fn security_policy_uri(policy: ConfigSecurityPolicy) -> &'static str {
    match policy {
        ConfigSecurityPolicy::None => SecurityPolicy::None.to_uri(),
        ConfigSecurityPolicy::Basic256Sha256 => SecurityPolicy::Basic256Sha256.to_uri(),
        ConfigSecurityPolicy::Aes128Sha256RsaOaep => SecurityPolicy::Aes128Sha256RsaOaep.to_uri(),
        ConfigSecurityPolicy::Aes256Sha256RsaPss => SecurityPolicy::Aes256Sha256RsaPss.to_uri(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_mapping() {
        assert_eq!(variant_to_tag_value(&Variant::Boolean(true)), TagValue::Bool(true));
        assert_eq!(variant_to_tag_value(&Variant::Int16(-3)), TagValue::I16(-3));
        assert_eq!(variant_to_tag_value(&Variant::UInt32(9)), TagValue::U32(9));
        assert_eq!(variant_to_tag_value(&Variant::Double(1.5)), TagValue::F64(1.5));
        assert_eq!(variant_to_tag_value(&Variant::Byte(255)), TagValue::U16(255));
    }

    #[test]
    fn test_bad_status_maps_to_bad_quality() {
        let data_value = DataValue {
            value: Some(Variant::Double(12.0)),
            status: Some(StatusCode::BadCommunicationError),
            ..Default::default()
        };
        let sample = data_value_to_sample("c", "t", &data_value);
        assert!(!sample.is_good_quality);
        assert!(sample
            .error_message
            .as_deref()
            .unwrap()
            .contains("BadCommunicationError"));
    }

    #[test]
    fn test_null_with_good_status_is_bad_quality() {
        let data_value = DataValue {
            value: None,
            status: Some(StatusCode::Good),
            ..Default::default()
        };
        let sample = data_value_to_sample("c", "t", &data_value);
        assert!(!sample.is_good_quality);
        assert_eq!(sample.error_message.as_deref(), Some("NullValue"));
    }

    #[test]
    fn test_good_value_passes_through() {
        let data_value = DataValue {
            value: Some(Variant::Float(2.5)),
            status: None,
            ..Default::default()
        };
        let sample = data_value_to_sample("c", "t", &data_value);
        assert!(sample.is_good_quality);
        assert_eq!(sample.value, TagValue::F32(2.5));
        assert!(sample.error_message.is_none());
    }

    #[test]
    fn test_subscription_counts_target_keep_alive() {
        // 100 ms publishing -> keep-alive every 50 cycles = 5 s
        assert_eq!(subscription_counts(100.0), (50, 150));
        // Slow publishing still keeps at least one cycle
        assert_eq!(subscription_counts(10_000.0), (1, 3));
    }

    #[test]
    fn test_security_policy_uris_distinct() {
        let uris = [
            security_policy_uri(ConfigSecurityPolicy::None),
            security_policy_uri(ConfigSecurityPolicy::Basic256Sha256),
            security_policy_uri(ConfigSecurityPolicy::Aes128Sha256RsaOaep),
            security_policy_uri(ConfigSecurityPolicy::Aes256Sha256RsaPss),
        ];
        let unique: std::collections::HashSet<_> = uris.iter().collect();
        assert_eq!(unique.len(), uris.len());
    }
}
