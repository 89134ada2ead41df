//! Outbound event stream.
//!
//! Connectors, the analyzer routing and the sinks publish onto a single
//! in-process bus; UI consumers subscribe. Publishing never blocks: a
//! subscriber that cannot keep up loses the newest events, counted.

use crate::types::{AlarmState, AnnotatedSample, ConnectionState, TagValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

/// Queue depth handed to each subscriber.
const SUBSCRIBER_CAPACITY: usize = 256;

/// Events published to UI and other consumers.
#[derive(Debug, Clone)]
pub enum LoggerEvent {
    /// A connector changed state
    ConnectionStateChanged {
        connection_id: String,
        state: ConnectionState,
    },
    /// A batch of annotated samples passed through the pipeline
    SamplesReceived {
        connection_id: String,
        samples: Vec<AnnotatedSample>,
    },
    /// A tag entered a non-normal alarm state
    AlarmRaised {
        connection_id: String,
        tag_name: String,
        state: AlarmState,
        value: TagValue,
        message: String,
    },
    /// A non-fatal problem somewhere in the pipeline
    Warning {
        source: String,
        message: String,
    },
}

struct BusInner {
    subscribers: Mutex<Vec<mpsc::Sender<LoggerEvent>>>,
    dropped: AtomicU64,
}

/// In-process event bus.
///
/// Cheap to clone; all clones share the subscriber registry. Publishing is
/// synchronous so it can be called from blocking contexts (the OPC-UA
/// notification thread) as well as async tasks.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(Vec::new()),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> mpsc::Receiver<LoggerEvent> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        self.inner.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Publishes an event to every live subscriber.
    ///
    /// A full subscriber queue drops this event for that subscriber; closed
    /// subscribers are pruned.
    pub fn publish(&self, event: LoggerEvent) {
        let mut subscribers = self.inner.subscribers.lock().unwrap();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let total = self.inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(total, "slow event subscriber, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    /// Publishes a Warning event and logs it.
    pub fn warn(&self, source: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(source, "{}", message);
        self.publish(LoggerEvent::Warning {
            source: source.to_string(),
            message,
        });
    }

    /// Total events dropped because of slow subscribers.
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
