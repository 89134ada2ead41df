//! Sample sink.
//!
//! One writer per connection persisting annotated samples to daily CSV
//! files under `<base>/LoggedData/<connection_name>/`. Producers enqueue
//! into a bounded drop-oldest queue and never block; the writer task drains
//! it, appends, and flushes after every batch.

use crate::events::EventBus;
use crate::types::AnnotatedSample;
use chrono::{DateTime, NaiveDate, Utc};
use std::borrow::Cow;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::debug;

/// Queue capacity per connection.
const QUEUE_CAPACITY: usize = 10_000;

/// Samples drained per write batch.
const WRITE_BATCH: usize = 512;

/// Consecutive write failures before the writer backs off.
const FAILURE_BACKOFF_THRESHOLD: u32 = 5;

/// Delay between write attempts while backing off.
const FAILURE_BACKOFF: Duration = Duration::from_secs(10);

/// CSV header, the first line of every file.
const CSV_HEADER: &str = "timestamp_utc,tag_name,value,is_good_quality,alarm_state,error_message\n";

// =============================================================================
// Drop-Oldest Queue
// =============================================================================

/// Bounded queue that evicts the oldest entry instead of blocking the
/// producer.
pub(crate) struct SampleQueue {
    capacity: usize,
    buffer: Mutex<VecDeque<AnnotatedSample>>,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl SampleQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues a sample, evicting the oldest when full. Returns true if an
    /// eviction happened.
    pub(crate) fn push(&self, sample: AnnotatedSample) -> bool {
        let evicted = {
            let mut buffer = self.buffer.lock().unwrap();
            let evicted = if buffer.len() == self.capacity {
                buffer.pop_front();
                true
            } else {
                false
            };
            buffer.push_back(sample);
            evicted
        };
        if evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    /// Total samples evicted so far.
    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Awaits the next batch of up to `max` samples; `None` once the queue
    /// is closed and drained.
    pub(crate) async fn pop_batch(&self, max: usize) -> Option<Vec<AnnotatedSample>> {
        loop {
            let notified = self.notify.notified();
            {
                let mut buffer = self.buffer.lock().unwrap();
                if !buffer.is_empty() {
                    let take = buffer.len().min(max);
                    return Some(buffer.drain(..take).collect());
                }
                if self.closed.load(Ordering::SeqCst) {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Marks the queue closed; the writer drains what is left and exits.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

// =============================================================================
// CSV Formatting
// =============================================================================

/// Replaces every character outside `[A-Za-z0-9_-]` with `_`.
pub fn sanitize_connection_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// RFC-4180 field escaping: quote when the field contains a comma, quote,
/// CR or LF, doubling interior quotes.
fn escape_csv(field: &str) -> Cow<'_, str> {
    if field.contains(['"', ',', '\r', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// ISO-8601 with millisecond precision and trailing `Z`.
fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// One CSV line per sample, LF-terminated.
fn format_line(sample: &AnnotatedSample) -> String {
    let raw = &sample.sample;
    let value = raw.value.to_string();
    let error = raw.error_message.as_deref().unwrap_or("");
    format!(
        "{},{},{},{},{},{}\n",
        format_timestamp(raw.timestamp),
        escape_csv(&raw.tag_name),
        escape_csv(&value),
        raw.is_good_quality,
        sample.alarm_state,
        escape_csv(error),
    )
}

// =============================================================================
// CSV Writer
// =============================================================================

/// Append-only daily file writer for one connection.
struct CsvWriter {
    dir: PathBuf,
    current: Option<(NaiveDate, File)>,
}

impl CsvWriter {
    fn new(base_dir: &Path, connection_name: &str) -> Self {
        let dir = base_dir
            .join("LoggedData")
            .join(sanitize_connection_name(connection_name));
        Self { dir, current: None }
    }

    fn file_path(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.csv", date.format("%Y-%m-%d")))
    }

    /// Opens (creating if needed) the file for the given UTC date and writes
    /// the header when the file is new.
    async fn open_for(&mut self, date: NaiveDate) -> std::io::Result<()> {
        if let Some((current_date, file)) = self.current.as_mut() {
            if *current_date == date {
                return Ok(());
            }
            file.flush().await?;
            debug!(dir = %self.dir.display(), "rotating to {}", date);
            self.current = None;
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.file_path(date);
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await?;
        if file.metadata().await?.len() == 0 {
            file.write_all(CSV_HEADER.as_bytes()).await?;
        }
        self.current = Some((date, file));
        Ok(())
    }

    /// Appends a batch, rotating whenever a sample's UTC date differs from
    /// the open file's date, and flushes at the end.
    async fn write_batch(&mut self, samples: &[AnnotatedSample]) -> std::io::Result<()> {
        for sample in samples {
            let date = sample.sample.timestamp.date_naive();
            self.open_for(date).await?;
            let line = format_line(sample);
            let (_, file) = self.current.as_mut().expect("file opened above");
            file.write_all(line.as_bytes()).await?;
        }
        if let Some((_, file)) = self.current.as_mut() {
            file.flush().await?;
        }
        Ok(())
    }
}

// =============================================================================
// Sample Sink
// =============================================================================

/// Per-connection persistence sink.
pub struct SampleSink {
    connection_id: String,
    queue: Arc<SampleQueue>,
    bus: EventBus,
    task: Option<JoinHandle<()>>,
}

impl SampleSink {
    /// Creates a sink and spawns its writer task.
    pub fn new(base_dir: &Path, connection_name: &str, bus: EventBus) -> Self {
        let queue = Arc::new(SampleQueue::new(QUEUE_CAPACITY));
        let writer = CsvWriter::new(base_dir, connection_name);
        let task = tokio::spawn(run_writer(
            connection_name.to_string(),
            queue.clone(),
            writer,
            bus.clone(),
        ));

        Self {
            connection_id: connection_name.to_string(),
            queue,
            bus,
            task: Some(task),
        }
    }

    /// Enqueues a sample for persistence. Never blocks; the oldest queued
    /// sample is dropped on overflow.
    pub fn enqueue(&self, sample: AnnotatedSample) {
        if self.queue.push(sample) {
            self.bus.warn(
                &self.connection_id,
                format!(
                    "sink queue overflow, dropped oldest sample (total {})",
                    self.queue.dropped()
                ),
            );
        }
    }

    /// Total samples dropped due to queue overflow.
    pub fn dropped_samples(&self) -> u64 {
        self.queue.dropped()
    }

    /// Closes the queue, drains remaining samples and flushes the file.
    pub async fn close(mut self) {
        self.queue.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

async fn run_writer(
    connection_id: String,
    queue: Arc<SampleQueue>,
    mut writer: CsvWriter,
    bus: EventBus,
) {
    let mut consecutive_failures = 0u32;

    while let Some(batch) = queue.pop_batch(WRITE_BATCH).await {
        if consecutive_failures >= FAILURE_BACKOFF_THRESHOLD {
            sleep(FAILURE_BACKOFF).await;
        }

        match writer.write_batch(&batch).await {
            Ok(()) => {
                consecutive_failures = 0;
            }
            Err(e) => {
                consecutive_failures += 1;
                bus.warn(
                    &connection_id,
                    format!(
                        "sink write failed ({} in a row): {}",
                        consecutive_failures, e
                    ),
                );
            }
        }
    }

    debug!(connection = %connection_id, "sink writer drained and stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlarmState, Sample, TagValue};
    use chrono::TimeZone;

    fn annotated(tag: &str, value: TagValue, at: DateTime<Utc>) -> AnnotatedSample {
        AnnotatedSample {
            sample: Sample {
                connection_id: "c1".into(),
                tag_name: tag.into(),
                timestamp: at,
                value,
                is_good_quality: true,
                error_message: None,
            },
            alarm_state: AlarmState::Normal,
            mean: None,
            stddev: None,
            alarm_message: None,
            state_changed: false,
        }
    }

    /// Minimal RFC-4180 reader used to verify escaping round-trips.
    fn parse_csv_line(line: &str) -> Vec<String> {
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut chars = line.chars().peekable();
        let mut quoted = false;

        while let Some(c) = chars.next() {
            if quoted {
                if c == '"' {
                    if chars.peek() == Some(&'"') {
                        chars.next();
                        field.push('"');
                    } else {
                        quoted = false;
                    }
                } else {
                    field.push(c);
                }
            } else {
                match c {
                    '"' => quoted = true,
                    ',' => fields.push(std::mem::take(&mut field)),
                    _ => field.push(c),
                }
            }
        }
        fields.push(field);
        fields
    }

    #[test]
    fn test_sanitize_connection_name() {
        assert_eq!(sanitize_connection_name("Line 1 / PLC"), "Line_1___PLC");
        assert_eq!(sanitize_connection_name("plc-01_a"), "plc-01_a");
        assert_eq!(sanitize_connection_name("äöü"), "___");
    }

    #[test]
    fn test_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 34, 56).unwrap()
            + chrono::Duration::milliseconds(789);
        assert_eq!(format_timestamp(at), "2024-03-01T12:34:56.789Z");
    }

    #[test]
    fn test_escape_round_trip() {
        let nasty = [
            "plain",
            "with,comma",
            "with\"quote",
            "multi\nline",
            "cr\rhere",
            "\"quoted,\"\nall",
        ];
        for original in nasty {
            let escaped = escape_csv(original);
            let line = format!("a,{},b", escaped);
            let fields = parse_csv_line(&line);
            assert_eq!(fields.len(), 3, "line {:?}", line);
            assert_eq!(fields[1], original);
        }
    }

    #[test]
    fn test_format_line_shape() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let mut sample = annotated("temp,1", TagValue::F64(21.5), at);
        sample.alarm_state = AlarmState::High;
        sample.sample.error_message = None;

        let line = format_line(&sample);
        assert!(line.ends_with('\n'));
        assert!(!line.contains('\r'));
        let fields = parse_csv_line(line.trim_end());
        assert_eq!(fields[0], "2024-03-01T00:00:00.000Z");
        assert_eq!(fields[1], "temp,1");
        assert_eq!(fields[2], "21.5");
        assert_eq!(fields[3], "true");
        assert_eq!(fields[4], "High");
        assert_eq!(fields[5], "");
    }

    #[test]
    fn test_queue_drop_oldest() {
        let queue = SampleQueue::new(3);
        let at = Utc::now();
        for i in 0..5 {
            queue.push(annotated(&format!("t{}", i), TagValue::U16(i), at));
        }
        assert_eq!(queue.dropped(), 2);

        let buffer = queue.buffer.lock().unwrap();
        let names: Vec<&str> = buffer.iter().map(|s| s.sample.tag_name.as_str()).collect();
        assert_eq!(names, vec!["t2", "t3", "t4"]);
    }

    #[tokio::test]
    async fn test_queue_close_drains() {
        let queue = Arc::new(SampleQueue::new(10));
        queue.push(annotated("a", TagValue::U16(1), Utc::now()));
        queue.push(annotated("b", TagValue::U16(2), Utc::now()));
        queue.close();

        let batch = queue.pop_batch(100).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert!(queue.pop_batch(100).await.is_none());
    }

    #[tokio::test]
    async fn test_writer_creates_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvWriter::new(dir.path(), "conn");
        let at = Utc.with_ymd_and_hms(2024, 5, 5, 10, 0, 0).unwrap();

        writer
            .write_batch(&[annotated("a", TagValue::U16(1), at)])
            .await
            .unwrap();
        writer
            .write_batch(&[annotated("b", TagValue::U16(2), at)])
            .await
            .unwrap();

        let path = dir.path().join("LoggedData/conn/2024-05-05.csv");
        let content = std::fs::read_to_string(path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER.trim_end());
        assert!(lines[1].contains(",a,"));
        assert!(lines[2].contains(",b,"));
    }

    #[tokio::test]
    async fn test_rotation_by_sample_date() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = CsvWriter::new(dir.path(), "conn");

        let before_midnight = Utc.with_ymd_and_hms(2024, 5, 5, 23, 59, 59).unwrap();
        let after_midnight = Utc.with_ymd_and_hms(2024, 5, 6, 0, 0, 1).unwrap();

        writer
            .write_batch(&[
                annotated("a", TagValue::U16(1), before_midnight),
                annotated("b", TagValue::U16(2), after_midnight),
            ])
            .await
            .unwrap();

        let day_one = std::fs::read_to_string(
            dir.path().join("LoggedData/conn/2024-05-05.csv"),
        )
        .unwrap();
        let day_two = std::fs::read_to_string(
            dir.path().join("LoggedData/conn/2024-05-06.csv"),
        )
        .unwrap();

        // No sample lands in a file whose date differs from its own
        for line in day_one.lines().skip(1) {
            assert!(line.starts_with("2024-05-05"));
        }
        for line in day_two.lines().skip(1) {
            assert!(line.starts_with("2024-05-06"));
        }
        assert!(day_one.contains(",a,"));
        assert!(day_two.contains(",b,"));
    }

    #[tokio::test]
    async fn test_sink_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let sink = SampleSink::new(dir.path(), "Line 1", bus);

        let at = Utc.with_ymd_and_hms(2024, 7, 1, 8, 30, 0).unwrap();
        let mut sample = annotated("pressure", TagValue::F32(3.5), at);
        sample.alarm_state = AlarmState::HighHigh;
        sink.enqueue(sample);
        sink.enqueue(annotated("flow", TagValue::U16(77), at));

        sink.close().await;

        let content = std::fs::read_to_string(
            dir.path().join("LoggedData/Line_1/2024-07-01.csv"),
        )
        .unwrap();
        assert!(content.starts_with(CSV_HEADER));
        assert!(content.contains("pressure,3.5,true,HighHigh,"));
        assert!(content.contains("flow,77,true,Normal,"));
        // Portable output: no CR anywhere, no BOM
        assert!(!content.contains('\r'));
        assert!(!content.starts_with('\u{feff}'));
    }
}
