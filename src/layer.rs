use crate::formatter::SplunkJsonFormatter;
use crate::record::{ExceptionInfo, Level as Severity, LogRecord};
use crate::sink::LogSink;
use crate::value::{Properties, PropertyValue, ScalarValue};
use chrono::Utc;
use std::error::Error;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that formats events as Splunk HEC documents
/// and forwards them to an asynchronous [`LogSink`] via a bounded channel
/// and background task.
///
/// Events more verbose than the configured minimum level are ignored.
/// Formatting happens on the calling thread; network I/O is fully
/// decoupled from application threads.
pub struct SplunkLayer {
    formatter: SplunkJsonFormatter,
    min_level: Level,
    sender: mpsc::Sender<Vec<u8>>,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Successfully enqueued into channel.
    pub enqueued_events: Arc<AtomicU64>,
    /// Dropped because the channel was full or formatting failed.
    pub dropped_events: Arc<AtomicU64>,
}

impl SplunkLayer {
    /// Create a new layer and spawn a background task that pulls formatted
    /// payloads from a bounded channel and sends them to `sink` in batches.
    ///
    /// Minimal thresholds are enforced for `buffer`, `batch_size` and
    /// `flush_interval` to avoid degenerate configurations. The task
    /// flushes what is left and exits once the layer is dropped.
    pub fn new(
        formatter: SplunkJsonFormatter,
        sink: Arc<dyn LogSink>,
        buffer: usize,
        batch_size: usize,
        flush_interval: Duration,
        min_level: Level,
        max_retries: u32,
    ) -> (Self, JoinHandle<()>) {
        let buffer = buffer.max(16);
        let batch_size = batch_size.max(1);
        let flush_interval = flush_interval.max(Duration::from_millis(10));

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(buffer);

        let total_events = Arc::new(AtomicU64::new(0));
        let enqueued_events = Arc::new(AtomicU64::new(0));
        let dropped_events = Arc::new(AtomicU64::new(0));

        let enqueued_events_bg = Arc::clone(&enqueued_events);

        let handle = tokio::spawn(async move {
            let mut batch: Vec<Vec<u8>> = Vec::with_capacity(batch_size);
            let mut ticker = interval(flush_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let backoff = Duration::from_millis(100);
            let max_backoff = Duration::from_secs(10);

            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(payload) => {
                            batch.push(payload);
                            enqueued_events_bg.fetch_add(1, Ordering::Relaxed);
                            if batch.len() >= batch_size {
                                if let Err(e) = send_batch(&*sink, &mut batch, backoff, max_backoff, max_retries).await {
                                    eprintln!("error sending splunk batch: {}", e);
                                }
                            }
                        }
                        None => {
                            if !batch.is_empty() {
                                if let Err(e) = send_batch(&*sink, &mut batch, backoff, max_backoff, max_retries).await {
                                    eprintln!("error flushing splunk batch on shutdown: {}", e);
                                }
                            }
                            if let Err(e) = sink.flush().await {
                                eprintln!("error flushing splunk sink: {}", e);
                            }
                            break;
                        }
                    },
                    _ = ticker.tick() => {
                        if !batch.is_empty() {
                            if let Err(e) = send_batch(&*sink, &mut batch, backoff, max_backoff, max_retries).await {
                                eprintln!("error flushing splunk batch: {}", e);
                            }
                        }
                    }
                }
            }
        });

        (Self {
            formatter,
            min_level,
            sender: tx,
            total_events,
            enqueued_events,
            dropped_events,
        }, handle)
    }
}

/// Send the whole batch as one payload, retrying with exponential backoff.
///
/// The batch is cleared once it was sent or the retry budget is exhausted.
async fn send_batch(
    sink: &dyn LogSink,
    batch: &mut Vec<Vec<u8>>,
    mut backoff: Duration,
    max_backoff: Duration,
    max_retries: u32,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let payload = batch.concat();
    batch.clear();

    let mut attempt = 0;
    loop {
        match sink.send(&payload).await {
            Ok(()) => return Ok(()),
            Err(e) if attempt >= max_retries => return Err(e),
            Err(_) => {
                attempt += 1;
                eprintln!("splunk sink send failed, retrying in {:?}", backoff);
                sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, max_backoff);
            }
        }
    }
}

impl<S> Layer<S> for SplunkLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        if *meta.level() > self.min_level {
            return;
        }

        let mut properties = Properties::new();
        let mut message: Option<String> = None;
        let mut exception: Option<ExceptionInfo> = None;

        let mut visitor = FieldVisitor {
            properties: &mut properties,
            message: &mut message,
            exception: &mut exception,
        };
        event.record(&mut visitor);

        let record = LogRecord {
            timestamp: Utc::now(),
            level: Severity::from(*meta.level()),
            message: message.unwrap_or_default(),
            exception,
            properties,
        };

        let payload = match self.formatter.format_to_vec(&record) {
            Ok(payload) => payload,
            Err(e) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
                eprintln!("failed to format splunk event: {}", e);
                return;
            }
        };

        if let Err(_e) = self.sender.try_send(payload) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
            eprintln!("splunk channel full, dropping log record");
        }
    }
}

/// Collects `tracing` fields into record properties.
///
/// The `message` field becomes the record message and the first recorded
/// error becomes its exception.
pub struct FieldVisitor<'a> {
    pub properties: &'a mut Properties,
    pub message: &'a mut Option<String>,
    pub exception: &'a mut Option<ExceptionInfo>,
}

impl<'a> FieldVisitor<'a> {
    fn insert(&mut self, field: &Field, value: ScalarValue) {
        self.properties.insert(field.name(), PropertyValue::Scalar(value));
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.insert(field, ScalarValue::Str(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, ScalarValue::I64(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, ScalarValue::U64(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, ScalarValue::F64(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, ScalarValue::Bool(value));
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        if self.exception.is_none() {
            *self.exception = Some(ExceptionInfo::from_error(value));
        } else {
            self.insert(field, ScalarValue::Str(value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.insert(field, ScalarValue::Str(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SplunkSettings;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    #[derive(Default)]
    struct CaptureSink {
        payloads: Mutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl LogSink for CaptureSink {
        async fn send(&self, payload: &[u8]) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.payloads.lock().unwrap().push(payload.to_vec());
            Ok(())
        }
    }

    #[derive(Debug, thiserror::Error)]
    #[error("disk full")]
    struct DiskFull;

    #[derive(Default)]
    struct FailingSink {
        attempts: AtomicU64,
    }

    #[async_trait]
    impl LogSink for FailingSink {
        async fn send(&self, _payload: &[u8]) -> Result<(), Box<dyn Error + Send + Sync>> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            Err("503 service unavailable".into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn send_batch_gives_up_after_max_retries() {
        let sink = FailingSink::default();
        let mut batch = vec![b"a\n".to_vec(), b"b\n".to_vec()];

        let result = send_batch(&sink, &mut batch, Duration::from_millis(100), Duration::from_secs(10), 3).await;

        assert!(result.is_err());
        assert_eq!(sink.attempts.load(Ordering::Relaxed), 4);
        assert!(batch.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn send_batch_concatenates_payloads() {
        let sink = CaptureSink::default();
        let mut batch = vec![b"a\n".to_vec(), b"b\n".to_vec()];

        send_batch(&sink, &mut batch, Duration::from_millis(100), Duration::from_secs(10), 0)
            .await
            .unwrap();

        assert_eq!(*sink.payloads.lock().unwrap(), vec![b"a\nb\n".to_vec()]);
    }

    #[tokio::test]
    async fn full_channel_counts_dropped_events() {
        let sink = Arc::new(CaptureSink::default());
        let (layer, handle) = SplunkLayer::new(
            SplunkJsonFormatter::new(SplunkSettings::default()),
            sink.clone(),
            16,
            1_000,
            Duration::from_secs(60),
            Level::INFO,
            0,
        );
        let total = Arc::clone(&layer.total_events);
        let enqueued = Arc::clone(&layer.enqueued_events);
        let dropped = Arc::clone(&layer.dropped_events);

        // The background task cannot run until this test yields, so the
        // channel holds exactly its capacity.
        tracing::subscriber::with_default(Registry::default().with(layer), || {
            for i in 0..20u64 {
                tracing::warn!(i, "burst");
            }
        });
        handle.await.unwrap();

        assert_eq!(total.load(Ordering::Relaxed), 20);
        assert_eq!(dropped.load(Ordering::Relaxed), 4);
        assert_eq!(enqueued.load(Ordering::Relaxed), 16);
        assert_eq!(documents(&sink).len(), 16);
    }

    fn documents(sink: &CaptureSink) -> Vec<serde_json::Value> {
        let payloads = sink.payloads.lock().unwrap();
        payloads
            .iter()
            .flat_map(|p| String::from_utf8(p.clone()).unwrap().lines().map(str::to_string).collect::<Vec<_>>())
            .map(|line| serde_json::from_str(&line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn captures_events_and_flushes_on_shutdown() {
        let sink = Arc::new(CaptureSink::default());
        let formatter = SplunkJsonFormatter::new(SplunkSettings {
            application: Some("svc".to_string()),
            ..Default::default()
        });
        let (layer, handle) = SplunkLayer::new(
            formatter,
            sink.clone(),
            64,
            100,
            Duration::from_secs(60),
            Level::INFO,
            0,
        );
        let dropped = Arc::clone(&layer.dropped_events);

        let subscriber = Registry::default().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("ignored");
            tracing::info!(order_id = 7u64, ProcessName = "spoofed", "order \"placed\"");
            let err = DiskFull;
            tracing::error!(error = &err as &(dyn Error + 'static), "write failed");
        });

        handle.await.unwrap();

        let docs = documents(&sink);
        assert_eq!(docs.len(), 2);
        assert_eq!(dropped.load(Ordering::Relaxed), 0);

        assert_eq!(docs[0]["event"]["Message"], "order placed");
        assert_eq!(docs[0]["event"]["Severity"], "Information");
        assert_eq!(docs[0]["event"]["AdditionalData"]["order_id"], 7);
        assert!(docs[0]["event"]["AdditionalData"].get("ProcessName").is_none());
        assert_eq!(docs[0]["source"], "svc");

        assert_eq!(docs[1]["event"]["Severity"], "Error");
        assert_eq!(docs[1]["event"]["AdditionalData"]["Exception"]["Message"], "disk full");
    }
}
