use crate::formatter::SplunkJsonFormatter;
use crate::layer::SplunkLayer;
use crate::settings::SplunkSettings;
use crate::sink::LogSink;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::subscriber::SetGlobalDefaultError;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the Splunk layer.
///
/// Controls the internal buffer size, the batch size used when sending to
/// the sink, how often a partial batch is flushed, the minimum level that
/// is shipped, and whether events are also printed through the `fmt` layer.
///
/// **Fields**
/// - `channel_buffer`: maximum number of formatted events queued before new
///   ones are dropped.
/// - `batch_size`: number of events concatenated into one sink payload.
/// - `flush_interval`: maximum interval between flushes even when the batch
///   is not full.
/// - `min_level`: least severe level that is captured.
/// - `max_retries`: how many times a failed payload is resent before it is
///   dropped.
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is added
///   next to the Splunk layer.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub min_level: Level,
    pub max_retries: u32,
    pub enable_stdout: bool,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            min_level: Level::INFO,
            max_retries: 5,
            enable_stdout: true,
        }
    }
}

/// Install a global `tracing` subscriber that ships events to `sink` as
/// Splunk HEC documents.
///
/// **Parameters**
/// - `settings`: static deployment metadata stamped on every event.
/// - `sink`: implementation of [`LogSink`] receiving formatted payloads.
/// - `config`: [`LayerConfig`] controlling buffering and batching.
///
/// Must be called from within a Tokio runtime, since the layer spawns its
/// background task on it.
pub fn init_tracing_with_config(
    settings: SplunkSettings,
    sink: Arc<dyn LogSink>,
    config: LayerConfig,
) -> Result<(), SetGlobalDefaultError> {
    let (layer, _handle) = SplunkLayer::new(
        SplunkJsonFormatter::new(settings),
        sink,
        config.channel_buffer,
        config.batch_size,
        config.flush_interval,
        config.min_level,
        config.max_retries,
    );

    // The two subscriber shapes have different types, so each branch
    // installs its own.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Initialize tracing with [`LayerConfig::default`].
pub fn init_tracing(settings: SplunkSettings, sink: Arc<dyn LogSink>) -> Result<(), SetGlobalDefaultError> {
    init_tracing_with_config(settings, sink, LayerConfig::default())
}
