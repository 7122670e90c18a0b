use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{error, Level};

use tracing_splunk_sink::init::{init_tracing_with_config, LayerConfig};
use tracing_splunk_sink::noop_sink::NoopSink;
use tracing_splunk_sink::SplunkSettings;

#[tokio::main]
async fn main() {
    let sink = Arc::new(NoopSink::default());

    let layer_config = LayerConfig {
        channel_buffer: 50_000,
        batch_size: 1_000,
        flush_interval: Duration::from_millis(200),
        min_level: Level::ERROR,
        max_retries: 0,
        enable_stdout: false,
    };

    init_tracing_with_config(SplunkSettings::from_env(), sink, layer_config)
        .expect("install subscriber");

    let n: u64 = 100_000;
    let start = Instant::now();

    for i in 0..n {
        error!(iteration = i, payload = ?vec![i, i * 2], "custom load test error");
    }

    let elapsed = start.elapsed();
    println!("custom config: formatted {} events in {:?} (~{:.0} ev/s)",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );

    sleep(Duration::from_secs(2)).await;
}
