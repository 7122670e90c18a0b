use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::{sleep, Duration};
use tracing::{error, info};
use tracing_splunk_sink::{
    init::init_tracing,
    sink::LogSink,
    SplunkSettings,
};

/// Example of shipping formatted documents somewhere other than HEC by
/// implementing the `LogSink` trait directly, e.g. a forwarder or a file
/// that a universal forwarder tails.
struct StdoutSink;

#[async_trait]
impl LogSink for StdoutSink {
    async fn send(&self, payload: &[u8]) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        print!("[splunk] {}", String::from_utf8_lossy(payload));
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let sink: Arc<dyn LogSink> = Arc::new(StdoutSink);
    let settings = SplunkSettings {
        application: Some("custom-backend".to_string()),
        source_type: Some("_json".to_string()),
        ..Default::default()
    };

    init_tracing(settings, sink).expect("install subscriber");

    info!("custom backend example started");
    error!(db = "orders", "simulated error sent via custom backend");

    sleep(Duration::from_secs(2)).await;
}
