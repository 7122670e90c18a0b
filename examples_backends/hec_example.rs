use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{error, info};
use tracing_splunk_sink::{hec::HecSink, init::init_tracing, SplunkSettings};

/// Ships events to a real HEC endpoint.
///
/// Configure with `SPLUNK_SERVER_URL`, `SPLUNK_TOKEN` and optionally
/// `SPLUNK_INDEX`, `SPLUNK_SOURCE_TYPE`, `SPLUNK_APPLICATION`, etc.
#[tokio::main]
async fn main() {
    let settings = SplunkSettings::from_env();
    let sink = match HecSink::from_settings(&settings) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("cannot build HEC sink: {}", e);
            return;
        }
    };
    println!("sending to {}", sink.endpoint());

    init_tracing(settings, Arc::new(sink)).expect("install subscriber");

    info!(order_id = 42, "hec example started");
    error!(SplunkIndex = "ignored", attempt = 3, "simulated failure");

    sleep(Duration::from_secs(2)).await;
}
