use crate::settings::{SettingsError, SplunkSettings};
use crate::sink::LogSink;
use async_trait::async_trait;
use reqwest::Client;
use std::error::Error;

/// Path of the HEC JSON event endpoint, relative to the server URL.
pub const HEC_EVENT_PATH: &str = "/services/collector/event";

/// Splunk HTTP Event Collector implementation of [`LogSink`].
///
/// Payloads are posted as-is; HEC accepts several concatenated event
/// objects in one request body.
#[derive(Clone)]
pub struct HecSink {
    client: Client,
    endpoint: String,
    token: String,
}

impl HecSink {
    pub fn new(server_url: &str, token: impl Into<String>) -> Self {
        HecSink {
            client: Client::new(),
            endpoint: format!("{}{}", server_url.trim_end_matches('/'), HEC_EVENT_PATH),
            token: token.into(),
        }
    }

    /// Build a sink from the `server_url` and `token` settings.
    ///
    /// **Returns**
    /// - `Err(SettingsError::Missing(..))` if either value is absent or blank.
    pub fn from_settings(settings: &SplunkSettings) -> Result<Self, SettingsError> {
        let server_url = required(settings.server_url.as_deref(), "server_url")?;
        let token = required(settings.token.as_deref(), "token")?;
        Ok(HecSink::new(server_url, token))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Error returned when HEC rejects a request.
#[derive(thiserror::Error, Debug)]
pub enum HecError {
    #[error("HEC request failed with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str, SettingsError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(SettingsError::Missing(name))
}

#[async_trait]
impl LogSink for HecSink {
    async fn send(&self, payload: &[u8]) -> Result<(), Box<dyn Error + Send + Sync>> {
        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Splunk {}", self.token))
            .header("Content-Type", "application/json")
            .body(payload.to_vec())
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(HecError::Rejected { status, body }.into())
        }
    }
}
