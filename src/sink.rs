use async_trait::async_trait;
use std::error::Error;

/// Asynchronous destination for formatted HEC payloads.
///
/// Implementations are responsible for transporting the bytes to a concrete
/// backend (Splunk HEC, a file, stdout, etc). The layer calls `send` from a
/// background task and never awaits it on the application thread.
#[async_trait]
pub trait LogSink: Send + Sync {
    /// Send a payload of one or more newline-terminated event documents.
    ///
    /// **Parameters**
    /// - `payload`: concatenated output of
    ///   [`SplunkJsonFormatter`](crate::formatter::SplunkJsonFormatter).
    ///
    /// **Returns**
    /// - `Ok(())` if the payload was accepted by the backend.
    /// - `Err(..)` if the backend failed (network error, HTTP status,
    ///   etc.). The layer will treat this as a transient failure and retry
    ///   the batch with backoff.
    async fn send(&self, payload: &[u8]) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Flush any buffered payloads, if the backend implements buffering.
    ///
    /// Default implementation is a no-op.
    async fn flush(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
