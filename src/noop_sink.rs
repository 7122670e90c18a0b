use crate::sink::LogSink;
use async_trait::async_trait;
use std::error::Error;

/// A sink that simply drops every payload.
///
/// Useful for measuring the cost of capture and formatting without any
/// network I/O.
#[derive(Clone, Default)]
pub struct NoopSink;

#[async_trait]
impl LogSink for NoopSink {
    async fn send(&self, _payload: &[u8]) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}
