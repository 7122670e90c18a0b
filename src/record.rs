use std::fmt;

use chrono::{DateTime, Utc};

use crate::value::Properties;

/// Event severity, rendered with the names the Splunk dashboards expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Verbose,
    Debug,
    Information,
    Warning,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Verbose => "Verbose",
            Level::Debug => "Debug",
            Level::Information => "Information",
            Level::Warning => "Warning",
            Level::Error => "Error",
            Level::Fatal => "Fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Verbose,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Information,
            tracing::Level::WARN => Level::Warning,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Error details attached to a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub message: String,
    pub stack_trace: Option<String>,
}

impl ExceptionInfo {
    /// Capture an error and its `source()` chain.
    ///
    /// The chain is rendered one cause per line; errors without a source
    /// have no stack trace.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut causes = Vec::new();
        let mut current = error.source();
        while let Some(cause) = current {
            causes.push(format!("caused by: {}", cause));
            current = cause.source();
        }

        ExceptionInfo {
            message: error.to_string(),
            stack_trace: if causes.is_empty() { None } else { Some(causes.join("\n")) },
        }
    }
}

/// One captured log event.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub exception: Option<ExceptionInfo>,
    pub properties: Properties,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            exception: None,
            properties: Properties::new(),
        }
    }

    pub fn with_exception(mut self, exception: ExceptionInfo) -> Self {
        self.exception = Some(exception);
        self
    }

    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<crate::value::PropertyValue>,
    ) -> Self {
        self.properties.insert(key, value);
        self
    }
}
