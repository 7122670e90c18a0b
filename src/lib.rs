pub mod settings;
pub mod value;
pub mod record;
pub mod json;
pub mod value_formatter;
pub mod document;
pub mod formatter;
pub mod sink;
pub mod layer;

#[cfg(feature = "hec")]
pub mod hec;

pub mod init;
pub mod noop_sink;

pub use formatter::{FormatError, SplunkJsonFormatter};
pub use record::{ExceptionInfo, Level, LogRecord};
pub use settings::SplunkSettings;
pub use value::{Properties, PropertyValue, ScalarValue};
