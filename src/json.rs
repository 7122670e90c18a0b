use std::io::{self, Write};

/// Write `value` as a quoted JSON string, escaping quotes, backslashes and
/// control characters.
pub fn write_quoted_json_string(value: &str, output: &mut dyn Write) -> io::Result<()> {
    serde_json::to_writer(output, value).map_err(io::Error::from)
}
