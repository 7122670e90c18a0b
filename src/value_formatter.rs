use std::io::{self, Write};

use chrono::SecondsFormat;

use crate::json::write_quoted_json_string;
use crate::value::{PropertyValue, ScalarValue};

/// Renders a single property value as JSON.
///
/// Implementations must emit exactly one valid JSON value per call and
/// recurse through nested sequences, structures and dictionaries.
pub trait ValueFormatter: Send + Sync {
    fn format(&self, value: &PropertyValue, output: &mut dyn Write) -> io::Result<()>;
}

/// Default [`ValueFormatter`].
///
/// Structures are written as objects; when both the formatter's
/// `type_tag_name` and the structure's tag are set, the tag is appended as
/// the last member.
#[derive(Debug, Clone)]
pub struct JsonValueFormatter {
    type_tag_name: Option<String>,
}

pub const DEFAULT_TYPE_TAG_NAME: &str = "$type";

impl Default for JsonValueFormatter {
    fn default() -> Self {
        JsonValueFormatter {
            type_tag_name: Some(DEFAULT_TYPE_TAG_NAME.to_string()),
        }
    }
}

impl JsonValueFormatter {
    pub fn new(type_tag_name: Option<String>) -> Self {
        JsonValueFormatter { type_tag_name }
    }

    fn format_scalar(&self, scalar: &ScalarValue, output: &mut dyn Write) -> io::Result<()> {
        match scalar {
            ScalarValue::Null => output.write_all(b"null"),
            ScalarValue::Bool(b) => write!(output, "{}", b),
            ScalarValue::I64(n) => write!(output, "{}", n),
            ScalarValue::U64(n) => write!(output, "{}", n),
            ScalarValue::F64(n) => {
                if n.is_nan() {
                    write_quoted_json_string("NaN", output)
                } else if n.is_infinite() {
                    let text = if *n > 0.0 { "Infinity" } else { "-Infinity" };
                    write_quoted_json_string(text, output)
                } else {
                    serde_json::to_writer(output, n).map_err(io::Error::from)
                }
            }
            ScalarValue::Char(c) => {
                let mut buf = [0u8; 4];
                write_quoted_json_string(c.encode_utf8(&mut buf), output)
            }
            ScalarValue::Str(s) => write_quoted_json_string(s, output),
            ScalarValue::Timestamp(ts) => {
                write_quoted_json_string(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true), output)
            }
        }
    }

    fn format_structure(
        &self,
        type_tag: Option<&str>,
        properties: &[(String, PropertyValue)],
        output: &mut dyn Write,
    ) -> io::Result<()> {
        output.write_all(b"{")?;
        let mut delim = "";
        for (name, value) in properties {
            output.write_all(delim.as_bytes())?;
            delim = ",";
            write_quoted_json_string(name, output)?;
            output.write_all(b":")?;
            self.format(value, output)?;
        }

        if let (Some(tag_name), Some(tag)) = (self.type_tag_name.as_deref(), type_tag) {
            output.write_all(delim.as_bytes())?;
            write_quoted_json_string(tag_name, output)?;
            output.write_all(b":")?;
            write_quoted_json_string(tag, output)?;
        }
        output.write_all(b"}")
    }

    fn format_dictionary(
        &self,
        entries: &[(ScalarValue, PropertyValue)],
        output: &mut dyn Write,
    ) -> io::Result<()> {
        output.write_all(b"{")?;
        let mut delim = "";
        for (key, value) in entries {
            output.write_all(delim.as_bytes())?;
            delim = ",";
            write_quoted_json_string(&dictionary_key(key), output)?;
            output.write_all(b":")?;
            self.format(value, output)?;
        }
        output.write_all(b"}")
    }
}

/// Object keys must be strings; non-string scalars use their plain text form.
fn dictionary_key(key: &ScalarValue) -> String {
    match key {
        ScalarValue::Null => "null".to_string(),
        ScalarValue::Bool(b) => b.to_string(),
        ScalarValue::I64(n) => n.to_string(),
        ScalarValue::U64(n) => n.to_string(),
        ScalarValue::F64(n) => n.to_string(),
        ScalarValue::Char(c) => c.to_string(),
        ScalarValue::Str(s) => s.clone(),
        ScalarValue::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
    }
}

impl ValueFormatter for JsonValueFormatter {
    fn format(&self, value: &PropertyValue, output: &mut dyn Write) -> io::Result<()> {
        match value {
            PropertyValue::Scalar(scalar) => self.format_scalar(scalar, output),
            PropertyValue::Sequence(items) => {
                output.write_all(b"[")?;
                let mut delim = "";
                for item in items {
                    output.write_all(delim.as_bytes())?;
                    delim = ",";
                    self.format(item, output)?;
                }
                output.write_all(b"]")
            }
            PropertyValue::Structure { type_tag, properties } => {
                self.format_structure(type_tag.as_deref(), properties, output)
            }
            PropertyValue::Dictionary(entries) => self.format_dictionary(entries, output),
        }
    }
}
