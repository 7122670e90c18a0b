use std::io::{self, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::document::{AdditionalData, ReservedKeys, SplunkDocument, SplunkEvent};
use crate::json::write_quoted_json_string;
use crate::record::{ExceptionInfo, LogRecord};
use crate::settings::SplunkSettings;
use crate::value_formatter::{JsonValueFormatter, ValueFormatter};

/// Error returned by [`SplunkJsonFormatter::format`].
///
/// Output may already be partially written when this is returned; the
/// caller owns discarding it.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Streams log records as Splunk HEC event documents.
///
/// Each call writes one newline-terminated JSON object of the form
///
/// ```text
/// {"time":"<secs>","event":{"Message":..,"ProcessName":..,"ProductCompany":..,
///  "ProductName":..,"ProductVersion":..,"Severity":..,"AdditionalData":{..}},
///  "source":..,"sourcetype":..,"host":..,"index":..}
/// ```
///
/// Blank fields are omitted. The formatter holds only immutable state and
/// can be shared across threads.
#[derive(Clone)]
pub struct SplunkJsonFormatter {
    settings: SplunkSettings,
    host: Option<String>,
    reserved: ReservedKeys,
    values: Arc<dyn ValueFormatter>,
}

impl SplunkJsonFormatter {
    /// Create a formatter for the given settings.
    ///
    /// The machine name is resolved once here; if it cannot be read the
    /// `host` field is omitted.
    pub fn new(settings: SplunkSettings) -> Self {
        let host = hostname::get()
            .ok()
            .map(|h| h.to_string_lossy().into_owned());

        SplunkJsonFormatter {
            settings,
            host,
            reserved: ReservedKeys::default(),
            values: Arc::new(JsonValueFormatter::default()),
        }
    }

    pub fn with_host(mut self, host: Option<String>) -> Self {
        self.host = host;
        self
    }

    pub fn with_reserved_keys(mut self, reserved: ReservedKeys) -> Self {
        self.reserved = reserved;
        self
    }

    pub fn with_value_formatter(mut self, values: Arc<dyn ValueFormatter>) -> Self {
        self.values = values;
        self
    }

    pub fn settings(&self) -> &SplunkSettings {
        &self.settings
    }

    /// Format `record` onto `output`, stamped with the current time.
    pub fn format<W: Write>(&self, record: &LogRecord, output: &mut W) -> Result<(), FormatError> {
        self.format_at(record, Utc::now(), output)
    }

    /// Format `record` onto `output`, stamped with `now` truncated to
    /// whole seconds.
    pub fn format_at<W: Write>(
        &self,
        record: &LogRecord,
        now: DateTime<Utc>,
        output: &mut W,
    ) -> Result<(), FormatError> {
        let document = SplunkDocument::arrange(
            &self.settings,
            record,
            &self.reserved,
            now.timestamp(),
            self.host.as_deref(),
        );
        let trailer = trailer(&document)?;

        self.write_document(&document, &trailer, output)?;
        Ok(())
    }

    /// Format `record` into a fresh buffer.
    pub fn format_to_vec(&self, record: &LogRecord) -> Result<Vec<u8>, FormatError> {
        let mut buf = Vec::with_capacity(256);
        self.format(record, &mut buf)?;
        Ok(buf)
    }

    fn write_document(
        &self,
        document: &SplunkDocument<'_>,
        trailer: &[u8],
        output: &mut dyn Write,
    ) -> io::Result<()> {
        write!(output, "{{\"time\":\"{}\",\"event\":{{", document.time)?;

        let delim = write_event_fields(&document.event, output)?;
        output.write_all(delim.as_bytes())?;
        self.write_additional_data(&document.event.additional_data, output)?;

        output.write_all(trailer)?;
        output.write_all(b"\n")
    }

    fn write_additional_data(&self, data: &AdditionalData<'_>, output: &mut dyn Write) -> io::Result<()> {
        output.write_all(b"\"AdditionalData\":{")?;

        let mut delim = "";
        for (key, value) in &data.properties {
            output.write_all(delim.as_bytes())?;
            delim = ",";
            write_quoted_json_string(key, output)?;
            output.write_all(b":")?;
            self.values.format(value, output)?;
        }

        if let Some(exception) = data.exception {
            output.write_all(delim.as_bytes())?;
            write_exception(exception, output)?;
        }

        output.write_all(b"}")
    }
}

/// Write the fixed event fields that are present and return the delimiter
/// the next member needs.
fn write_event_fields(event: &SplunkEvent<'_>, output: &mut dyn Write) -> io::Result<&'static str> {
    let fields = [
        ("Message", event.message.as_deref()),
        ("ProcessName", event.process_name),
        ("ProductCompany", event.product_company),
        ("ProductName", event.product_name),
        ("ProductVersion", event.product_version),
        ("Severity", event.severity),
    ];

    let mut delim = "";
    for (name, value) in fields {
        if let Some(value) = present(value) {
            output.write_all(delim.as_bytes())?;
            delim = ",";
            write_member(name, value, output)?;
        }
    }
    Ok(delim)
}

fn write_exception(exception: &ExceptionInfo, output: &mut dyn Write) -> io::Result<()> {
    output.write_all(b"\"Exception\":{")?;
    write_member("Message", &exception.message, output)?;
    output.write_all(b",")?;
    write_member("StackTrace", exception.stack_trace.as_deref().unwrap_or(""), output)?;
    output.write_all(b"}")
}

/// Closing bytes for the document: the end of `event`, the routing fields
/// that are present, and the final brace.
pub fn trailer(document: &SplunkDocument<'_>) -> io::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(128);
    out.write_all(b"}")?;

    let fields = [
        ("source", document.source),
        ("sourcetype", document.sourcetype),
        ("host", document.host),
        ("index", document.index),
    ];
    for (name, value) in fields {
        if let Some(value) = present(value) {
            out.write_all(b",")?;
            write_member(name, value, &mut out)?;
        }
    }

    out.write_all(b"}")?;
    Ok(out)
}

fn write_member(name: &str, value: &str, output: &mut dyn Write) -> io::Result<()> {
    write_quoted_json_string(name, output)?;
    output.write_all(b":")?;
    write_quoted_json_string(value, output)
}

/// A field is emitted only when it has non-whitespace content.
fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Level;
    use crate::value::PropertyValue;
    use chrono::TimeZone;
    use serde_json::Value;

    fn full_settings() -> SplunkSettings {
        SplunkSettings {
            server_url: Some("https://splunk.local:8088".to_string()),
            token: Some("secret".to_string()),
            index: Some("main".to_string()),
            source_type: Some("json".to_string()),
            product_company: Some("Acme".to_string()),
            product_version: Some("1.0".to_string()),
            process_name: Some("worker".to_string()),
            application: Some("svc".to_string()),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    fn render(formatter: &SplunkJsonFormatter, record: &LogRecord) -> String {
        let mut buf = Vec::new();
        formatter.format_at(record, now(), &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn full_document_matches_schema_order() {
        let formatter = SplunkJsonFormatter::new(full_settings()).with_host(Some("box-1".to_string()));
        let record = LogRecord::new(Level::Information, "started");

        let expected = format!(
            concat!(
                r#"{{"time":"{}","event":{{"Message":"started","ProcessName":"worker","#,
                r#""ProductCompany":"Acme","ProductName":"svc","ProductVersion":"1.0","#,
                r#""Severity":"Information","AdditionalData":{{}}}},"#,
                r#""source":"svc","sourcetype":"json","host":"box-1","index":"main"}}"#,
                "\n"
            ),
            now().timestamp()
        );
        assert_eq!(render(&formatter, &record), expected);
    }

    #[test]
    fn blank_settings_still_valid_json() {
        let formatter = SplunkJsonFormatter::new(SplunkSettings {
            index: Some("   ".to_string()),
            ..Default::default()
        })
        .with_host(None);
        let record = LogRecord::new(Level::Debug, "\"\"");

        let out = render(&formatter, &record);
        assert_eq!(
            out,
            format!(
                "{{\"time\":\"{}\",\"event\":{{\"Severity\":\"Debug\",\"AdditionalData\":{{}}}}}}\n",
                now().timestamp()
            )
        );
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert!(parsed.get("index").is_none());
    }

    #[test]
    fn properties_keep_order_and_exception_follows() {
        let formatter = SplunkJsonFormatter::new(SplunkSettings::default()).with_host(None);
        let record = LogRecord::new(Level::Error, "boom")
            .with_property("b", 2i64)
            .with_property("ProductVersion", "9.9")
            .with_property("a", vec![1i64, 2])
            .with_exception(ExceptionInfo {
                message: "disk \"full\"".to_string(),
                stack_trace: Some("at one\nat two".to_string()),
            });

        let out = render(&formatter, &record);
        assert!(out.contains(
            r#""AdditionalData":{"b":2,"a":[1,2],"Exception":{"Message":"disk \"full\"","StackTrace":"at one\nat two"}}"#
        ));
        serde_json::from_str::<Value>(&out).unwrap();
    }

    #[test]
    fn exception_without_properties_has_no_leading_comma() {
        let formatter = SplunkJsonFormatter::new(SplunkSettings::default()).with_host(None);
        let record = LogRecord::new(Level::Fatal, "down").with_exception(ExceptionInfo {
            message: "gone".to_string(),
            stack_trace: None,
        });

        let out = render(&formatter, &record);
        assert!(out.contains(r#""AdditionalData":{"Exception":{"Message":"gone","StackTrace":""}}"#));
    }

    #[test]
    fn trailer_only_lists_present_fields() {
        let settings = SplunkSettings {
            source_type: Some("json".to_string()),
            ..Default::default()
        };
        let record = LogRecord::new(Level::Information, "x");
        let doc = SplunkDocument::arrange(&settings, &record, &ReservedKeys::default(), 0, Some(" "));

        assert_eq!(trailer(&doc).unwrap(), br#"},"sourcetype":"json"}"#.to_vec());
    }

    #[test]
    fn time_ignores_record_timestamp() {
        let formatter = SplunkJsonFormatter::new(SplunkSettings::default());
        let mut record = LogRecord::new(Level::Information, "old");
        record.timestamp = Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap();

        let parsed: Value = serde_json::from_str(&render(&formatter, &record)).unwrap();
        assert_eq!(parsed["time"], Value::String(now().timestamp().to_string()));
    }

    struct SentinelValues;

    impl ValueFormatter for SentinelValues {
        fn format(&self, _value: &PropertyValue, output: &mut dyn Write) -> io::Result<()> {
            output.write_all(br#""X""#)
        }
    }

    #[test]
    fn injected_value_formatter_renders_properties() {
        let formatter = SplunkJsonFormatter::new(SplunkSettings::default())
            .with_host(None)
            .with_value_formatter(Arc::new(SentinelValues));
        let record = LogRecord::new(Level::Information, "x").with_property("k", vec![1i64, 2, 3]);

        let out = render(&formatter, &record);
        assert!(out.contains(r#""AdditionalData":{"k":"X"}"#), "{out}");
    }

    #[test]
    fn replacement_reserved_keys_are_used() {
        let formatter = SplunkJsonFormatter::new(SplunkSettings::default())
            .with_host(None)
            .with_reserved_keys(ReservedKeys::new(["k"]));
        let record = LogRecord::new(Level::Information, "x")
            .with_property("k", "hidden")
            .with_property("SplunkIndex", "audit");

        let out = render(&formatter, &record);
        assert!(out.contains(r#""AdditionalData":{"SplunkIndex":"audit"}"#), "{out}");
    }

    #[test]
    fn empty_fixed_group_leaves_no_delimiter() {
        let mut out = Vec::new();
        let delim = write_event_fields(&SplunkEvent::default(), &mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(delim, "");

        let event = SplunkEvent {
            message: Some(" ".to_string()),
            severity: Some("Error"),
            ..Default::default()
        };
        let delim = write_event_fields(&event, &mut out).unwrap();
        assert_eq!(out, br#""Severity":"Error""#.to_vec());
        assert_eq!(delim, ",");
    }

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn io_errors_propagate() {
        let formatter = SplunkJsonFormatter::new(SplunkSettings::default());
        let record = LogRecord::new(Level::Information, "x");

        let err = formatter.format(&record, &mut FailingWriter).unwrap_err();
        match err {
            FormatError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
        }
    }
}
