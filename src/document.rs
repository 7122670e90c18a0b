use std::collections::BTreeSet;

use crate::record::{ExceptionInfo, LogRecord};
use crate::settings::SplunkSettings;
use crate::value::PropertyValue;

/// Property keys that never appear in `AdditionalData`.
///
/// They are either promoted to fixed event fields or are routing metadata
/// for the transport.
pub const DEFAULT_RESERVED_KEYS: [&str; 4] =
    ["SplunkIndex", "ProductCompany", "ProductVersion", "ProcessName"];

/// Set of property keys excluded from `AdditionalData`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedKeys(BTreeSet<String>);

impl ReservedKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ReservedKeys(keys.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }
}

impl Default for ReservedKeys {
    fn default() -> Self {
        ReservedKeys::new(DEFAULT_RESERVED_KEYS)
    }
}

/// The HEC envelope for one event. Built and discarded per format call.
#[derive(Debug, Clone)]
pub struct SplunkDocument<'a> {
    pub time: i64,
    pub host: Option<&'a str>,
    pub source: Option<&'a str>,
    pub sourcetype: Option<&'a str>,
    pub index: Option<&'a str>,
    pub event: SplunkEvent<'a>,
}

#[derive(Debug, Clone, Default)]
pub struct SplunkEvent<'a> {
    pub message: Option<String>,
    pub process_name: Option<&'a str>,
    pub product_company: Option<&'a str>,
    pub product_name: Option<&'a str>,
    pub product_version: Option<&'a str>,
    pub severity: Option<&'a str>,
    pub additional_data: AdditionalData<'a>,
}

/// Free-form properties that were not promoted to fixed fields.
#[derive(Debug, Clone, Default)]
pub struct AdditionalData<'a> {
    pub properties: Vec<(&'a str, &'a PropertyValue)>,
    pub exception: Option<&'a ExceptionInfo>,
}

impl<'a> SplunkDocument<'a> {
    /// Derive the document for `record` from the static settings.
    ///
    /// `time` is the formatting instant in whole Unix seconds; the record's
    /// own timestamp is not used.
    pub fn arrange(
        settings: &'a SplunkSettings,
        record: &'a LogRecord,
        reserved: &ReservedKeys,
        time: i64,
        host: Option<&'a str>,
    ) -> Self {
        let application = settings.application.as_deref();

        let properties = record
            .properties
            .iter()
            .filter(|(key, _)| !reserved.contains(key))
            .collect();

        SplunkDocument {
            time,
            host,
            source: application,
            sourcetype: settings.source_type.as_deref(),
            index: settings.index.as_deref(),
            event: SplunkEvent {
                message: Some(record.message.replace('"', "")),
                process_name: settings.process_name.as_deref(),
                product_company: settings.product_company.as_deref(),
                product_name: application,
                product_version: settings.product_version.as_deref(),
                severity: Some(record.level.as_str()),
                additional_data: AdditionalData {
                    properties,
                    exception: record.exception.as_ref(),
                },
            },
        }
    }
}
