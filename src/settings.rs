use serde::Deserialize;

// Environment variable names read by `SplunkSettings::from_env`. The
// formatter itself never touches the environment.

/// HEC base URL, e.g. `https://splunk.example.com:8088`.
pub const SPLUNK_SERVER_URL_ENV: &str = "SPLUNK_SERVER_URL";

/// HEC token sent as `Authorization: Splunk <token>`.
pub const SPLUNK_TOKEN_ENV: &str = "SPLUNK_TOKEN";

/// Target Splunk index.
pub const SPLUNK_INDEX_ENV: &str = "SPLUNK_INDEX";

/// Value for the `sourcetype` envelope field.
pub const SPLUNK_SOURCE_TYPE_ENV: &str = "SPLUNK_SOURCE_TYPE";

pub const SPLUNK_PRODUCT_COMPANY_ENV: &str = "SPLUNK_PRODUCT_COMPANY";

pub const SPLUNK_PRODUCT_VERSION_ENV: &str = "SPLUNK_PRODUCT_VERSION";

pub const SPLUNK_PROCESS_NAME_ENV: &str = "SPLUNK_PROCESS_NAME";

/// Application name, used both as `source` and `ProductName`.
pub const SPLUNK_APPLICATION_ENV: &str = "SPLUNK_APPLICATION";

/// Static deployment metadata shared by every formatted event.
///
/// All fields are optional: a blank or missing value simply drops the
/// corresponding field from the emitted document. `server_url` and
/// `token` are only consumed by the HEC transport.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SplunkSettings {
    pub server_url: Option<String>,
    pub token: Option<String>,
    pub index: Option<String>,
    pub source_type: Option<String>,
    pub product_company: Option<String>,
    pub product_version: Option<String>,
    pub process_name: Option<String>,
    pub application: Option<String>,
}

impl SplunkSettings {
    /// Build settings from the `SPLUNK_*` environment variables.
    ///
    /// Unset variables leave the corresponding field as `None`.
    pub fn from_env() -> Self {
        SplunkSettings {
            server_url: env_opt(SPLUNK_SERVER_URL_ENV),
            token: env_opt(SPLUNK_TOKEN_ENV),
            index: env_opt(SPLUNK_INDEX_ENV),
            source_type: env_opt(SPLUNK_SOURCE_TYPE_ENV),
            product_company: env_opt(SPLUNK_PRODUCT_COMPANY_ENV),
            product_version: env_opt(SPLUNK_PRODUCT_VERSION_ENV),
            process_name: env_opt(SPLUNK_PROCESS_NAME_ENV),
            application: env_opt(SPLUNK_APPLICATION_ENV),
        }
    }
}

/// Read an environment variable, treating unset and non-unicode values as absent.
pub fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Error returned when settings lack what a consumer requires.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SettingsError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
}
