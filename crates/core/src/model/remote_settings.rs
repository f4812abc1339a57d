use thiserror::Error;
use url::Url;

/// Table holding one row per session on the hosted backend.
pub const DEFAULT_TABLE: &str = "responses";

/// Connection settings for the hosted record store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteSettings {
    base_url: Url,
    api_key: String,
    table: String,
}

#[derive(Clone, Debug, Default)]
pub struct RemoteSettingsDraft {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub table: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RemoteSettingsError {
    #[error("remote base URL is missing")]
    MissingBaseUrl,
    #[error("invalid base URL")]
    InvalidBaseUrl,
    #[error("remote API key is missing")]
    MissingApiKey,
    #[error("invalid table name: {0}")]
    InvalidTable(String),
}

impl RemoteSettingsDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and normalize the draft.
    ///
    /// # Errors
    ///
    /// Returns `RemoteSettingsError` when the URL or key is missing, the URL
    /// does not parse, or the table name is not a plain identifier.
    pub fn validate(self) -> Result<RemoteSettings, RemoteSettingsError> {
        let base_url =
            normalize_optional(self.base_url).ok_or(RemoteSettingsError::MissingBaseUrl)?;
        let base_url = Url::parse(&base_url).map_err(|_| RemoteSettingsError::InvalidBaseUrl)?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(RemoteSettingsError::InvalidBaseUrl);
        }
        let api_key = normalize_optional(self.api_key).ok_or(RemoteSettingsError::MissingApiKey)?;
        let table = normalize_optional(self.table).unwrap_or_else(|| DEFAULT_TABLE.to_owned());
        if !table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(RemoteSettingsError::InvalidTable(table));
        }

        Ok(RemoteSettings {
            base_url,
            api_key,
            table,
        })
    }
}

impl RemoteSettings {
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}
