//! Connection settings for the search index.

use carematch_core::errors::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:9200";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchIndexConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SearchIndexConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            username: None,
            password: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl SearchIndexConfig {
    /// Reads `SEARCH_INDEX_*` variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let timeout_secs = match env_value("SEARCH_INDEX_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                Error::config(format!(
                    "SEARCH_INDEX_TIMEOUT_SECS has an invalid value '{}'",
                    raw
                ))
            })?,
            None => defaults.timeout_secs,
        };
        let config = Self {
            base_url: env_value("SEARCH_INDEX_URL").unwrap_or(defaults.base_url),
            username: env_value("SEARCH_INDEX_USERNAME"),
            password: env_value("SEARCH_INDEX_PASSWORD"),
            timeout_secs,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::config(format!(
                "search index URL must be http(s), got '{}'",
                self.base_url
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::config("search index timeout must be positive"));
        }
        if self.password.is_some() && self.username.is_none() {
            return Err(Error::config("search index password set without a username"));
        }
        Ok(())
    }
}
