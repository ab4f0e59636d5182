//! Error types for the search index client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchIndexError>;

#[derive(Debug, Error)]
pub enum SearchIndexError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// How a caller should treat a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiRetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

impl SearchIndexError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn retry_class(&self) -> ApiRetryClass {
        match self {
            Self::Api { status, .. } => match *status {
                401 | 403 => ApiRetryClass::ReauthRequired,
                408 | 409 | 429 => ApiRetryClass::Retryable,
                s if s >= 500 => ApiRetryClass::Retryable,
                _ => ApiRetryClass::Permanent,
            },
            Self::Http(_) => ApiRetryClass::Retryable,
            Self::Json(_) | Self::InvalidRequest(_) => ApiRetryClass::Permanent,
        }
    }
}

impl From<SearchIndexError> for carematch_core::Error {
    fn from(err: SearchIndexError) -> Self {
        match err {
            SearchIndexError::Json(e) => carematch_core::Error::Serialization(e),
            SearchIndexError::InvalidRequest(message) => {
                carematch_core::Error::InvalidRequest(message)
            }
            other => carematch_core::Error::SearchIndex(other.to_string()),
        }
    }
}
