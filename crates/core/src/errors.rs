//! Error types shared by every carematch crate.

use thiserror::Error;

/// Result type alias for carematch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while talking to the relational source of record.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Failed to create connection pool: {0}")]
    PoolCreationFailed(String),

    #[error("Failed to run migrations: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

/// Top-level error for the sync engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Transport or API failure reported by the search index.
    #[error("Search index error: {0}")]
    SearchIndex(String),

    /// The index accepted the bulk request but rejected one or more items.
    /// `payload` carries the raw per-item error objects.
    #[error("Bulk write to '{index}' rejected {failed} item(s): {payload}")]
    BulkRejected {
        index: String,
        failed: usize,
        payload: String,
    },

    #[error("Log store error: {0}")]
    LogStore(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid sync request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for errors that abort a run because the index itself refused the write.
    pub fn is_bulk_rejection(&self) -> bool {
        matches!(self, Self::BulkRejected { .. })
    }
}
