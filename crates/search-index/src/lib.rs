//! HTTP adapter for the Elasticsearch-compatible search index.
//!
//! [`ElasticClient`] implements the index write trait of `carematch-core`,
//! [`ElasticLogStore`] the log store used for privacy cleanup.

pub mod client;
pub mod config;
pub mod error;
pub mod log_store;

pub use client::ElasticClient;
pub use config::SearchIndexConfig;
pub use error::{ApiRetryClass, Result, SearchIndexError};
pub use log_store::ElasticLogStore;
