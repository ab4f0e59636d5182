//! Core of the carematch search sync: domain models, pipelines and the
//! traits the storage and index crates implement.

pub mod config;
pub mod errors;
pub mod sync;

pub use config::SyncConfig;
pub use errors::{Error, Result};
