//! SQLite source of record for the carematch search sync.

pub mod db;
pub mod errors;
pub mod schema;
pub mod search_source;

pub use db::{create_pool, get_connection, init, run_migrations, DbPool, WriteHandle};
pub use errors::StorageError;
pub use search_source::SearchSourceRepository;
