//! SQLite implementation of the search sync source repository.

mod model;
mod repository;

pub use model::{into_source_row, UserAvailabilityDB, UserDB, UserPreferenceDB};
pub use repository::{SearchSourceRepository, PAID_ORDER_STATUS};
