//! Search index synchronization: selection, projection, paging, bulk
//! writes and the bookkeeping that follows them.

mod best_effort;
mod bulk;
mod document;
mod executor;
mod incremental;
mod log_cleanup;
mod pager;
mod planner;
mod projector;
mod reconciler;
mod search_sync_engine;
mod sync_model;
mod sync_traits;
mod translator;

pub use best_effort::*;
pub use bulk::*;
pub use document::*;
pub use executor::*;
pub use incremental::{counter_reset_request, invite_window, message_boundary_date, InviteWindow};
pub use log_cleanup::*;
pub use pager::*;
pub use planner::*;
pub use projector::*;
pub use reconciler::*;
pub use search_sync_engine::*;
pub use sync_model::*;
pub use sync_traits::*;
pub use translator::*;

#[cfg(test)]
mod tests;
