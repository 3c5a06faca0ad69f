//! Services shared by every client of the core library.

mod field_log;
mod store;

pub use field_log::{FieldLog, DEFAULT_BULK_PREFIX};
pub use store::{LocalStore, PendingCount};
