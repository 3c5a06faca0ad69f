//! Offline-first synchronization with the remote document store.
//!
//! A cycle pulls every collection (overwrite local copies, soft-delete
//! confirmed records that vanished remotely), then pushes this device's
//! dirty records in bounded batches, then records per-collection sync
//! timestamps. Collections are processed concurrently and fail
//! independently.

mod collection;
mod engine;
mod status;

pub use engine::{SyncEngine, SyncOptions};
pub use status::{
    CollectionReport, CycleReport, PullReport, PushReport, SkipReason, SyncEvent, SyncOutcome,
    SyncStatus,
};

#[cfg(test)]
mod tests;
