//! agrilog-core - offline-first field logging for smallholder farms
//!
//! This crate holds the local store, the repositories, device identity,
//! connectivity monitoring, photo transcoding and the sync engine that keeps
//! the local store and a remote document store in step.

pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod identity;
pub mod listeners;
pub mod media;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use models::{Collection, SyncRecord};
pub use services::{FieldLog, LocalStore};
pub use sync::{SyncEngine, SyncEvent, SyncOutcome, SyncStatus};
