//! Status events and cycle reports.

use std::fmt;

use serde::Serialize;

use crate::models::Collection;

/// Engine state as seen by subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Success,
    Error,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One status notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncEvent {
    pub status: SyncStatus,
    pub message: Option<String>,
}

impl SyncEvent {
    pub const fn idle() -> Self {
        Self {
            status: SyncStatus::Idle,
            message: None,
        }
    }

    pub const fn syncing() -> Self {
        Self {
            status: SyncStatus::Syncing,
            message: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Success,
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: SyncStatus::Error,
            message: Some(message.into()),
        }
    }
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {message}", self.status),
            None => write!(f, "{}", self.status),
        }
    }
}

/// Why a trigger did not start a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadySyncing,
    Offline,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AlreadySyncing => "a sync is already running",
            Self::Offline => "offline",
        })
    }
}

/// Result of one `sync_all` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Completed(CycleReport),
    Failed(String),
}

impl SyncOutcome {
    pub const fn report(&self) -> Option<&CycleReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Pull counters for one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PullReport {
    /// Documents returned by the remote store
    pub fetched: usize,
    pub upserted: usize,
    /// Documents that could not be decoded
    pub malformed: usize,
    /// Local records soft-deleted because they are gone remotely
    pub removed: usize,
}

/// Push counters for one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    /// Unsynced records found for this device
    pub pending: usize,
    /// Records confirmed and marked synced
    pub pushed: usize,
    /// Committed records left dirty because they changed during the push
    pub superseded: usize,
    /// Records skipped because their payload could not be prepared
    pub skipped: usize,
    pub chunks: usize,
    pub failed_chunks: usize,
    /// Records in failed chunks, still unsynced
    pub failed_records: usize,
}

/// What happened to one collection during a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub collection: Collection,
    pub pull: Option<PullReport>,
    pub push: Option<PushReport>,
    pub errors: Vec<String>,
}

impl CollectionReport {
    pub const fn new(collection: Collection) -> Self {
        Self {
            collection,
            pull: None,
            push: None,
            errors: Vec::new(),
        }
    }

    /// Both phases completed and every chunk was committed.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
            && self.pull.is_some()
            && self.push.is_some_and(|push| push.failed_chunks == 0)
    }
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub device_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub collections: Vec<CollectionReport>,
}

impl CycleReport {
    pub fn failed_collections(&self) -> impl Iterator<Item = &CollectionReport> {
        self.collections.iter().filter(|report| !report.is_clean())
    }

    /// No collection made it through cleanly.
    pub fn all_failed(&self) -> bool {
        !self.collections.is_empty() && self.collections.iter().all(|report| !report.is_clean())
    }

    pub fn status(&self) -> SyncStatus {
        if self.all_failed() {
            SyncStatus::Error
        } else {
            SyncStatus::Success
        }
    }

    pub fn pulled(&self) -> usize {
        self.collections
            .iter()
            .filter_map(|report| report.pull)
            .map(|pull| pull.upserted)
            .sum()
    }

    pub fn pushed(&self) -> usize {
        self.collections
            .iter()
            .filter_map(|report| report.push)
            .map(|push| push.pushed)
            .sum()
    }

    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        let failed: Vec<&str> = self
            .failed_collections()
            .map(|report| report.collection.as_str())
            .collect();
        let mut summary = format!(
            "pulled {} and pushed {} records",
            self.pulled(),
            self.pushed()
        );
        if !failed.is_empty() {
            summary.push_str(&format!("; incomplete: {}", failed.join(", ")));
        }
        summary
    }

    /// Error detail for a failed cycle.
    pub fn failure_detail(&self) -> String {
        let detail: Vec<String> = self
            .failed_collections()
            .map(|report| {
                let reason = report.errors.first().cloned().unwrap_or_else(|| {
                    let failed = report.push.map_or(0, |push| push.failed_chunks);
                    format!("{failed} failed chunk(s)")
                });
                format!("{}: {reason}", report.collection)
            })
            .collect();
        format!("sync failed for every collection ({})", detail.join("; "))
    }
}
