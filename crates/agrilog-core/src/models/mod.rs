//! Data models for AgriLog

mod alert;
mod dashboard;
mod diagnosis;
mod harvest;
mod log_entry;
mod plant;
pub mod record;

pub use alert::{AlertRecord, AlertSeverity};
pub use dashboard::{
    BlockActivity, DashboardStats, HarvestSummary, QualityTotal, StatusCount, SyncMetadata,
};
pub use diagnosis::{DiagnosisRecord, NewDiagnosis, RiskLevel};
pub use harvest::{HarvestPatch, HarvestRecord, NewHarvest, DEFAULT_QUALITY};
pub use log_entry::{needs_transcoding, LogEntry, LogEntryPatch, NewLogEntry, LOCAL_PHOTO_SCHEME};
pub use plant::{NewPlant, Plant, PlantStatus};
pub use record::{Collection, Envelope, SyncRecord};
