//! Aggregate views over the local store

use serde::{Deserialize, Serialize};

use super::PlantStatus;

/// Headline numbers for the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_plants: u64,
    pub healthy: u64,
    pub attention: u64,
    pub sick: u64,
    /// Harvested kilograms in the requested month
    pub harvest_this_month: f64,
}

/// Number of plants per status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: PlantStatus,
    pub count: u64,
}

/// Harvest totals over a date range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarvestSummary {
    pub records: u64,
    pub total_quantity: f64,
    pub by_quality: Vec<QualityTotal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityTotal {
    pub quality: String,
    pub quantity: f64,
}

/// Log entry count for one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockActivity {
    pub block: String,
    pub entries: u64,
}

/// Last successful sync time of one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    pub collection: String,
    pub last_synced_at: String,
}
