//! Local store shared by the application and the sync engine.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{
    ConfigRepository, Database, LibSqlConfigRepository, LibSqlDashboardRepository,
    LibSqlFieldRepository, LibSqlRecordRepository, RecordRepository,
};
use crate::models::{
    AlertRecord, BlockActivity, Collection, DashboardStats, DiagnosisRecord, HarvestPatch,
    HarvestRecord, HarvestSummary, LogEntry, LogEntryPatch, Plant, PlantStatus, StatusCount,
    SyncMetadata, SyncRecord,
};
use crate::Result;

/// Pending local changes of one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PendingCount {
    pub collection: Collection,
    pub pending: u64,
}

/// Thread-safe handle to the single local connection.
///
/// Every statement runs while holding the mutex, so concurrent tasks never
/// interleave statements on the connection.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open (and initialize) the store at a filesystem path.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::open(&db_path).await?;
        tracing::debug!(path = %db_path.display(), "Opened local store");
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Re-run schema creation and any pending migration.
    pub async fn initialize(&self) -> Result<()> {
        let db = self.db.lock().await;
        db.initialize().await
    }

    pub async fn schema_version(&self) -> Result<i32> {
        let db = self.db.lock().await;
        db.schema_version().await
    }

    // Generic record operations

    pub async fn list_for_device<R: SyncRecord>(&self, device_id: &str) -> Result<Vec<R>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<R>::new(db.connection())
            .list_for_device(device_id)
            .await
    }

    pub async fn list_all<R: SyncRecord>(&self) -> Result<Vec<R>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<R>::new(db.connection())
            .list_all()
            .await
    }

    pub async fn get<R: SyncRecord>(&self, id: &str) -> Result<Option<R>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<R>::new(db.connection())
            .get(id)
            .await
    }

    pub async fn insert<R: SyncRecord>(&self, record: &R) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<R>::new(db.connection())
            .insert(record)
            .await
    }

    pub async fn save<R: SyncRecord>(&self, record: &R) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<R>::new(db.connection())
            .save(record)
            .await
    }

    pub async fn soft_delete<R: SyncRecord>(&self, id: &str, device_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<R>::new(db.connection())
            .soft_delete(id, device_id)
            .await
    }

    pub async fn soft_delete_owned<R: SyncRecord>(
        &self,
        id: &str,
        device_id: &str,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<R>::new(db.connection())
            .soft_delete_owned(id, device_id)
            .await
    }

    pub async fn unsynced_for_device<R: SyncRecord>(&self, device_id: &str) -> Result<Vec<R>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<R>::new(db.connection())
            .unsynced_for_device(device_id)
            .await
    }

    pub async fn mark_synced<R: SyncRecord>(
        &self,
        id: &str,
        pushed_updated_at: &str,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<R>::new(db.connection())
            .mark_synced(id, pushed_updated_at)
            .await
    }

    pub async fn mark_synced_with_payload<R: SyncRecord>(
        &self,
        id: &str,
        pushed_updated_at: &str,
        payload: &str,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<R>::new(db.connection())
            .mark_synced_with_payload(id, pushed_updated_at, payload)
            .await
    }

    pub async fn reconcile<R: SyncRecord>(&self, cloud_ids: &HashSet<String>) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<R>::new(db.connection())
            .reconcile(cloud_ids)
            .await
    }

    pub async fn upsert_from_cloud<R: SyncRecord>(&self, record: R) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<R>::new(db.connection())
            .upsert_from_cloud(record)
            .await
    }

    pub async fn count_unsynced<R: SyncRecord>(&self) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<R>::new(db.connection())
            .count_unsynced()
            .await
    }

    /// Pending change counts for every collection.
    pub async fn pending_counts(&self) -> Result<Vec<PendingCount>> {
        let counts = [
            self.count_unsynced::<LogEntry>().await?,
            self.count_unsynced::<DiagnosisRecord>().await?,
            self.count_unsynced::<HarvestRecord>().await?,
            self.count_unsynced::<Plant>().await?,
            self.count_unsynced::<AlertRecord>().await?,
        ];
        Ok(Collection::ALL
            .into_iter()
            .zip(counts)
            .map(|(collection, pending)| PendingCount {
                collection,
                pending,
            })
            .collect())
    }

    // Config and sync metadata

    pub async fn get_config(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        LibSqlConfigRepository::new(db.connection())
            .get_config(key)
            .await
    }

    pub async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlConfigRepository::new(db.connection())
            .set_config(key, value)
            .await
    }

    pub async fn last_synced_at(&self, collection: Collection) -> Result<Option<String>> {
        let db = self.db.lock().await;
        LibSqlConfigRepository::new(db.connection())
            .last_synced_at(collection)
            .await
    }

    pub async fn set_last_synced_at(&self, collection: Collection, timestamp: &str) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlConfigRepository::new(db.connection())
            .set_last_synced_at(collection, timestamp)
            .await
    }

    pub async fn sync_metadata(&self) -> Result<Vec<SyncMetadata>> {
        let db = self.db.lock().await;
        LibSqlConfigRepository::new(db.connection())
            .sync_metadata()
            .await
    }

    // Entity-specific writes and reads

    pub async fn update_log_entry(
        &self,
        id: &str,
        device_id: &str,
        patch: LogEntryPatch,
    ) -> Result<Option<LogEntry>> {
        let db = self.db.lock().await;
        LibSqlFieldRepository::new(db.connection())
            .update_log_entry(id, device_id, patch)
            .await
    }

    pub async fn update_harvest_record(
        &self,
        id: &str,
        device_id: &str,
        patch: HarvestPatch,
    ) -> Result<Option<HarvestRecord>> {
        let db = self.db.lock().await;
        LibSqlFieldRepository::new(db.connection())
            .update_harvest_record(id, device_id, patch)
            .await
    }

    pub async fn update_plant_status(
        &self,
        id: &str,
        status: PlantStatus,
        device_id: &str,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlFieldRepository::new(db.connection())
            .update_plant_status(id, status, device_id)
            .await
    }

    pub async fn update_plant_status_by_block(
        &self,
        block: &str,
        from: PlantStatus,
        to: PlantStatus,
        limit: u32,
        device_id: &str,
    ) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlFieldRepository::new(db.connection())
            .update_plant_status_by_block(block, from, to, limit, device_id)
            .await
    }

    pub async fn add_plants_bulk(&self, plants: &[Plant]) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlFieldRepository::new(db.connection())
            .add_plants_bulk(plants)
            .await
    }

    pub async fn mark_alert_read(&self, id: &str, device_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlFieldRepository::new(db.connection())
            .mark_alert_read(id, device_id)
            .await
    }

    pub async fn unread_alerts(&self) -> Result<Vec<AlertRecord>> {
        let db = self.db.lock().await;
        LibSqlFieldRepository::new(db.connection())
            .unread_alerts()
            .await
    }

    pub async fn log_entries_on(&self, device_id: &str, date: &str) -> Result<Vec<LogEntry>> {
        let db = self.db.lock().await;
        LibSqlFieldRepository::new(db.connection())
            .log_entries_on(device_id, date)
            .await
    }

    pub async fn harvests_between(
        &self,
        device_id: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<HarvestRecord>> {
        let db = self.db.lock().await;
        LibSqlFieldRepository::new(db.connection())
            .harvests_between(device_id, from, to)
            .await
    }

    // Dashboard

    pub async fn dashboard_stats(&self, month: &str) -> Result<DashboardStats> {
        let db = self.db.lock().await;
        LibSqlDashboardRepository::new(db.connection())
            .stats(month)
            .await
    }

    pub async fn health_distribution(&self) -> Result<Vec<StatusCount>> {
        let db = self.db.lock().await;
        LibSqlDashboardRepository::new(db.connection())
            .health_distribution()
            .await
    }

    pub async fn harvest_summary(&self, from: &str, to: &str) -> Result<HarvestSummary> {
        let db = self.db.lock().await;
        LibSqlDashboardRepository::new(db.connection())
            .harvest_summary(from, to)
            .await
    }

    pub async fn block_activity(&self, since: &str) -> Result<Vec<BlockActivity>> {
        let db = self.db.lock().await;
        LibSqlDashboardRepository::new(db.connection())
            .block_activity(since)
            .await
    }
}
