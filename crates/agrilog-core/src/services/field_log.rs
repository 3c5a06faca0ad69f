//! Device-scoped field logging used by the application.

use std::sync::Arc;

use crate::identity::DeviceIdentity;
use crate::models::{
    AlertRecord, AlertSeverity, DiagnosisRecord, HarvestPatch, HarvestRecord, LogEntry,
    LogEntryPatch, NewDiagnosis, NewHarvest, NewLogEntry, NewPlant, Plant, PlantStatus,
    SyncRecord,
};
use crate::services::LocalStore;
use crate::util::normalize_text_option;
use crate::{Error, Result};

/// Name prefix for plants registered in bulk.
pub const DEFAULT_BULK_PREFIX: &str = "Bibit Baru";

/// Application-facing repository surface.
///
/// Log entries, diagnoses and harvests are listed for this device only.
/// Plants and alerts describe the shared farm and are listed across devices.
/// Every write is stamped with this device's id.
#[derive(Clone)]
pub struct FieldLog {
    store: LocalStore,
    identity: Arc<DeviceIdentity>,
}

impl FieldLog {
    pub fn new(store: LocalStore, identity: Arc<DeviceIdentity>) -> Self {
        Self { store, identity }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn identity(&self) -> Arc<DeviceIdentity> {
        Arc::clone(&self.identity)
    }

    pub async fn device_id(&self) -> Result<String> {
        self.identity.device_id().await
    }

    async fn add<R: SyncRecord>(&self, record: R) -> Result<R> {
        self.store.insert(&record).await?;
        tracing::debug!(collection = %R::COLLECTION, id = %record.id(), "Added record");
        Ok(record)
    }

    /// Shared farm data: any device may delete, and the delete is stamped with its id.
    async fn delete<R: SyncRecord>(&self, id: &str) -> Result<()> {
        let device_id = self.device_id().await?;
        let deleted = self.store.soft_delete::<R>(id, &device_id).await?;
        found::<R>(deleted, id)
    }

    /// Device-scoped data: only the owning device may delete.
    async fn delete_own<R: SyncRecord>(&self, id: &str) -> Result<()> {
        let device_id = self.device_id().await?;
        let deleted = self.store.soft_delete_owned::<R>(id, &device_id).await?;
        found::<R>(deleted, id)
    }

    // Log entries

    pub async fn add_log_entry(&self, mut fields: NewLogEntry) -> Result<LogEntry> {
        fields.block = required("block", &fields.block)?;
        fields.activity = required("activity", &fields.activity)?;
        fields.photo = normalize_text_option(fields.photo);
        let device_id = self.device_id().await?;
        self.add(LogEntry::new(&device_id, fields)).await
    }

    pub async fn log_entries(&self) -> Result<Vec<LogEntry>> {
        let device_id = self.device_id().await?;
        self.store.list_for_device(&device_id).await
    }

    pub async fn log_entries_on(&self, date: &str) -> Result<Vec<LogEntry>> {
        let device_id = self.device_id().await?;
        self.store.log_entries_on(&device_id, date).await
    }

    pub async fn update_log_entry(&self, id: &str, patch: LogEntryPatch) -> Result<LogEntry> {
        let device_id = self.device_id().await?;
        self.store
            .update_log_entry(id, &device_id, patch)
            .await?
            .ok_or_else(|| Error::NotFound(format!("log entry {id}")))
    }

    pub async fn delete_log_entry(&self, id: &str) -> Result<()> {
        self.delete_own::<LogEntry>(id).await
    }

    // Diagnoses

    pub async fn add_diagnosis(&self, mut fields: NewDiagnosis) -> Result<DiagnosisRecord> {
        fields.result_title = required("title", &fields.result_title)?;
        let device_id = self.device_id().await?;
        self.add(DiagnosisRecord::new(&device_id, fields)).await
    }

    pub async fn diagnoses(&self) -> Result<Vec<DiagnosisRecord>> {
        let device_id = self.device_id().await?;
        self.store.list_for_device(&device_id).await
    }

    pub async fn delete_diagnosis(&self, id: &str) -> Result<()> {
        self.delete_own::<DiagnosisRecord>(id).await
    }

    // Harvests

    pub async fn add_harvest(&self, mut fields: NewHarvest) -> Result<HarvestRecord> {
        fields.block = required("block", &fields.block)?;
        check_quantity(fields.quantity)?;
        let device_id = self.device_id().await?;
        self.add(HarvestRecord::new(&device_id, fields)).await
    }

    pub async fn harvests(&self) -> Result<Vec<HarvestRecord>> {
        let device_id = self.device_id().await?;
        self.store.list_for_device(&device_id).await
    }

    /// Harvests dated within `from..=to` (`YYYY-MM-DD`).
    pub async fn harvests_between(&self, from: &str, to: &str) -> Result<Vec<HarvestRecord>> {
        if from > to {
            return Err(Error::InvalidInput(format!(
                "Date range starts after it ends: {from} > {to}"
            )));
        }
        let device_id = self.device_id().await?;
        self.store.harvests_between(&device_id, from, to).await
    }

    pub async fn update_harvest(&self, id: &str, patch: HarvestPatch) -> Result<HarvestRecord> {
        if let Some(quantity) = patch.quantity {
            check_quantity(quantity)?;
        }
        let device_id = self.device_id().await?;
        self.store
            .update_harvest_record(id, &device_id, patch)
            .await?
            .ok_or_else(|| Error::NotFound(format!("harvest record {id}")))
    }

    pub async fn delete_harvest(&self, id: &str) -> Result<()> {
        self.delete_own::<HarvestRecord>(id).await
    }

    // Plants

    pub async fn add_plant(&self, mut fields: NewPlant) -> Result<Plant> {
        fields.block = required("block", &fields.block)?;
        fields.name = required("name", &fields.name)?;
        let device_id = self.device_id().await?;
        self.add(Plant::new(&device_id, fields)).await
    }

    pub async fn plants(&self) -> Result<Vec<Plant>> {
        self.store.list_all().await
    }

    /// Register `count` healthy plants in a block, named `{prefix} {n}`.
    pub async fn add_plants_bulk(
        &self,
        block: &str,
        count: usize,
        prefix: Option<&str>,
        planted_date: Option<String>,
    ) -> Result<usize> {
        let block = required("block", block)?;
        if count == 0 {
            return Ok(0);
        }
        let prefix = prefix
            .map(str::trim)
            .filter(|prefix| !prefix.is_empty())
            .unwrap_or(DEFAULT_BULK_PREFIX);
        let device_id = self.device_id().await?;

        let plants: Vec<Plant> = (1..=count)
            .map(|n| {
                Plant::new(
                    &device_id,
                    NewPlant {
                        block: block.clone(),
                        name: format!("{prefix} {n}"),
                        status: PlantStatus::Healthy,
                        planted_date: planted_date.clone(),
                        notes: String::new(),
                    },
                )
            })
            .collect();
        let added = self.store.add_plants_bulk(&plants).await?;
        tracing::info!(%block, count = added, "Registered plants");
        Ok(added)
    }

    pub async fn update_plant_status(&self, id: &str, status: PlantStatus) -> Result<()> {
        let device_id = self.device_id().await?;
        if self
            .store
            .update_plant_status(id, status, &device_id)
            .await?
        {
            Ok(())
        } else {
            Err(Error::NotFound(format!("plant {id}")))
        }
    }

    /// Move up to `limit` plants in a block from one status to another.
    pub async fn update_plant_status_by_block(
        &self,
        block: &str,
        from: PlantStatus,
        to: PlantStatus,
        limit: u32,
    ) -> Result<u64> {
        let block = required("block", block)?;
        if from == to || limit == 0 {
            return Ok(0);
        }
        let device_id = self.device_id().await?;
        self.store
            .update_plant_status_by_block(&block, from, to, limit, &device_id)
            .await
    }

    pub async fn delete_plant(&self, id: &str) -> Result<()> {
        self.delete::<Plant>(id).await
    }

    // Alerts

    pub async fn add_alert(
        &self,
        message: &str,
        severity: AlertSeverity,
        block: Option<String>,
    ) -> Result<AlertRecord> {
        let message = required("message", message)?;
        let device_id = self.device_id().await?;
        self.add(AlertRecord::new(
            &device_id,
            message,
            severity,
            normalize_text_option(block),
        ))
        .await
    }

    pub async fn alerts(&self) -> Result<Vec<AlertRecord>> {
        self.store.list_all().await
    }

    pub async fn unread_alerts(&self) -> Result<Vec<AlertRecord>> {
        self.store.unread_alerts().await
    }

    pub async fn mark_alert_read(&self, id: &str) -> Result<()> {
        let device_id = self.device_id().await?;
        if self.store.mark_alert_read(id, &device_id).await? {
            Ok(())
        } else {
            Err(Error::NotFound(format!("unread alert {id}")))
        }
    }

    pub async fn delete_alert(&self, id: &str) -> Result<()> {
        self.delete::<AlertRecord>(id).await
    }
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

fn found<R: SyncRecord>(deleted: bool, id: &str) -> Result<()> {
    if deleted {
        Ok(())
    } else {
        Err(Error::NotFound(format!("{} record {id}", R::COLLECTION)))
    }
}

fn check_quantity(quantity: f64) -> Result<()> {
    if quantity.is_finite() && quantity >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "quantity must be a non-negative number, got {quantity}"
        )))
    }
}
