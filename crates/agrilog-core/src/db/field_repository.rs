//! Entity-specific writes and filtered reads

use libsql::Connection;

use super::record_repository::{LibSqlRecordRepository, RecordRepository};
use crate::error::Result;
use crate::models::{
    AlertRecord, HarvestPatch, HarvestRecord, LogEntry, LogEntryPatch, Plant, PlantStatus,
};
use crate::util::now_timestamp;

/// Plants written per transaction during bulk registration
pub const BULK_INSERT_CHUNK: usize = 50;

/// libSQL repository for writes that only make sense for one entity type
pub struct LibSqlFieldRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlFieldRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Apply a partial update to a log entry owned by `device_id`.
    ///
    /// Returns the updated entry, or `None` when no such entry is visible.
    pub async fn update_log_entry(
        &self,
        id: &str,
        device_id: &str,
        patch: LogEntryPatch,
    ) -> Result<Option<LogEntry>> {
        let repo = LibSqlRecordRepository::<LogEntry>::new(self.conn);
        let Some(mut entry) = repo.get(id).await? else {
            return Ok(None);
        };
        if entry.envelope.deleted || entry.envelope.device_id != device_id {
            return Ok(None);
        }

        entry.apply(patch);
        repo.save(&entry).await?;
        Ok(Some(entry))
    }

    /// Apply a partial update to a harvest record owned by `device_id`.
    pub async fn update_harvest_record(
        &self,
        id: &str,
        device_id: &str,
        patch: HarvestPatch,
    ) -> Result<Option<HarvestRecord>> {
        let repo = LibSqlRecordRepository::<HarvestRecord>::new(self.conn);
        let Some(mut record) = repo.get(id).await? else {
            return Ok(None);
        };
        if record.envelope.deleted || record.envelope.device_id != device_id {
            return Ok(None);
        }

        record.apply(patch);
        repo.save(&record).await?;
        Ok(Some(record))
    }

    /// Change one plant's status.
    pub async fn update_plant_status(
        &self,
        id: &str,
        status: PlantStatus,
        device_id: &str,
    ) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "UPDATE plants SET status = ?, device_id = ?, updated_at = ?, synced = 0
                 WHERE id = ? AND deleted = 0",
                [status.as_str(), device_id, now_timestamp().as_str(), id],
            )
            .await?;
        Ok(affected > 0)
    }

    /// Move up to `limit` plants of a block from one status to another.
    ///
    /// Returns how many plants changed.
    pub async fn update_plant_status_by_block(
        &self,
        block: &str,
        from: PlantStatus,
        to: PlantStatus,
        limit: u32,
        device_id: &str,
    ) -> Result<u64> {
        let affected = self
            .conn
            .execute(
                "UPDATE plants SET status = ?, device_id = ?, updated_at = ?, synced = 0
                 WHERE id IN (
                     SELECT id FROM plants
                     WHERE block = ? AND status = ? AND deleted = 0
                     ORDER BY name
                     LIMIT ?
                 )",
                libsql::params![
                    to.as_str(),
                    device_id,
                    now_timestamp(),
                    block,
                    from.as_str(),
                    i64::from(limit)
                ],
            )
            .await?;
        Ok(affected)
    }

    /// Insert many plants, committing every [`BULK_INSERT_CHUNK`] rows.
    pub async fn add_plants_bulk(&self, plants: &[Plant]) -> Result<usize> {
        let repo = LibSqlRecordRepository::<Plant>::new(self.conn);
        let mut inserted = 0;

        for chunk in plants.chunks(BULK_INSERT_CHUNK) {
            self.conn.execute("BEGIN TRANSACTION", ()).await?;
            for plant in chunk {
                if let Err(error) = repo.insert(plant).await {
                    self.conn.execute("ROLLBACK", ()).await.ok();
                    return Err(error);
                }
            }
            if let Err(error) = self.conn.execute("COMMIT", ()).await {
                self.conn.execute("ROLLBACK", ()).await.ok();
                return Err(error.into());
            }
            inserted += chunk.len();
        }

        Ok(inserted)
    }

    /// Mark an alert read.
    pub async fn mark_alert_read(&self, id: &str, device_id: &str) -> Result<bool> {
        let affected = self
            .conn
            .execute(
                "UPDATE alerts SET is_read = 1, device_id = ?, updated_at = ?, synced = 0
                 WHERE id = ? AND deleted = 0 AND is_read = 0",
                [device_id, now_timestamp().as_str(), id],
            )
            .await?;
        Ok(affected > 0)
    }

    /// Unread alerts across all devices, newest first.
    pub async fn unread_alerts(&self) -> Result<Vec<AlertRecord>> {
        let rows = self
            .conn
            .query(
                &LibSqlRecordRepository::<AlertRecord>::select("deleted = 0 AND is_read = 0"),
                (),
            )
            .await?;
        LibSqlRecordRepository::<AlertRecord>::collect(rows).await
    }

    /// Log entries of one device on one day.
    pub async fn log_entries_on(&self, device_id: &str, date: &str) -> Result<Vec<LogEntry>> {
        let rows = self
            .conn
            .query(
                &LibSqlRecordRepository::<LogEntry>::select(
                    "device_id = ? AND date = ? AND deleted = 0",
                ),
                [device_id, date],
            )
            .await?;
        LibSqlRecordRepository::<LogEntry>::collect(rows).await
    }

    /// Harvests of one device between two dates, inclusive.
    pub async fn harvests_between(
        &self,
        device_id: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<HarvestRecord>> {
        let rows = self
            .conn
            .query(
                &LibSqlRecordRepository::<HarvestRecord>::select(
                    "device_id = ? AND date >= ? AND date <= ? AND deleted = 0",
                ),
                [device_id, from, to],
            )
            .await?;
        LibSqlRecordRepository::<HarvestRecord>::collect(rows).await
    }
}
