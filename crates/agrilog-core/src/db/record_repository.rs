//! Sync-aware repository shared by every entity table

use std::collections::HashSet;
use std::marker::PhantomData;

use libsql::params::Params;
use libsql::{Connection, Rows};

use crate::error::{Error, Result};
use crate::models::SyncRecord;
use crate::util::now_timestamp;

/// Storage operations the sync engine and the application share (async)
#[allow(async_fn_in_trait)]
pub trait RecordRepository<R: SyncRecord> {
    /// Non-deleted records owned by one device
    async fn list_for_device(&self, device_id: &str) -> Result<Vec<R>>;

    /// Non-deleted records from every device
    async fn list_all(&self) -> Result<Vec<R>>;

    /// Get a record by id, including soft-deleted ones
    async fn get(&self, id: &str) -> Result<Option<R>>;

    /// Insert a new local record
    async fn insert(&self, record: &R) -> Result<()>;

    /// Persist a record mutated in memory (marks it dirty)
    async fn save(&self, record: &R) -> Result<()>;

    /// Soft delete a record on behalf of a device
    async fn soft_delete(&self, id: &str, device_id: &str) -> Result<bool>;

    /// Soft delete a record only if `device_id` owns it
    async fn soft_delete_owned(&self, id: &str, device_id: &str) -> Result<bool>;

    /// Records of one device with changes not yet confirmed remotely
    async fn unsynced_for_device(&self, device_id: &str) -> Result<Vec<R>>;

    /// Mark a pushed record synced, unless it changed since it was read for push
    async fn mark_synced(&self, id: &str, pushed_updated_at: &str) -> Result<bool>;

    /// Persist a prepared payload and mark the record synced in one update
    async fn mark_synced_with_payload(
        &self,
        id: &str,
        pushed_updated_at: &str,
        payload: &str,
    ) -> Result<bool>;

    /// Soft delete confirmed records whose ids are absent remotely
    async fn reconcile(&self, cloud_ids: &HashSet<String>) -> Result<usize>;

    /// Overwrite the local copy with a remote document's state
    async fn upsert_from_cloud(&self, record: R) -> Result<()>;

    /// Number of records waiting to be pushed
    async fn count_unsynced(&self) -> Result<u64>;
}

/// libSQL implementation of `RecordRepository`
pub struct LibSqlRecordRepository<'a, R> {
    conn: &'a Connection,
    _record: PhantomData<R>,
}

impl<'a, R: SyncRecord> LibSqlRecordRepository<'a, R> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            _record: PhantomData,
        }
    }

    fn table() -> &'static str {
        R::COLLECTION.as_str()
    }

    pub(crate) fn select(filter: &str) -> String {
        format!(
            "SELECT {} FROM {} WHERE {filter} ORDER BY {}",
            R::columns().join(", "),
            Self::table(),
            R::ORDER_BY
        )
    }

    pub(crate) async fn collect(mut rows: Rows) -> Result<Vec<R>> {
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(R::decode_row(&row)?);
        }
        Ok(records)
    }

    async fn write(&self, verb: &str, record: &R) -> Result<()> {
        let columns = R::columns();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "{verb} INTO {} ({}) VALUES ({placeholders})",
            Self::table(),
            columns.join(", ")
        );
        self.conn
            .execute(&sql, Params::Positional(record.values()?))
            .await?;
        Ok(())
    }
}

impl<R: SyncRecord> RecordRepository<R> for LibSqlRecordRepository<'_, R> {
    async fn list_for_device(&self, device_id: &str) -> Result<Vec<R>> {
        let rows = self
            .conn
            .query(
                &Self::select("device_id = ? AND deleted = 0"),
                [device_id],
            )
            .await?;
        Self::collect(rows).await
    }

    async fn list_all(&self) -> Result<Vec<R>> {
        let rows = self.conn.query(&Self::select("deleted = 0"), ()).await?;
        Self::collect(rows).await
    }

    async fn get(&self, id: &str) -> Result<Option<R>> {
        let rows = self.conn.query(&Self::select("id = ?"), [id]).await?;
        Ok(Self::collect(rows).await?.into_iter().next())
    }

    async fn insert(&self, record: &R) -> Result<()> {
        self.write("INSERT", record).await
    }

    async fn save(&self, record: &R) -> Result<()> {
        let mut record = record.clone();
        record.envelope_mut().synced = false;
        self.write("INSERT OR REPLACE", &record).await
    }

    async fn soft_delete(&self, id: &str, device_id: &str) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET deleted = 1, synced = 0, device_id = ?, updated_at = ?
             WHERE id = ? AND deleted = 0",
            Self::table()
        );
        let affected = self
            .conn
            .execute(&sql, [device_id, now_timestamp().as_str(), id])
            .await?;
        Ok(affected > 0)
    }

    async fn soft_delete_owned(&self, id: &str, device_id: &str) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET deleted = 1, synced = 0, updated_at = ?
             WHERE id = ? AND device_id = ? AND deleted = 0",
            Self::table()
        );
        let affected = self
            .conn
            .execute(&sql, [now_timestamp().as_str(), id, device_id])
            .await?;
        Ok(affected > 0)
    }

    async fn unsynced_for_device(&self, device_id: &str) -> Result<Vec<R>> {
        let rows = self
            .conn
            .query(
                &Self::select("device_id = ? AND synced = 0 AND deleted = 0"),
                [device_id],
            )
            .await?;
        Self::collect(rows).await
    }

    async fn mark_synced(&self, id: &str, pushed_updated_at: &str) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET synced = 1 WHERE id = ? AND updated_at = ? AND synced = 0",
            Self::table()
        );
        let affected = self.conn.execute(&sql, [id, pushed_updated_at]).await?;
        Ok(affected > 0)
    }

    async fn mark_synced_with_payload(
        &self,
        id: &str,
        pushed_updated_at: &str,
        payload: &str,
    ) -> Result<bool> {
        let column = R::PAYLOAD_COLUMN.ok_or_else(|| {
            Error::InvalidInput(format!("{} records carry no payload", R::COLLECTION))
        })?;
        let sql = format!(
            "UPDATE {} SET {column} = ?, synced = 1 WHERE id = ? AND updated_at = ? AND synced = 0",
            Self::table()
        );
        let affected = self
            .conn
            .execute(&sql, [payload, id, pushed_updated_at])
            .await?;
        Ok(affected > 0)
    }

    async fn reconcile(&self, cloud_ids: &HashSet<String>) -> Result<usize> {
        let sql = format!(
            "SELECT id FROM {} WHERE synced = 1 AND deleted = 0",
            Self::table()
        );
        let mut rows = self.conn.query(&sql, ()).await?;
        let mut missing = Vec::new();
        while let Some(row) = rows.next().await? {
            let id: String = row.get(0)?;
            if !cloud_ids.contains(&id) {
                missing.push(id);
            }
        }

        if missing.is_empty() {
            return Ok(0);
        }

        let now = now_timestamp();
        let sql = format!(
            "UPDATE {} SET deleted = 1, updated_at = ?, synced = 1
             WHERE id = ? AND synced = 1 AND deleted = 0",
            Self::table()
        );
        let mut removed = 0;
        for id in &missing {
            removed += self.conn.execute(&sql, [now.as_str(), id.as_str()]).await?;
        }

        tracing::debug!(
            collection = %R::COLLECTION,
            removed,
            "Soft-deleted records missing from remote"
        );
        Ok(usize::try_from(removed).unwrap_or(usize::MAX))
    }

    async fn upsert_from_cloud(&self, mut record: R) -> Result<()> {
        record.envelope_mut().synced = true;
        self.write("INSERT OR REPLACE", &record).await
    }

    async fn count_unsynced(&self) -> Result<u64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE synced = 0 AND deleted = 0",
            Self::table()
        );
        let mut rows = self.conn.query(&sql, ()).await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{NewPlant, Plant, PlantStatus};
    use pretty_assertions::assert_eq;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn plant(device: &str, name: &str) -> Plant {
        Plant::new(
            device,
            NewPlant {
                block: "A1".to_string(),
                name: name.to_string(),
                status: PlantStatus::Healthy,
                ..NewPlant::default()
            },
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_insert_and_list_scoped_by_device() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::<Plant>::new(db.connection());

        repo.insert(&plant("dev-a", "Sawit 1")).await.unwrap();
        repo.insert(&plant("dev-b", "Sawit 2")).await.unwrap();

        let mine = repo.list_for_device("dev-a").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].name, "Sawit 1");
        assert_eq!(repo.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_soft_delete_hides_and_dirties() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::<Plant>::new(db.connection());
        let mut record = plant("dev-a", "Sawit 1");
        record.envelope.synced = true;
        repo.upsert_from_cloud(record.clone()).await.unwrap();

        assert!(repo.soft_delete(&record.envelope.id, "dev-a").await.unwrap());
        assert!(!repo.soft_delete(&record.envelope.id, "dev-a").await.unwrap());

        assert!(repo.list_all().await.unwrap().is_empty());
        let stored = repo.get(&record.envelope.id).await.unwrap().unwrap();
        assert!(stored.envelope.deleted);
        assert!(!stored.envelope.synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_owned_soft_delete_ignores_other_devices() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::<Plant>::new(db.connection());
        let record = plant("dev-b", "Sawit 1");
        repo.insert(&record).await.unwrap();

        assert!(!repo
            .soft_delete_owned(&record.envelope.id, "dev-a")
            .await
            .unwrap());
        let untouched = repo.get(&record.envelope.id).await.unwrap().unwrap();
        assert!(!untouched.envelope.deleted);

        assert!(repo
            .soft_delete_owned(&record.envelope.id, "dev-b")
            .await
            .unwrap());
        let deleted = repo.get(&record.envelope.id).await.unwrap().unwrap();
        assert!(deleted.envelope.deleted);
        assert_eq!(deleted.envelope.device_id, "dev-b");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_synced_requires_unchanged_version() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::<Plant>::new(db.connection());
        let record = plant("dev-a", "Sawit 1");
        repo.insert(&record).await.unwrap();

        assert!(!repo
            .mark_synced(&record.envelope.id, "1999-01-01T00:00:00.000Z")
            .await
            .unwrap());
        assert!(repo
            .mark_synced(&record.envelope.id, &record.envelope.updated_at)
            .await
            .unwrap());
        assert_eq!(repo.count_unsynced().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_synced_tells_apart_edits_in_the_same_millisecond() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::<Plant>::new(db.connection());
        let mut record = plant("dev-a", "Sawit 1");
        record.envelope.updated_at = "2024-03-01T08:00:00.123456Z".to_string();
        repo.insert(&record).await.unwrap();

        assert!(!repo
            .mark_synced(&record.envelope.id, "2024-03-01T08:00:00.123000Z")
            .await
            .unwrap());
        assert!(repo
            .mark_synced(&record.envelope.id, "2024-03-01T08:00:00.123456Z")
            .await
            .unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reconcile_never_touches_unsynced_records() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::<Plant>::new(db.connection());

        let pending = plant("dev-a", "Pending");
        repo.insert(&pending).await.unwrap();
        let confirmed = plant("dev-a", "Confirmed");
        repo.upsert_from_cloud(confirmed.clone()).await.unwrap();
        let kept = plant("dev-a", "Kept");
        repo.upsert_from_cloud(kept.clone()).await.unwrap();

        let cloud_ids = HashSet::from([kept.envelope.id.clone()]);
        assert_eq!(repo.reconcile(&cloud_ids).await.unwrap(), 1);
        assert_eq!(repo.reconcile(&cloud_ids).await.unwrap(), 0);

        let pending = repo.get(&pending.envelope.id).await.unwrap().unwrap();
        assert!(!pending.envelope.deleted);
        assert!(!pending.envelope.synced);

        let confirmed = repo.get(&confirmed.envelope.id).await.unwrap().unwrap();
        assert!(confirmed.envelope.deleted);
        assert!(confirmed.envelope.synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_payload_update_requires_payload_column() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::<Plant>::new(db.connection());

        let error = repo
            .mark_synced_with_payload("id", "now", "data")
            .await
            .unwrap_err();
        assert!(matches!(error, Error::InvalidInput(_)));
    }
}
