//! Key-value config and sync metadata repository

use crate::error::Result;
use crate::models::{Collection, SyncMetadata};
use libsql::Connection;

/// Trait for local config and sync bookkeeping (async)
#[allow(async_fn_in_trait)]
pub trait ConfigRepository {
    /// Read a config value
    async fn get_config(&self, key: &str) -> Result<Option<String>>;

    /// Write a config value
    async fn set_config(&self, key: &str, value: &str) -> Result<()>;

    /// Last time a collection completed a sync cycle
    async fn last_synced_at(&self, collection: Collection) -> Result<Option<String>>;

    /// Record the completion time of a collection's sync
    async fn set_last_synced_at(&self, collection: Collection, timestamp: &str) -> Result<()>;

    /// Every recorded sync timestamp
    async fn sync_metadata(&self) -> Result<Vec<SyncMetadata>>;
}

/// libSQL implementation of `ConfigRepository`
pub struct LibSqlConfigRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlConfigRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl ConfigRepository for LibSqlConfigRepository<'_> {
    async fn get_config(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM app_config WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO app_config (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }

    async fn last_synced_at(&self, collection: Collection) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT last_synced_at FROM sync_meta WHERE table_name = ?",
                [collection.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    async fn set_last_synced_at(&self, collection: Collection, timestamp: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO sync_meta (table_name, last_synced_at) VALUES (?, ?)",
                [collection.as_str(), timestamp],
            )
            .await?;
        Ok(())
    }

    async fn sync_metadata(&self) -> Result<Vec<SyncMetadata>> {
        let mut rows = self
            .conn
            .query(
                "SELECT table_name, last_synced_at FROM sync_meta ORDER BY table_name",
                (),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(SyncMetadata {
                collection: row.get(0)?,
                last_synced_at: row.get(1)?,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_config_round_trip() {
        let db = setup().await;
        let repo = LibSqlConfigRepository::new(db.connection());

        assert_eq!(repo.get_config("device_id").await.unwrap(), None);
        repo.set_config("device_id", "dev-1").await.unwrap();
        repo.set_config("device_id", "dev-2").await.unwrap();
        assert_eq!(
            repo.get_config("device_id").await.unwrap().as_deref(),
            Some("dev-2")
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_metadata_per_collection() {
        let db = setup().await;
        let repo = LibSqlConfigRepository::new(db.connection());

        repo.set_last_synced_at(Collection::Plants, "2024-03-01T00:00:00.000Z")
            .await
            .unwrap();
        repo.set_last_synced_at(Collection::Alerts, "2024-03-02T00:00:00.000Z")
            .await
            .unwrap();

        assert_eq!(
            repo.last_synced_at(Collection::Plants)
                .await
                .unwrap()
                .as_deref(),
            Some("2024-03-01T00:00:00.000Z")
        );
        assert_eq!(repo.last_synced_at(Collection::LogEntries).await.unwrap(), None);
        let all = repo.sync_metadata().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].collection, "alerts");
    }
}
