//! Schema creation and clean-slate migrations

use crate::error::{Error, Result};
use libsql::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 5;

/// Entity tables dropped and recreated by [`migrate`].
const ENTITY_TABLES: [&str; 5] = [
    "log_entries",
    "diagnosis_records",
    "harvest_records",
    "plants",
    "alerts",
];

const CREATE_ENTITY_TABLES: [&str; 5] = [
    "CREATE TABLE IF NOT EXISTS log_entries (
        id TEXT PRIMARY KEY NOT NULL,
        device_id TEXT NOT NULL,
        date TEXT NOT NULL,
        block TEXT NOT NULL,
        activity TEXT NOT NULL,
        notes TEXT DEFAULT '',
        photo TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        synced INTEGER NOT NULL DEFAULT 0,
        deleted INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS diagnosis_records (
        id TEXT PRIMARY KEY NOT NULL,
        device_id TEXT NOT NULL,
        date TEXT NOT NULL,
        selected_symptoms TEXT NOT NULL DEFAULT '[]',
        risk_level TEXT NOT NULL,
        result_title TEXT NOT NULL DEFAULT '',
        result_description TEXT NOT NULL DEFAULT '',
        recommendations TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        synced INTEGER NOT NULL DEFAULT 0,
        deleted INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS harvest_records (
        id TEXT PRIMARY KEY NOT NULL,
        device_id TEXT NOT NULL,
        date TEXT NOT NULL,
        block TEXT NOT NULL,
        quantity REAL NOT NULL,
        quality TEXT NOT NULL DEFAULT 'Grade B',
        notes TEXT DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        synced INTEGER NOT NULL DEFAULT 0,
        deleted INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS plants (
        id TEXT PRIMARY KEY NOT NULL,
        device_id TEXT NOT NULL,
        block TEXT NOT NULL,
        name TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'healthy',
        planted_date TEXT,
        notes TEXT DEFAULT '',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        synced INTEGER NOT NULL DEFAULT 0,
        deleted INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE IF NOT EXISTS alerts (
        id TEXT PRIMARY KEY NOT NULL,
        device_id TEXT NOT NULL,
        message TEXT NOT NULL,
        severity TEXT NOT NULL,
        block TEXT,
        is_read INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        synced INTEGER NOT NULL DEFAULT 0,
        deleted INTEGER NOT NULL DEFAULT 0
    )",
];

const CREATE_SUPPORT_TABLES: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS app_config (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS sync_meta (
        table_name TEXT PRIMARY KEY NOT NULL,
        last_synced_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS db_version (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        version INTEGER NOT NULL
    )",
];

const CREATE_INDEXES: [&str; 9] = [
    "CREATE INDEX IF NOT EXISTS idx_log_entries_device_date ON log_entries(device_id, date)",
    "CREATE INDEX IF NOT EXISTS idx_diagnosis_records_device_date ON diagnosis_records(device_id, date)",
    "CREATE INDEX IF NOT EXISTS idx_harvest_records_device_date ON harvest_records(device_id, date)",
    "CREATE INDEX IF NOT EXISTS idx_plants_block_status ON plants(block, status)",
    "CREATE INDEX IF NOT EXISTS idx_log_entries_dirty ON log_entries(synced, deleted)",
    "CREATE INDEX IF NOT EXISTS idx_diagnosis_records_dirty ON diagnosis_records(synced, deleted)",
    "CREATE INDEX IF NOT EXISTS idx_harvest_records_dirty ON harvest_records(synced, deleted)",
    "CREATE INDEX IF NOT EXISTS idx_plants_dirty ON plants(synced, deleted)",
    "CREATE INDEX IF NOT EXISTS idx_alerts_dirty ON alerts(synced, deleted)",
];

/// Create all tables and indexes, migrating when the stored version is behind.
///
/// Safe to call on every start.
pub async fn initialize(conn: &Connection) -> Result<()> {
    run_in_transaction(
        conn,
        CREATE_SUPPORT_TABLES
            .iter()
            .chain(CREATE_ENTITY_TABLES.iter())
            .copied(),
    )
    .await?;

    let version = get_version(conn).await?;
    if version < SCHEMA_VERSION {
        migrate(conn, version, SCHEMA_VERSION).await?;
    } else if version > SCHEMA_VERSION {
        return Err(Error::Database(format!(
            "Local store schema version {version} is newer than supported version {SCHEMA_VERSION}"
        )));
    }

    run_in_transaction(conn, CREATE_INDEXES.iter().copied()).await?;
    Ok(())
}

/// Drop and recreate every entity table and forget sync metadata.
///
/// Pending local changes are lost; entities come back from the remote store
/// on the next pull. `app_config` is kept so the device id survives.
pub async fn migrate(conn: &Connection, from: i32, to: i32) -> Result<()> {
    if from == to {
        return Ok(());
    }

    let drops = ENTITY_TABLES.map(|table| format!("DROP TABLE IF EXISTS {table}"));
    let set_version =
        format!("INSERT OR REPLACE INTO db_version (id, version) VALUES (1, {to})");

    let statements = drops
        .iter()
        .map(String::as_str)
        .chain(CREATE_ENTITY_TABLES.iter().copied())
        .chain(["DELETE FROM sync_meta", set_version.as_str()]);
    run_in_transaction(conn, statements).await?;

    tracing::info!(from, to, "Migrated local store with a clean slate");
    Ok(())
}

/// Get the stored schema version, 0 when none is recorded
pub async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query("SELECT version FROM db_version WHERE id = 1", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

async fn run_in_transaction<'a>(
    conn: &Connection,
    statements: impl IntoIterator<Item = &'a str>,
) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn connect() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name=?)",
                [name],
            )
            .await
            .unwrap();
        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    async fn count(conn: &Connection, sql: &str) -> i64 {
        let mut rows = conn.query(sql, ()).await.unwrap();
        rows.next().await.unwrap().unwrap().get::<i64>(0).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_initialize_creates_schema() {
        let conn = connect().await;
        initialize(&conn).await.unwrap();

        for table in ENTITY_TABLES
            .iter()
            .chain(["app_config", "sync_meta", "db_version"].iter())
        {
            assert!(table_exists(&conn, table).await, "missing table {table}");
        }
        assert_eq!(get_version(&conn).await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_initialize_idempotent() {
        let conn = connect().await;
        initialize(&conn).await.unwrap();
        conn.execute(
            "INSERT INTO plants (id, device_id, block, name, status, created_at, updated_at)
             VALUES ('p1', 'dev', 'A1', 'Sawit 1', 'healthy', 'now', 'now')",
            (),
        )
        .await
        .unwrap();

        initialize(&conn).await.unwrap();

        assert_eq!(count(&conn, "SELECT COUNT(*) FROM plants").await, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_outdated_version_resets_entities_but_keeps_config() {
        let conn = connect().await;
        initialize(&conn).await.unwrap();
        conn.execute(
            "INSERT INTO plants (id, device_id, block, name, status, created_at, updated_at)
             VALUES ('p1', 'dev', 'A1', 'Sawit 1', 'healthy', 'now', 'now')",
            (),
        )
        .await
        .unwrap();
        conn.execute(
            "INSERT INTO app_config (key, value) VALUES ('device_id', 'dev')",
            (),
        )
        .await
        .unwrap();
        conn.execute(
            "INSERT INTO sync_meta (table_name, last_synced_at) VALUES ('plants', 'then')",
            (),
        )
        .await
        .unwrap();
        conn.execute("UPDATE db_version SET version = 4 WHERE id = 1", ())
            .await
            .unwrap();

        initialize(&conn).await.unwrap();

        assert_eq!(count(&conn, "SELECT COUNT(*) FROM plants").await, 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM sync_meta").await, 0);
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM app_config").await, 1);
        assert_eq!(get_version(&conn).await.unwrap(), SCHEMA_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_newer_version_is_refused() {
        let conn = connect().await;
        initialize(&conn).await.unwrap();
        conn.execute("UPDATE db_version SET version = 9 WHERE id = 1", ())
            .await
            .unwrap();

        let error = initialize(&conn).await.unwrap_err();
        assert!(error.to_string().contains("newer than supported"));
    }
}
