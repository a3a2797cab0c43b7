//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: incidents table with sync bookkeeping
async fn migrate_v1(conn: &Connection) -> Result<()> {
    // One statement per execute call, wrapped in a transaction
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        "CREATE TABLE IF NOT EXISTS incidents (
            local_id TEXT PRIMARY KEY,
            server_id TEXT,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            incident_type TEXT NOT NULL,
            location TEXT NOT NULL DEFAULT '',
            geolocation TEXT NOT NULL DEFAULT '',
            evidence TEXT NOT NULL DEFAULT '[]',
            district TEXT NOT NULL DEFAULT '',
            author_id TEXT NOT NULL DEFAULT '',
            sync_status TEXT NOT NULL DEFAULT 'PENDING_SYNC',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_sync_attempt INTEGER,
            sync_error TEXT
        )",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_incidents_server_id
            ON incidents(server_id) WHERE server_id IS NOT NULL",
        "CREATE INDEX IF NOT EXISTS idx_incidents_sync_status ON incidents(sync_status)",
        "CREATE INDEX IF NOT EXISTS idx_incidents_created ON incidents(created_at DESC)",
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

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

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_server_id_is_unique_when_present() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let insert = "INSERT INTO incidents (local_id, server_id, title, incident_type, created_at, updated_at)
                      VALUES (?, ?, 'title', 'type', 0, 0)";
        conn.execute(insert, libsql::params!["a", libsql::Value::Null])
            .await
            .unwrap();
        conn.execute(insert, libsql::params!["b", libsql::Value::Null])
            .await
            .unwrap();
        conn.execute(insert, libsql::params!["c", "srv-1"])
            .await
            .unwrap();
        assert!(conn
            .execute(insert, libsql::params!["d", "srv-1"])
            .await
            .is_err());
    }
}
