//! Schema migrations for the SQLite store.
//!
//! A `_migrations` table records the highest applied version; each pending
//! SQL batch is applied in order on open.

use tokio_rusqlite::{Connection, params};

use crate::Error;

/// (version, SQL) in application order.
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../../migrations/001_cache_entries.sql"))];

/// Apply every migration newer than the recorded version.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for (version, sql) in MIGRATIONS {
            if *version <= current {
                continue;
            }
            conn.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("version {version}: {e}")))?;
            conn.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            tracing::debug!(version, "applied cache store migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}
