//! SQLite-backed entry store.
//!
//! Operations run on tokio-rusqlite's background thread. Each entry is one
//! row; `merge_set` is a single UPSERT that keeps existing columns whenever
//! the patch leaves them unset, so the merge is atomic per key.

mod migrations;

use std::path::Path;

use tokio_rusqlite::{Connection, params, rusqlite};

use super::{CacheEntryStore, StoreHealth};
use crate::Error;
use crate::entry::{CacheEntry, EntryPatch};

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;
     PRAGMA busy_timeout=5000;";

/// Entry store on a local SQLite file.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    health: StoreHealth,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and bring its schema up to date.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    /// Open a private in-memory database.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| conn.execute_batch(PRAGMAS))
            .await
            .map_err(Error::Database)?;

        migrations::run(&conn).await?;

        Ok(Self { conn, health: StoreHealth::new("sqlite", true) })
    }

    fn track<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
        match &result {
            Ok(_) => self.health.mark_up(),
            Err(e) => self.health.observe(e),
        }
        result
    }
}

#[async_trait::async_trait]
impl CacheEntryStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let key = key.to_string();
        let result = self
            .conn
            .call(move |conn| -> Result<Option<CacheEntry>, Error> {
                let row = conn.query_row(
                    "SELECT html, created, building FROM cache_entries WHERE key = ?1",
                    params![key],
                    |row| Ok(CacheEntry { html: row.get(0)?, created: row.get(1)?, building: row.get(2)? }),
                );

                match row {
                    Ok(entry) => Ok(Some(entry)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(Error::ReadFailed(e.to_string())),
                }
            })
            .await
            .map_err(Error::from);

        self.track(result)
    }

    async fn merge_set(&self, key: &str, patch: &EntryPatch) -> Result<(), Error> {
        if patch.is_empty() {
            return Ok(());
        }

        let key = key.to_string();
        let html = patch.html.clone();
        let created = patch.created.map(|v| v.to_string());
        let building = patch.building.map(|v| v.to_string());

        let result = self
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO cache_entries (key, html, created, building)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(key) DO UPDATE SET
                        html = COALESCE(excluded.html, cache_entries.html),
                        created = COALESCE(excluded.created, cache_entries.created),
                        building = COALESCE(excluded.building, cache_entries.building)",
                    params![key, html, created, building],
                )
                .map_err(|e| Error::WriteFailed(e.to_string()))?;
                Ok(())
            })
            .await
            .map_err(Error::from);

        self.track(result)
    }

    fn available(&self) -> bool {
        self.health.is_up()
    }

    async fn ping(&self) -> Result<(), Error> {
        let result = self
            .conn
            .call(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)))
            .await
            .map(|_| ())
            .map_err(Error::from);

        self.track(result)
    }
}
