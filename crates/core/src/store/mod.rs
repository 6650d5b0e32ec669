//! Shared key-value store holding one [`CacheEntry`] per cache key.
//!
//! The coordinator only sees the [`CacheEntryStore`] trait. Connection
//! handling, reconnects and keep-alive live inside each backend:
//!
//! - [`SqliteStore`]: single-file store through tokio-rusqlite
//! - [`RedisStore`]: one hash per key, shared by many prerender processes
//! - [`MemoryStore`]: in-process map for tests and `memory://`

pub mod health;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::Error;
use crate::entry::{CacheEntry, EntryPatch};

pub use health::StoreHealth;
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisStore;
pub use sqlite::SqliteStore;

/// Per-key record store used by the freshness coordinator.
#[async_trait::async_trait]
pub trait CacheEntryStore: Send + Sync {
    /// Read every field of the entry at `key`.
    ///
    /// Returns `Ok(None)` when the key was never written.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error>;

    /// Merge the set fields of `patch` into the entry at `key`, creating it
    /// if needed. Fields not in the patch are left alone.
    async fn merge_set(&self, key: &str, patch: &EntryPatch) -> Result<(), Error>;

    /// Whether the store is reachable right now.
    fn available(&self) -> bool;

    /// Round-trip to the store, reconnecting if the backend supports it.
    async fn ping(&self) -> Result<(), Error>;
}

/// Open the store named by `target`.
///
/// Supported forms: `redis://host:port[/db]`, `rediss://...`,
/// `sqlite://path/to/file.sqlite`, `sqlite::memory:` and `memory://`.
pub async fn open_store(target: &str) -> Result<Arc<dyn CacheEntryStore>, Error> {
    let target = target.trim();

    if target.starts_with("redis://") || target.starts_with("rediss://") {
        #[cfg(feature = "redis")]
        {
            let store = RedisStore::connect(target).await?;
            return Ok(Arc::new(store));
        }
        #[cfg(not(feature = "redis"))]
        {
            return Err(Error::InvalidStoreUrl(format!("{target}: built without the `redis` feature")));
        }
    }

    if target == "sqlite::memory:" {
        return Ok(Arc::new(SqliteStore::open_in_memory().await?));
    }

    if let Some(path) = target.strip_prefix("sqlite://") {
        if path.is_empty() {
            return Err(Error::InvalidStoreUrl("sqlite:// needs a file path".into()));
        }
        return Ok(Arc::new(SqliteStore::open(path).await?));
    }

    if target == "memory://" {
        return Ok(Arc::new(MemoryStore::new()));
    }

    Err(Error::InvalidStoreUrl(target.to_string()))
}

/// Retry delay used by the heartbeat while the store is down.
pub const RECONNECT_RETRY: Duration = Duration::from_secs(5);

/// Ping the store every `interval` to keep its connection warm. While the
/// store is unavailable it is pinged every [`RECONNECT_RETRY`] instead, so
/// requests stop bypassing the cache soon after it comes back.
pub fn spawn_heartbeat(store: Arc<dyn CacheEntryStore>, interval: Duration) -> JoinHandle<()> {
    let retry = interval.min(RECONNECT_RETRY);

    tokio::spawn(async move {
        loop {
            let delay = if store.available() { interval } else { retry };
            tokio::time::sleep(delay).await;

            match store.ping().await {
                Ok(()) => tracing::trace!("cache store heartbeat ok"),
                Err(e) => tracing::debug!(error = %e, "cache store heartbeat failed"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryPatch;

    #[tokio::test]
    async fn test_open_memory_store() {
        let store = open_store("memory://").await.unwrap();
        assert!(store.available());
        store.merge_set("k", &EntryPatch::building(1)).await.unwrap();
        assert!(store.get("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_open_sqlite_in_memory() {
        let store = open_store("sqlite::memory:").await.unwrap();
        assert!(store.available());
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_rejects_unknown_scheme() {
        assert!(matches!(open_store("mongodb://localhost").await, Err(Error::InvalidStoreUrl(_))));
        assert!(matches!(open_store("sqlite://").await, Err(Error::InvalidStoreUrl(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_restores_availability() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);
        store.set_reachable(true);

        let handle = spawn_heartbeat(store.clone(), Duration::from_secs(180));
        tokio::time::sleep(Duration::from_secs(181)).await;
        tokio::task::yield_now().await;

        assert!(store.available());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_retries_quickly_while_down() {
        let store = Arc::new(MemoryStore::new());
        store.set_available(false);

        let handle = spawn_heartbeat(store.clone(), Duration::from_secs(180));
        tokio::time::sleep(RECONNECT_RETRY + Duration::from_secs(1)).await;
        tokio::task::yield_now().await;

        assert!(store.available());
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_marks_unreachable_store_down() {
        let store = Arc::new(MemoryStore::new());
        store.set_reachable(false);

        let handle = spawn_heartbeat(store.clone(), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(11)).await;
        tokio::task::yield_now().await;

        assert!(!store.available());
        handle.abort();
    }
}
