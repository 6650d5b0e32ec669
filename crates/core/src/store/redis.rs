//! Redis-backed entry store.
//!
//! Each cache key maps to a Redis hash with `html`, `created` and `building`
//! fields, so several prerender processes can share one cache. `HSET` with
//! several fields is atomic per key, which is all the merge needs.
//!
//! The connection is a [`ConnectionManager`], which reconnects on its own
//! after a drop. If the first connect fails the store starts out unavailable
//! and [`CacheEntryStore::ping`] (driven by the heartbeat) retries it.

use std::collections::HashMap;
use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use tokio::sync::RwLock;

use super::{CacheEntryStore, StoreHealth};
use crate::Error;
use crate::entry::{CacheEntry, EntryPatch};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RedisStore {
    client: redis::Client,
    conn: RwLock<Option<ConnectionManager>>,
    health: StoreHealth,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("addr", &self.client.get_connection_info().addr)
            .field("available", &self.health.is_up())
            .finish()
    }
}

impl RedisStore {
    /// Create the store and try to connect once.
    ///
    /// Only a malformed URL is an error here. An unreachable server leaves
    /// the store unavailable so requests bypass the cache.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let client = redis::Client::open(url).map_err(|e| Error::InvalidStoreUrl(format!("{url}: {e}")))?;
        let store = Self { client, conn: RwLock::new(None), health: StoreHealth::new("redis", false) };

        if let Err(e) = store.reconnect().await {
            tracing::warn!(error = %e, "redis cache store not reachable at startup, bypassing cache");
        }

        Ok(store)
    }

    async fn reconnect(&self) -> Result<ConnectionManager, Error> {
        // the heartbeat retries, so one quick attempt is enough here
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(CONNECT_TIMEOUT);

        match ConnectionManager::new_with_config(self.client.clone(), config).await {
            Ok(manager) => {
                *self.conn.write().await = Some(manager.clone());
                self.health.mark_up();
                Ok(manager)
            }
            Err(e) => {
                let err = Error::StoreUnavailable(e.to_string());
                self.health.mark_down(&err.to_string());
                Err(err)
            }
        }
    }

    async fn connection(&self) -> Result<ConnectionManager, Error> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::StoreUnavailable("redis not connected".into()))
    }

    fn track<T>(&self, result: Result<T, redis::RedisError>) -> Result<T, Error> {
        match result {
            Ok(value) => {
                self.health.mark_up();
                Ok(value)
            }
            Err(e) => {
                let err = Error::from(e);
                self.health.observe(&err);
                Err(err)
            }
        }
    }
}

#[async_trait::async_trait]
impl CacheEntryStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = self.track(conn.hgetall(key).await)?;

        // HGETALL on a missing key is an empty reply
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(CacheEntry::from_fields(fields)))
    }

    async fn merge_set(&self, key: &str, patch: &EntryPatch) -> Result<(), Error> {
        let fields = patch.fields();
        if fields.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection().await?;
        self.track(conn.hset_multiple::<_, _, _, ()>(key, fields.as_slice()).await)
    }

    fn available(&self) -> bool {
        self.health.is_up()
    }

    async fn ping(&self) -> Result<(), Error> {
        let mut conn = match self.connection().await {
            Ok(conn) => conn,
            Err(_) => self.reconnect().await?,
        };

        let reply: Result<String, redis::RedisError> = redis::cmd("PING").query_async(&mut conn).await;
        self.track(reply).map(|_| ())
    }
}
