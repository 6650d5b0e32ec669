//! In-process store.
//!
//! Keeps entries in a map behind a lock. Reachability can be switched off to
//! exercise the fail-open paths: `set_available(false)` flips the flag the
//! coordinator reads, `set_reachable(false)` makes every command fail the way
//! a dropped connection would.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{CacheEntryStore, StoreHealth};
use crate::Error;
use crate::entry::{CacheEntry, EntryPatch};

#[derive(Debug)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    health: StoreHealth,
    reachable: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            health: StoreHealth::new("memory", true),
            reachable: AtomicBool::new(true),
        }
    }

    /// Seed an entry directly, bypassing merge semantics.
    pub fn insert(&self, key: impl Into<String>, entry: CacheEntry) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key.into(), entry);
        }
    }

    /// Snapshot of an entry without going through the trait.
    pub fn peek(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().ok()?.get(key).cloned()
    }

    pub fn set_available(&self, up: bool) {
        if up { self.health.mark_up() } else { self.health.mark_down("marked unavailable") }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Release);
    }

    fn check_reachable(&self) -> Result<(), Error> {
        if self.reachable.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::StoreUnavailable("memory store unreachable".into()))
        }
    }
}

#[async_trait::async_trait]
impl CacheEntryStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        self.check_reachable()?;
        let entries = self.entries.read().map_err(|e| Error::ReadFailed(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    async fn merge_set(&self, key: &str, patch: &EntryPatch) -> Result<(), Error> {
        self.check_reachable()?;
        let mut entries = self.entries.write().map_err(|e| Error::WriteFailed(e.to_string()))?;
        entries.entry(key.to_string()).or_default().merge(patch);
        Ok(())
    }

    fn available(&self) -> bool {
        self.health.is_up()
    }

    async fn ping(&self) -> Result<(), Error> {
        match self.check_reachable() {
            Ok(()) => {
                self.health.mark_up();
                Ok(())
            }
            Err(e) => {
                self.health.observe(&e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = MemoryStore::new();
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_merge_creates_and_merges() {
        let store = MemoryStore::new();
        store.merge_set("page", &EntryPatch::built(5, "<html/>")).await.unwrap();
        store.merge_set("page", &EntryPatch::building(8)).await.unwrap();

        let entry = store.get("page").await.unwrap().unwrap();
        assert_eq!(entry.html.as_deref(), Some("<html/>"));
        assert_eq!(entry.created_at(), Some(5));
        assert_eq!(entry.building_since(), Some(8));
    }

    #[tokio::test]
    async fn test_unreachable_fails_commands() {
        let store = MemoryStore::new();
        store.set_reachable(false);
        assert!(store.get("page").await.is_err());
        assert!(store.merge_set("page", &EntryPatch::building(1)).await.is_err());
        assert!(store.ping().await.is_err());
        assert!(!store.available());
    }
}
