//! Platform cache-storage capability and its in-process implementation
//!
//! This is the storage the named-store backend sits on: a registry of named
//! stores, each holding keyed entries, with one byte quota shared by all of
//! them.

use crate::error::{CacheError, Result};
use crate::types::CacheEntry;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;
use tracing::debug;

/// Open-or-create and delete named stores
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the named store, creating it if it does not exist
    async fn open(&self, name: &str) -> Result<Arc<dyn NamedStore>>;

    /// Delete a whole named store. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of the stores that currently exist
    async fn names(&self) -> Result<Vec<String>>;
}

/// Keyed entries within one named store
#[async_trait]
pub trait NamedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Create or fully replace the entry for `key`
    async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Bytes in use against the shared quota
#[derive(Debug)]
struct Usage {
    used: Mutex<u64>,
    quota: u64,
}

impl Usage {
    /// Swap `old_size` bytes for `new_size` bytes, failing if that would exceed the quota
    fn reserve(&self, old_size: u64, new_size: u64) -> Result<()> {
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        let base = used.saturating_sub(old_size);
        let available = self.quota.saturating_sub(base);
        if new_size > available {
            return Err(CacheError::QuotaExceeded {
                needed: new_size,
                available,
            });
        }
        *used = base + new_size;
        Ok(())
    }

    fn release(&self, size: u64) {
        let mut used = self.used.lock().unwrap_or_else(PoisonError::into_inner);
        *used = used.saturating_sub(size);
    }

    fn used(&self) -> u64 {
        *self.used.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-process cache storage with a byte quota
pub struct MemoryCacheStorage {
    stores: RwLock<HashMap<String, Arc<MemoryStore>>>,
    usage: Arc<Usage>,
}

impl MemoryCacheStorage {
    pub fn new(quota_bytes: u64) -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            usage: Arc::new(Usage {
                used: Mutex::new(0),
                quota: quota_bytes,
            }),
        }
    }

    /// Bytes currently stored across every named store
    pub fn used_bytes(&self) -> u64 {
        self.usage.used()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn NamedStore>> {
        if let Some(store) = self.stores.read().await.get(name).cloned() {
            return Ok(store as Arc<dyn NamedStore>);
        }

        let mut stores = self.stores.write().await;
        let store: Arc<dyn NamedStore> = stores
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(store = name, "Created named store");
                Arc::new(MemoryStore::new(self.usage.clone()))
            })
            .clone();
        Ok(store)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let store = self.stores.write().await.remove(name);
        match store {
            Some(store) => {
                store.detach().await;
                debug!(store = name, "Deleted named store");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.stores.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// One named store of the in-process storage
struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    usage: Arc<Usage>,
    /// Set once the store is deleted from its registry
    detached: AtomicBool,
}

impl MemoryStore {
    fn new(usage: Arc<Usage>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            usage,
            detached: AtomicBool::new(false),
        }
    }

    /// Drop every entry and return their bytes to the quota
    async fn detach(&self) {
        let mut entries = self.entries.write().await;
        self.detached.store(true, Ordering::Release);
        let freed: u64 = entries.values().map(CacheEntry::size).sum();
        entries.clear();
        self.usage.release(freed);
    }
}

#[async_trait]
impl NamedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let mut entries = self.entries.write().await;

        // A handle that outlived its store must not consume quota
        if self.detached.load(Ordering::Acquire) {
            return Err(CacheError::BackendUnavailable(
                "named store was deleted".to_string(),
            ));
        }

        let old_size = entries.get(key).map(CacheEntry::size).unwrap_or(0);
        self.usage.reserve(old_size, entry.size())?;
        entries.insert(key.to_string(), entry.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed = self.entries.write().await.remove(key);
        match removed {
            Some(entry) => {
                self.usage.release(entry.size());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
