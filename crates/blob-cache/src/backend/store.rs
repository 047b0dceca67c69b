//! Backend over the platform's named cache stores

use super::CacheBackend;
use crate::error::{CacheError, Result};
use crate::namespace::Namespace;
use crate::storage::{CacheStorage, NamedStore};
use crate::types::CacheEntry;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// One named store per namespace, opened from a `CacheStorage`
pub struct StoreBackend {
    namespace: Namespace,
    store: Arc<dyn NamedStore>,
}

impl StoreBackend {
    /// Open (or create) the store for `namespace`
    pub async fn open(storage: &dyn CacheStorage, namespace: Namespace) -> Result<Self> {
        let store = storage
            .open(namespace.as_str())
            .await
            .map_err(|e| match e {
                CacheError::BackendUnavailable(_) => e,
                other => CacheError::BackendUnavailable(other.to_string()),
            })?;

        Ok(Self { namespace, store })
    }
}

#[async_trait]
impl CacheBackend for StoreBackend {
    fn namespace(&self) -> Namespace {
        self.namespace
    }

    async fn match_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.store.get(key).await
    }

    async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        self.store.put(key, entry).await?;
        debug!(namespace = %self.namespace, key, size = entry.size(), "Stored entry");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.store.delete(key).await
    }
}
