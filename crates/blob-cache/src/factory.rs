//! Backend selection, cache opening and clearing

use crate::backend::{BackendKind, CacheHandle, DirectoryBackend, StoreBackend};
use crate::config::CacheConfig;
use crate::environment::{EnvFlagEnvironment, RuntimeEnvironment};
use crate::error::Result;
use crate::namespace::Namespace;
use crate::storage::{CacheStorage, MemoryCacheStorage};
use crate::types::ClearReport;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Opens namespace caches on whichever backend the runtime calls for.
///
/// Cloning shares the same storage and environment.
#[derive(Clone)]
pub struct CacheFactory {
    config: Arc<CacheConfig>,
    environment: Arc<dyn RuntimeEnvironment>,
    storage: Arc<dyn CacheStorage>,
}

impl CacheFactory {
    /// Factory with an in-process named store and an environment-variable shell check
    pub fn new(config: CacheConfig) -> Self {
        let storage = Arc::new(MemoryCacheStorage::new(config.quota_bytes));
        Self {
            config: Arc::new(config),
            environment: Arc::new(EnvFlagEnvironment::default()),
            storage,
        }
    }

    pub fn with_environment(mut self, environment: Arc<dyn RuntimeEnvironment>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn CacheStorage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The backend an open would use right now
    pub fn backend_kind(&self) -> BackendKind {
        if self.environment.is_desktop_shell() {
            BackendKind::Directory
        } else {
            BackendKind::NamedStore
        }
    }

    /// Open the cache for `namespace`. The backend is chosen afresh on every call.
    pub async fn open_cache(&self, namespace: Namespace) -> Result<CacheHandle> {
        let kind = self.backend_kind();
        let handle = match kind {
            BackendKind::Directory => {
                let backend = DirectoryBackend::open(&self.config.cache_dir, namespace).await?;
                CacheHandle::new(Arc::new(backend), kind)
            }
            BackendKind::NamedStore => {
                let backend = StoreBackend::open(self.storage.as_ref(), namespace).await?;
                CacheHandle::new(Arc::new(backend), kind)
            }
        };
        Ok(handle)
    }

    /// Remove every namespace's data from the active backend.
    ///
    /// The named store deletes each namespace independently and reports
    /// failures without rolling back the others. The directory backend
    /// removes the whole root in one step and propagates any failure.
    pub async fn clear_caches(&self) -> Result<ClearReport> {
        let mut report = ClearReport::default();

        match self.backend_kind() {
            BackendKind::NamedStore => {
                let storage = self.storage.as_ref();
                match storage.names().await {
                    Ok(names) => debug!(stores = ?names, "Deleting named stores"),
                    Err(e) => warn!(error = %e, "Failed to list named stores"),
                }

                let results = join_all(Namespace::ALL.into_iter().map(|ns| async move {
                    (ns, storage.delete(ns.as_str()).await)
                }))
                .await;

                for (ns, result) in results {
                    match result {
                        Ok(_) => report.cleared.push(ns),
                        Err(e) => {
                            warn!(namespace = %ns, error = %e, "Failed to delete named store");
                            report.failed.push((ns, e));
                        }
                    }
                }
            }
            BackendKind::Directory => {
                DirectoryBackend::clear_root(&self.config.cache_dir).await?;
                report.cleared.extend(Namespace::ALL);
            }
        }

        info!(
            cleared = report.cleared.len(),
            failed = report.failed.len(),
            "Cleared caches"
        );
        Ok(report)
    }
}
