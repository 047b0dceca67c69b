//! Cache backends: one capability, two storage implementations

mod directory;
mod store;

pub use directory::DirectoryBackend;
pub use store::StoreBackend;

use crate::error::Result;
use crate::namespace::Namespace;
use crate::types::CacheEntry;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Keyed entry storage scoped to a single namespace.
///
/// A missing key is never an error: lookups return `None` and `delete`
/// returns `false`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn namespace(&self) -> Namespace;

    /// Look up the stored entry with its metadata
    async fn match_entry(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Look up only the payload bytes
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.match_entry(key).await?.map(CacheEntry::into_body))
    }

    /// Create or fully replace the entry for `key`
    async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()>;

    /// Remove the entry, returning whether one existed
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// Which backend implementation a handle is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    NamedStore,
    Directory,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::NamedStore => f.write_str("named-store"),
            BackendKind::Directory => f.write_str("directory"),
        }
    }
}

/// An opened, namespace-bound cache. Cheap to clone; no explicit close.
#[derive(Clone)]
pub struct CacheHandle {
    backend: Arc<dyn CacheBackend>,
    kind: BackendKind,
}

impl CacheHandle {
    pub fn new(backend: Arc<dyn CacheBackend>, kind: BackendKind) -> Self {
        Self { backend, kind }
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn namespace(&self) -> Namespace {
        self.backend.namespace()
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.backend.get(key).await
    }

    pub async fn match_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        self.backend.match_entry(key).await
    }

    pub async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        self.backend.put(key, entry).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.backend.delete(key).await
    }
}

impl fmt::Debug for CacheHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheHandle")
            .field("namespace", &self.namespace())
            .field("kind", &self.kind)
            .finish()
    }
}
