//! Filesystem backend: `<root>/<namespace>/<sha256(key)>.entry`
//!
//! Each entry is one file: a 4-byte big-endian header length, the JSON
//! metadata header, then the payload. The file is written under a temporary
//! name and committed with a single rename, so a reader sees exactly one
//! writer's payload and metadata, never a mix and never a partial file.

use super::CacheBackend;
use crate::error::{CacheError, Result};
use crate::namespace::Namespace;
use crate::types::{CacheEntry, EntryMetadata};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, info, warn};

const ENTRY_EXT: &str = "entry";
const HEADER_LEN_BYTES: usize = 4;

/// Distinguishes temporary files of concurrent writers within this process
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Directory-backed storage for one namespace
pub struct DirectoryBackend {
    namespace: Namespace,
    dir: PathBuf,
}

impl DirectoryBackend {
    /// Open the namespace directory under `root`, creating it if missing
    pub async fn open(root: &Path, namespace: Namespace) -> Result<Self> {
        let dir = root.join(namespace.as_str());
        ensure_dir(&dir)
            .await
            .map_err(|e| CacheError::BackendUnavailable(format!("{}: {}", dir.display(), e)))?;

        debug!(namespace = %namespace, dir = ?dir, "Opened directory cache");
        Ok(Self { namespace, dir })
    }

    /// Remove the whole cache tree under `root`. A missing root counts as cleared.
    pub async fn clear_root(root: &Path) -> Result<bool> {
        match fs::remove_dir_all(root).await {
            Ok(()) => {
                info!(root = ?root, "Removed cache directory");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// File stem for a key. Hashing keeps arbitrary keys filesystem-safe.
    pub fn file_stem(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn entry_path(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", stem, ENTRY_EXT))
    }

    fn tmp_path(&self, stem: &str) -> PathBuf {
        let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!(".{}.{}.{}.tmp", stem, std::process::id(), n))
    }
}

#[async_trait]
impl CacheBackend for DirectoryBackend {
    fn namespace(&self) -> Namespace {
        self.namespace
    }

    async fn match_entry(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(&Self::file_stem(key));

        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match decode_entry(raw) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(namespace = %self.namespace, key, error = %e, "Corrupt cache entry, removing");
                remove_if_present(&path).await?;
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        // The tree may have been cleared since this handle was opened
        ensure_dir(&self.dir).await?;

        let stem = Self::file_stem(key);
        let encoded = encode_entry(entry)?;
        let tmp = self.tmp_path(&stem);

        let written = async {
            fs::write(&tmp, &encoded).await?;
            fs::rename(&tmp, self.entry_path(&stem)).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(namespace = %self.namespace, key, size = entry.size(), "Stored entry");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        remove_if_present(&self.entry_path(&Self::file_stem(key))).await
    }
}

/// Header length, JSON metadata header, payload
fn encode_entry(entry: &CacheEntry) -> Result<Vec<u8>> {
    let header = serde_json::to_vec(&entry.metadata())?;
    let header_len = u32::try_from(header.len())
        .map_err(|_| CacheError::Metadata("metadata header too large".to_string()))?;

    let mut encoded = Vec::with_capacity(HEADER_LEN_BYTES + header.len() + entry.body.len());
    encoded.extend_from_slice(&header_len.to_be_bytes());
    encoded.extend_from_slice(&header);
    encoded.extend_from_slice(&entry.body);
    Ok(encoded)
}

fn decode_entry(mut raw: Vec<u8>) -> Result<CacheEntry> {
    let prefix: [u8; HEADER_LEN_BYTES] = raw
        .get(..HEADER_LEN_BYTES)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| CacheError::Metadata("truncated header length".to_string()))?;
    let header_end = HEADER_LEN_BYTES + u32::from_be_bytes(prefix) as usize;

    let header = raw
        .get(HEADER_LEN_BYTES..header_end)
        .ok_or_else(|| CacheError::Metadata("truncated metadata header".to_string()))?;
    let metadata: EntryMetadata = serde_json::from_slice(header)?;

    let body = raw.split_off(header_end);
    if body.len() as u64 != metadata.size {
        return Err(CacheError::Metadata(format!(
            "payload is {} bytes, metadata says {}",
            body.len(),
            metadata.size
        )));
    }

    Ok(CacheEntry::from_parts(body, metadata))
}

/// Create a directory and its parents if missing; never touches existing contents
pub async fn ensure_dir(path: &Path) -> io::Result<()> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "path exists and is not a directory",
        )),
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir_all(path).await,
        Err(e) => Err(e),
    }
}

async fn remove_if_present(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}
