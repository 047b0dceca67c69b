//! Cache types

use crate::namespace::Namespace;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A stored value: payload bytes plus the metadata kept alongside them
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub body: Vec<u8>,
    pub content_type: String,
    /// Extra response-style headers carried with the payload
    pub headers: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(body: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            body,
            content_type: content_type.into(),
            headers: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Payload length in bytes
    pub fn size(&self) -> u64 {
        self.body.len() as u64
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Metadata half of the entry, as persisted next to the payload on disk
    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            content_type: self.content_type.clone(),
            headers: self.headers.clone(),
            size: self.size(),
            created_at: self.created_at,
        }
    }

    /// Reassemble an entry from a payload and its persisted metadata
    pub fn from_parts(body: Vec<u8>, metadata: EntryMetadata) -> Self {
        Self {
            body,
            content_type: metadata.content_type,
            headers: metadata.headers,
            created_at: metadata.created_at,
        }
    }
}

impl From<Vec<u8>> for CacheEntry {
    fn from(body: Vec<u8>) -> Self {
        CacheEntry::new(body, DEFAULT_CONTENT_TYPE)
    }
}

impl From<&[u8]> for CacheEntry {
    fn from(body: &[u8]) -> Self {
        CacheEntry::from(body.to_vec())
    }
}

/// Metadata for a cached entry, stored as the JSON header of a directory-backend entry file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub content_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// How a cached-compute call was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Served from the cache; the producer did not run
    Hit,
    /// Computed and stored
    Stored,
    /// Computed, but the store rejected it
    NotStored,
}

impl CacheOutcome {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheOutcome::Hit)
    }
}

/// Statistics about cached-compute traffic
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub stored: u64,
    pub store_failures: u64,
    /// Callers that joined an in-flight computation instead of starting one
    pub coalesced: u64,
}

/// Result of clearing every namespace
#[derive(Debug, Default)]
pub struct ClearReport {
    /// Namespaces whose storage was removed (or was already absent)
    pub cleared: Vec<Namespace>,
    /// Namespaces whose removal failed; only the named-store backend reports these
    pub failed: Vec<(Namespace, crate::error::CacheError)>,
}

impl ClearReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
