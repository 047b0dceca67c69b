//! Namespaced blob cache
//!
//! Stores byte payloads under caller-chosen keys within a fixed set of
//! namespaces. Each open picks one of two backends: an in-process named
//! store with a byte quota, or a directory tree on disk when running inside
//! the desktop shell. [`CachedCompute`] wraps any async producer into a
//! cached, best-effort operation.

pub mod backend;
mod compute;
mod config;
mod environment;
mod error;
mod factory;
mod namespace;
pub mod storage;
mod types;

pub use backend::{BackendKind, CacheBackend, CacheHandle};
pub use compute::{CachedCompute, CachedEntry};
pub use config::{CacheConfig, CACHE_DIR_VAR, DESKTOP_SHELL_VAR, QUOTA_VAR};
pub use environment::{EnvFlagEnvironment, FixedEnvironment, RuntimeEnvironment};
pub use error::{CacheError, Result};
pub use factory::CacheFactory;
pub use namespace::Namespace;
pub use types::{CacheEntry, CacheOutcome, CacheStats, ClearReport, EntryMetadata};
