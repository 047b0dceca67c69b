//! Compute-if-absent over a namespace cache
//!
//! A hit returns the stored payload without running the producer. A miss
//! runs the producer and stores its result; a failed store is logged and
//! the fresh payload is returned anyway. Concurrent misses on the same
//! namespace and key share one producer run.

use crate::error::{CacheError, Result};
use crate::factory::CacheFactory;
use crate::namespace::Namespace;
use crate::types::{CacheEntry, CacheOutcome, CacheStats};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

type FlightKey = (Namespace, String);
type Flight = Shared<BoxFuture<'static, Result<CachedEntry>>>;
type InFlight = Arc<Mutex<HashMap<FlightKey, Flight>>>;

/// An entry returned by the helper, with how it was obtained
#[derive(Debug, Clone)]
pub struct CachedEntry {
    pub entry: CacheEntry,
    pub outcome: CacheOutcome,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    stored: AtomicU64,
    store_failures: AtomicU64,
    coalesced: AtomicU64,
}

/// Cached-compute helper bound to a factory
#[derive(Clone)]
pub struct CachedCompute {
    factory: CacheFactory,
    in_flight: InFlight,
    counters: Arc<Counters>,
}

impl CachedCompute {
    pub fn new(factory: CacheFactory) -> Self {
        Self {
            factory,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn factory(&self) -> &CacheFactory {
        &self.factory
    }

    /// Return the cached payload for `key`, or run `compute`, store, and return its payload
    pub async fn cached<F, Fut, T, E>(&self, namespace: Namespace, key: &str, compute: F) -> Result<Vec<u8>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Into<CacheEntry> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let cached = self.cached_entry(namespace, key, compute).await?;
        Ok(cached.entry.into_body())
    }

    /// Like [`cached`](Self::cached), keeping the entry's metadata and the outcome
    pub async fn cached_entry<F, Fut, T, E>(
        &self,
        namespace: Namespace,
        key: &str,
        compute: F,
    ) -> Result<CachedEntry>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = std::result::Result<T, E>> + Send + 'static,
        T: Into<CacheEntry> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let flight_key = (namespace, key.to_string());

        let flight = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match in_flight.get(&flight_key) {
                Some(existing) => {
                    self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                    debug!(namespace = %namespace, key, "Joining in-flight lookup");
                    existing.clone()
                }
                None => {
                    let producer = async move {
                        let value = AssertUnwindSafe(async move { compute().await })
                            .catch_unwind()
                            .await
                            .map_err(|panic| CacheError::Compute(panic_message(panic.as_ref())))?
                            .map_err(CacheError::compute)?;
                        Ok::<CacheEntry, CacheError>(value.into())
                    };
                    let flight = self
                        .clone()
                        .resolve(flight_key.clone(), producer)
                        .boxed()
                        .shared();
                    in_flight.insert(flight_key, flight.clone());
                    flight
                }
            }
        };

        flight.await
    }

    /// Look up, compute on miss, store best-effort. Runs once per in-flight key.
    async fn resolve<P>(self, flight_key: FlightKey, producer: P) -> Result<CachedEntry>
    where
        P: Future<Output = Result<CacheEntry>> + Send,
    {
        let _landing = FlightLanding {
            in_flight: self.in_flight.clone(),
            key: flight_key.clone(),
        };
        self.lookup_or_compute(&flight_key, producer).await
    }

    async fn lookup_or_compute<P>(&self, flight_key: &FlightKey, producer: P) -> Result<CachedEntry>
    where
        P: Future<Output = Result<CacheEntry>>,
    {
        let (namespace, key) = (flight_key.0, flight_key.1.as_str());
        let cache = self.factory.open_cache(namespace).await?;

        match cache.match_entry(key).await {
            Ok(Some(entry)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                debug!(namespace = %namespace, key, backend = %cache.kind(), "Cache hit");
                return Ok(CachedEntry {
                    entry,
                    outcome: CacheOutcome::Hit,
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!(namespace = %namespace, key, error = %e, "Cache lookup failed, computing");
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        debug!(namespace = %namespace, key, backend = %cache.kind(), "Cache miss");

        let entry = producer.await?;

        let outcome = match cache.put(key, &entry).await {
            Ok(()) => {
                self.counters.stored.fetch_add(1, Ordering::Relaxed);
                CacheOutcome::Stored
            }
            Err(e) => {
                self.counters.store_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    namespace = %namespace,
                    key,
                    size = entry.size(),
                    storage_fault = e.is_storage_fault(),
                    error = %e,
                    "Failed to store computed entry"
                );
                CacheOutcome::NotStored
            }
        };

        Ok(CachedEntry { entry, outcome })
    }

    /// Current counters
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            stored: self.counters.stored.load(Ordering::Relaxed),
            store_failures: self.counters.store_failures.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
        }
    }
}

/// Removes a flight from the in-flight map when its future finishes or is dropped,
/// including while unwinding.
struct FlightLanding {
    in_flight: InFlight,
    key: FlightKey,
}

impl Drop for FlightLanding {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("producer panicked: {}", detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::environment::FixedEnvironment;
    use crate::storage::{CacheStorage, NamedStore};
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::tempdir;

    fn helper(root: &Path, desktop_shell: bool, quota_bytes: u64) -> CachedCompute {
        let factory = CacheFactory::new(CacheConfig {
            cache_dir: root.to_path_buf(),
            quota_bytes,
        })
        .with_environment(Arc::new(FixedEnvironment(desktop_shell)));
        CachedCompute::new(factory)
    }

    /// A producer that counts its invocations
    fn counting(
        calls: &Arc<AtomicUsize>,
        body: &'static [u8],
    ) -> impl FnOnce() -> BoxFuture<'static, std::result::Result<Vec<u8>, String>> {
        let calls = calls.clone();
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(body.to_vec())
            }
            .boxed()
        }
    }

    /// Storage whose puts always fail
    struct ReadOnlyStorage;

    struct ReadOnlyStore;

    #[async_trait]
    impl NamedStore for ReadOnlyStore {
        async fn get(&self, _key: &str) -> Result<Option<CacheEntry>> {
            Ok(None)
        }

        async fn put(&self, _key: &str, entry: &CacheEntry) -> Result<()> {
            Err(CacheError::QuotaExceeded {
                needed: entry.size(),
                available: 0,
            })
        }

        async fn delete(&self, _key: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[async_trait]
    impl CacheStorage for ReadOnlyStorage {
        async fn open(&self, _name: &str) -> Result<Arc<dyn NamedStore>> {
            Ok(Arc::new(ReadOnlyStore))
        }

        async fn delete(&self, _name: &str) -> Result<bool> {
            Ok(false)
        }

        async fn names(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_miss_computes_once_then_hits() {
        for desktop_shell in [false, true] {
            let dir = tempdir().unwrap();
            let helper = helper(dir.path(), desktop_shell, 1024 * 1024);
            let first_calls = Arc::new(AtomicUsize::new(0));
            let second_calls = Arc::new(AtomicUsize::new(0));

            let first = helper
                .cached(Namespace::Files, "doc", counting(&first_calls, b"first"))
                .await
                .unwrap();
            assert_eq!(first, b"first");
            assert_eq!(first_calls.load(Ordering::SeqCst), 1);

            let second = helper
                .cached(Namespace::Files, "doc", counting(&second_calls, b"second"))
                .await
                .unwrap();
            assert_eq!(second, b"first");
            assert_eq!(second_calls.load(Ordering::SeqCst), 0);

            let stats = helper.stats();
            assert_eq!(stats.misses, 1);
            assert_eq!(stats.hits, 1);
            assert_eq!(stats.stored, 1);
        }
    }

    #[tokio::test]
    async fn test_thumbnail_scenario() {
        for desktop_shell in [false, true] {
            let dir = tempdir().unwrap();
            let helper = helper(dir.path(), desktop_shell, 1024 * 1024);
            let fetched: Vec<u8> = (0..512u32).map(|i| (i % 251) as u8).collect();
            let expected = fetched.clone();

            let cached = helper
                .cached_entry(Namespace::Thumbnails, "img123", move || async move {
                    Ok::<_, String>(CacheEntry::new(fetched, "image/jpeg"))
                })
                .await
                .unwrap();
            assert_eq!(cached.outcome, CacheOutcome::Stored);

            let cache = helper.factory().open_cache(Namespace::Thumbnails).await.unwrap();
            let entry = cache.match_entry("img123").await.unwrap().unwrap();
            assert_eq!(entry.body.len(), 512);
            assert_eq!(entry.body, expected);
            assert_eq!(entry.content_type, "image/jpeg");
        }
    }

    #[tokio::test]
    async fn test_failed_put_still_returns_payload() {
        let dir = tempdir().unwrap();
        let factory = CacheFactory::new(CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            quota_bytes: 1024,
        })
        .with_environment(Arc::new(FixedEnvironment(false)))
        .with_storage(Arc::new(ReadOnlyStorage));
        let helper = CachedCompute::new(factory);

        let cached = helper
            .cached_entry(Namespace::Files, "doc", || async {
                Ok::<_, String>(b"fresh".to_vec())
            })
            .await
            .unwrap();
        assert_eq!(cached.entry.body, b"fresh");
        assert_eq!(cached.outcome, CacheOutcome::NotStored);
        assert_eq!(helper.stats().store_failures, 1);
    }

    #[tokio::test]
    async fn test_quota_exceeded_is_not_fatal() {
        let dir = tempdir().unwrap();
        let helper = helper(dir.path(), false, 4);

        let body = helper
            .cached(Namespace::Files, "big", || async {
                Ok::<_, String>(vec![7u8; 64])
            })
            .await
            .unwrap();
        assert_eq!(body.len(), 64);

        let cache = helper.factory().open_cache(Namespace::Files).await.unwrap();
        assert!(cache.get("big").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_compute_error_propagates_and_stores_nothing() {
        let dir = tempdir().unwrap();
        let helper = helper(dir.path(), false, 1024);

        let err = helper
            .cached(Namespace::Files, "doc", || async {
                Err::<Vec<u8>, _>("upstream returned 503")
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Compute(msg) if msg.contains("503")));

        let cache = helper.factory().open_cache(Namespace::Files).await.unwrap();
        assert!(cache.get("doc").await.unwrap().is_none());

        // A later call is not stuck on the failed flight
        let body = helper
            .cached(Namespace::Files, "doc", || async { Ok::<_, String>(b"ok".to_vec()) })
            .await
            .unwrap();
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn test_panicking_producer_does_not_wedge_key() {
        let dir = tempdir().unwrap();
        let helper = helper(dir.path(), false, 1024);
        let explode = true;

        let err = helper
            .cached(Namespace::Files, "doc", move || async move {
                if explode {
                    panic!("decoder blew up");
                }
                Ok::<_, String>(b"never".to_vec())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::Compute(msg) if msg.contains("decoder blew up")));

        let body = helper
            .cached(Namespace::Files, "doc", || async { Ok::<_, String>(b"ok".to_vec()) })
            .await
            .unwrap();
        assert_eq!(body, b"ok");
        assert_eq!(helper.stats().coalesced, 0);
    }

    #[tokio::test]
    async fn test_waiters_share_producer_panic_as_error() {
        let dir = tempdir().unwrap();
        let helper = helper(dir.path(), false, 1024);
        let explode = true;

        let leader = {
            let helper = helper.clone();
            tokio::spawn(async move {
                helper
                    .cached(Namespace::Thumbnails, "img", move || async move {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        if explode {
                            panic!("thumbnailer crashed");
                        }
                        Ok::<_, String>(Vec::new())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let follower = helper
            .cached(Namespace::Thumbnails, "img", || async { Ok::<_, String>(b"unused".to_vec()) })
            .await;

        assert!(matches!(follower, Err(CacheError::Compute(_))));
        assert!(matches!(leader.await.unwrap(), Err(CacheError::Compute(_))));
        assert_eq!(helper.stats().coalesced, 1);
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_compute() {
        let dir = tempdir().unwrap();
        let helper = helper(dir.path(), false, 1024);
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let helper = helper.clone();
                let calls = calls.clone();
                tokio::spawn(async move {
                    helper
                        .cached(Namespace::FaceCrops, "face1", move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, String>(b"crop".to_vec())
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), b"crop");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = helper.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.coalesced, 7);
    }

    #[tokio::test]
    async fn test_same_key_in_different_namespaces() {
        let dir = tempdir().unwrap();
        let helper = helper(dir.path(), true, 1024);

        helper
            .cached(Namespace::Thumbnails, "img1", || async { Ok::<_, String>(b"thumb".to_vec()) })
            .await
            .unwrap();
        let crop = helper
            .cached(Namespace::FaceCrops, "img1", || async { Ok::<_, String>(b"crop".to_vec()) })
            .await
            .unwrap();

        assert_eq!(crop, b"crop");
        assert_eq!(helper.stats().misses, 2);
    }

    #[tokio::test]
    async fn test_clear_forces_recompute() {
        let dir = tempdir().unwrap();
        let helper = helper(dir.path(), true, 1024);
        let calls = Arc::new(AtomicUsize::new(0));

        helper
            .cached(Namespace::Files, "doc", counting(&calls, b"v"))
            .await
            .unwrap();
        helper.factory().clear_caches().await.unwrap();
        helper
            .cached(Namespace::Files, "doc", counting(&calls, b"v"))
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
