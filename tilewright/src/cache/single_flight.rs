//! Single-flight cache of asynchronously produced values.
//!
//! [`SingleFlightCache`] maps a key to either a finished value or the one
//! in-flight operation producing it. However many callers ask for the same
//! key while it is being built, the factory runs once and every caller gets
//! the same result (or the same error).
//!
//! # Architecture
//!
//! ```text
//! caller A ─┐                                   ┌─► ready tier (moka, LRU + TTL)
//! caller B ─┼──► get_or_create ──► in-flight ───┤
//! caller C ─┘       (DashMap)      one task     └─► disposal hook on eviction
//! ```
//!
//! The factory runs on its own task, so it completes and is transcribed into
//! the ready tier even if every waiter goes away. A failed factory is not
//! cached; the next call retries.
//!
//! # Invalidation
//!
//! [`SingleFlightCache::invalidate`] never blocks. A ready value is removed
//! and handed to the disposal hook. An in-flight operation is detached: its
//! current waiters still receive the result, which is then disposed instead
//! of cached. Once removed, the cache keeps no reference to a value, so
//! values that release their resources on drop do so when the last caller
//! holding them lets go.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{TileError, TileResult};

/// Hook run on every value that leaves the cache for good.
pub type Disposer<V> = Arc<dyn Fn(V) -> BoxFuture<'static, TileResult<()>> + Send + Sync>;

type Flight<V> = Shared<BoxFuture<'static, TileResult<V>>>;

struct InFlight<V> {
    id: u64,
    flight: Flight<V>,
}

enum Claim<V> {
    Ready(V),
    Join(Flight<V>),
    Lead {
        id: u64,
        tx: oneshot::Sender<TileResult<V>>,
        flight: Flight<V>,
    },
}

/// Size and lifetime bounds of a [`SingleFlightCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleFlightConfig {
    /// Maximum number of ready entries. Zero disables the ready tier, leaving
    /// pure request coalescing.
    pub max_entries: u64,
    /// Absolute time-to-live of a ready entry.
    pub ttl: Option<Duration>,
}

impl SingleFlightConfig {
    pub fn new(max_entries: u64, ttl: Option<Duration>) -> Self {
        Self { max_entries, ttl }
    }

    /// Coalesce concurrent producers without retaining results.
    pub fn coalescing_only() -> Self {
        Self {
            max_entries: 0,
            ttl: None,
        }
    }
}

/// Counters for monitoring cache effectiveness.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SingleFlightStats {
    /// Calls answered from the ready tier.
    pub hits: u64,
    /// Calls that started a new producer.
    pub misses: u64,
    /// Calls that joined a producer already in flight.
    pub coalesced: u64,
    /// Ready entries evicted by size or TTL.
    pub evictions: u64,
}

struct Inner<K, V> {
    name: String,
    ready: Option<Cache<K, V>>,
    in_flight: DashMap<K, InFlight<V>>,
    disposer: Option<Disposer<V>>,
    next_id: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    evictions: Arc<AtomicU64>,
}

/// A bounded map from key to an in-flight-or-completed asynchronous result.
///
/// Cloning is cheap and clones share state.
pub struct SingleFlightCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for SingleFlightCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> SingleFlightCache<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates a cache whose values need no cleanup.
    pub fn new(name: impl Into<String>, config: SingleFlightConfig) -> Self {
        Self::build(name.into(), config, None)
    }

    /// Creates a cache that runs `disposer` on every value it lets go of.
    pub fn with_disposer<F>(
        name: impl Into<String>,
        config: SingleFlightConfig,
        disposer: F,
    ) -> Self
    where
        F: Fn(V) -> BoxFuture<'static, TileResult<()>> + Send + Sync + 'static,
    {
        Self::build(name.into(), config, Some(Arc::new(disposer)))
    }

    fn build(name: String, config: SingleFlightConfig, disposer: Option<Disposer<V>>) -> Self {
        let evictions = Arc::new(AtomicU64::new(0));

        let ready = (config.max_entries > 0).then(|| {
            let mut builder = Cache::builder()
                .name(&name)
                .max_capacity(config.max_entries)
                .eviction_policy(EvictionPolicy::lru());
            if let Some(ttl) = config.ttl {
                builder = builder.time_to_live(ttl);
            }

            let listener_name = name.clone();
            let listener_disposer = disposer.clone();
            let listener_evictions = Arc::clone(&evictions);
            builder = builder.eviction_listener(move |key: Arc<K>, value: V, cause| {
                // Explicit removals are disposed by the caller that removed them
                if cause == RemovalCause::Explicit {
                    return;
                }
                listener_evictions.fetch_add(1, Ordering::Relaxed);
                debug!(cache = %listener_name, key = ?key, cause = ?cause, "Evicted entry");
                if let Some(disposer) = &listener_disposer {
                    spawn_disposal(&listener_name, disposer, value);
                }
            });

            builder.build()
        });

        Self {
            inner: Arc::new(Inner {
                name,
                ready,
                in_flight: DashMap::new(),
                disposer,
                next_id: AtomicU64::new(0),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
                evictions,
            }),
        }
    }

    /// Returns the ready value for `key`, touching its LRU position.
    ///
    /// Values still being produced are not visible here.
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.ready.as_ref()?.get(key)
    }

    /// Returns the value for `key`, producing it with `factory` on a miss.
    ///
    /// Concurrent calls for an equal key share one factory invocation.
    pub async fn get_or_create<F, Fut>(&self, key: K, factory: F) -> TileResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = TileResult<V>> + Send + 'static,
    {
        if let Some(value) = self.get(&key) {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
        }

        let (id, tx, flight) = match self.claim(&key) {
            Claim::Ready(value) => return Ok(value),
            Claim::Join(flight) => return flight.await,
            Claim::Lead { id, tx, flight } => (id, tx, flight),
        };

        // The shard lock is released; the factory may re-enter the cache.
        let fut = factory();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = AssertUnwindSafe(fut)
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(TileError::Internal("producer panicked".to_string())));
            inner.complete(key, id, &result);
            let _ = tx.send(result);
        });

        flight.await
    }

    /// Decides, under the shard lock of `key`, whether this caller joins an
    /// existing producer or becomes the one that runs the factory.
    fn claim(&self, key: &K) -> Claim<V> {
        match self.inner.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(cache = %self.inner.name, key = ?key, "Joining in-flight producer");
                Claim::Join(entry.get().flight.clone())
            }
            Entry::Vacant(entry) => {
                // A producer may have finished between the caller's lookup
                // and taking the shard lock.
                if let Some(value) = self.get(key) {
                    self.inner.hits.fetch_add(1, Ordering::Relaxed);
                    return Claim::Ready(value);
                }

                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel::<TileResult<V>>();
                let flight: Flight<V> = async move {
                    rx.await.unwrap_or_else(|_| {
                        Err(TileError::Internal("producer dropped its result".to_string()))
                    })
                }
                .boxed()
                .shared();
                entry.insert(InFlight {
                    id,
                    flight: flight.clone(),
                });
                Claim::Lead { id, tx, flight }
            }
        }
    }

    /// Removes `key`, disposing a ready value and detaching any producer.
    ///
    /// Detached producers still deliver to their current waiters; their
    /// result is disposed rather than cached.
    pub fn invalidate(&self, key: &K) {
        if self.inner.in_flight.remove(key).is_some() {
            debug!(cache = %self.inner.name, key = ?key, "Detached in-flight producer");
        }
        if let Some(value) = self.inner.remove_ready(key) {
            debug!(cache = %self.inner.name, key = ?key, "Invalidated entry");
            self.inner.dispose(value);
        }
    }

    /// Removes `key` without disposing the ready value, returning it.
    ///
    /// For callers that release the value themselves.
    pub fn take(&self, key: &K) -> Option<V> {
        self.inner.in_flight.remove(key);
        self.inner.remove_ready(key)
    }

    /// Removes every ready value without disposing it and detaches every
    /// producer.
    pub fn drain(&self) -> Vec<V> {
        self.inner.in_flight.clear();
        let Some(ready) = &self.inner.ready else {
            return Vec::new();
        };

        let keys: Vec<Arc<K>> = ready.iter().map(|(key, _)| key).collect();
        let values = keys
            .iter()
            .filter_map(|key| ready.remove(key.as_ref()))
            .collect();
        ready.run_pending_tasks();
        values
    }

    /// Invalidates every entry.
    pub fn invalidate_all(&self) {
        for value in self.drain() {
            self.inner.dispose(value);
        }
    }

    /// Applies pending LRU/TTL maintenance, running eviction hooks now.
    pub fn run_pending_tasks(&self) {
        if let Some(ready) = &self.inner.ready {
            ready.run_pending_tasks();
        }
    }

    /// Approximate number of ready entries.
    pub fn entry_count(&self) -> u64 {
        self.inner
            .ready
            .as_ref()
            .map(|ready| ready.entry_count())
            .unwrap_or(0)
    }

    /// Number of producers currently running.
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.len()
    }

    /// Returns a snapshot of the counters.
    pub fn stats(&self) -> SingleFlightStats {
        SingleFlightStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
            evictions: self.inner.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

impl<K, V> Inner<K, V>
where
    K: Hash + Eq + Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Transcribes a finished producer into the ready tier.
    ///
    /// Runs under the shard lock of `key` so it cannot interleave with an
    /// `invalidate` of the same key.
    fn complete(&self, key: K, id: u64, result: &TileResult<V>) {
        match self.in_flight.entry(key) {
            Entry::Occupied(entry) if entry.get().id == id => {
                if let (Ok(value), Some(ready)) = (result, &self.ready) {
                    ready.insert(entry.key().clone(), value.clone());
                }
                entry.remove();
            }
            Entry::Occupied(entry) => {
                drop(entry);
                self.dispose_detached(result);
            }
            Entry::Vacant(entry) => {
                drop(entry);
                self.dispose_detached(result);
            }
        }
    }

    /// Removes a ready value and flushes the pending write log, so the
    /// returned value is the cache's last reference to it.
    fn remove_ready(&self, key: &K) -> Option<V> {
        let ready = self.ready.as_ref()?;
        let value = ready.remove(key);
        if value.is_some() {
            ready.run_pending_tasks();
        }
        value
    }

    fn dispose_detached(&self, result: &TileResult<V>) {
        if let Ok(value) = result {
            debug!(cache = %self.name, "Disposing result of detached producer");
            self.dispose(value.clone());
        }
    }

    fn dispose(&self, value: V) {
        if let Some(disposer) = &self.disposer {
            spawn_disposal(&self.name, disposer, value);
        }
    }
}

impl<K: Hash + Eq, V> fmt::Debug for SingleFlightCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleFlightCache")
            .field("name", &self.inner.name)
            .field("in_flight", &self.inner.in_flight.len())
            .finish()
    }
}

/// Runs a disposal hook on the current runtime, logging failures.
fn spawn_disposal<V>(name: &str, disposer: &Disposer<V>, value: V) {
    let fut = disposer(value);
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let name = name.to_string();
            handle.spawn(async move {
                if let Err(e) = fut.await {
                    warn!(cache = %name, error = %e, "Disposal hook failed");
                }
            });
        }
        Err(_) => {
            warn!(cache = %name, "No async runtime; evicted value dropped without disposal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_disposer(
        count: Arc<AtomicUsize>,
    ) -> impl Fn(Arc<String>) -> BoxFuture<'static, TileResult<()>> + Send + Sync + 'static {
        move |_value| {
            let count = Arc::clone(&count);
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    async fn wait_until(condition: impl Fn() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn cache(max_entries: u64) -> SingleFlightCache<String, Arc<String>> {
        SingleFlightCache::new("test", SingleFlightConfig::new(max_entries, None))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_factory_run() {
        let cache = cache(16);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_create("a".to_string(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Arc::new("value".to_string()))
                    })
                    .await
            }));
        }

        let mut values = Vec::new();
        for handle in handles {
            values.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_error_reaches_all_waiters_and_is_not_cached() {
        let cache = cache(16);
        let calls = Arc::new(AtomicUsize::new(0));

        let make = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err::<Arc<String>, _>(TileError::configuration("a", "broken"))
            }
        };

        let (first, second) = tokio::join!(
            cache.get_or_create("a".to_string(), make(Arc::clone(&calls))),
            cache.get_or_create("a".to_string(), make(Arc::clone(&calls))),
        );
        assert!(first.is_err());
        assert!(second.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight_count(), 0);

        // Retry is not poisoned
        let value = cache
            .get_or_create("a".to_string(), || async { Ok(Arc::new("ok".to_string())) })
            .await
            .unwrap();
        assert_eq!(value.as_str(), "ok");
    }

    #[tokio::test]
    async fn test_get_sees_only_ready_values() {
        let cache = cache(16);
        assert!(cache.get(&"a".to_string()).is_none());

        cache
            .get_or_create("a".to_string(), || async { Ok(Arc::new("v".to_string())) })
            .await
            .unwrap();

        assert_eq!(cache.get(&"a".to_string()).unwrap().as_str(), "v");
        let again = cache
            .get_or_create("a".to_string(), || async {
                panic!("factory must not run on a hit")
            })
            .await
            .unwrap();
        assert_eq!(again.as_str(), "v");
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_invalidate_disposes_ready_value_once() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let cache = SingleFlightCache::with_disposer(
            "test",
            SingleFlightConfig::new(16, None),
            counting_disposer(Arc::clone(&disposed)),
        );

        cache
            .get_or_create("a".to_string(), || async { Ok(Arc::new("v".to_string())) })
            .await
            .unwrap();
        cache.invalidate(&"a".to_string());
        cache.invalidate(&"a".to_string());

        wait_until(|| disposed.load(Ordering::SeqCst) == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert!(cache.get(&"a".to_string()).is_none());
    }

    #[tokio::test]
    async fn test_invalidate_during_flight_detaches_producer() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let cache = SingleFlightCache::with_disposer(
            "test",
            SingleFlightConfig::new(16, None),
            counting_disposer(Arc::clone(&disposed)),
        );

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_create("a".to_string(), || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Arc::new("old".to_string()))
                    })
                    .await
            })
        };
        wait_until(|| cache.in_flight_count() == 1).await;

        cache.invalidate(&"a".to_string());
        assert_eq!(cache.in_flight_count(), 0);

        // The waiter still receives the detached result
        let old = waiter.await.unwrap().unwrap();
        assert_eq!(old.as_str(), "old");

        // ...which is disposed instead of cached
        wait_until(|| disposed.load(Ordering::SeqCst) == 1).await;
        assert!(cache.get(&"a".to_string()).is_none());

        let fresh = cache
            .get_or_create("a".to_string(), || async { Ok(Arc::new("new".to_string())) })
            .await
            .unwrap();
        assert_eq!(fresh.as_str(), "new");
    }

    #[tokio::test]
    async fn test_lru_overflow_disposes_least_recent() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let cache = SingleFlightCache::with_disposer(
            "test",
            SingleFlightConfig::new(2, None),
            counting_disposer(Arc::clone(&disposed)),
        );

        for key in ["a", "b"] {
            cache
                .get_or_create(key.to_string(), move || async move {
                    Ok(Arc::new(key.to_string()))
                })
                .await
                .unwrap();
        }
        cache.run_pending_tasks();

        // Touch "a" so "b" becomes least recently used
        assert!(cache.get(&"a".to_string()).is_some());
        cache.run_pending_tasks();

        cache
            .get_or_create("c".to_string(), || async { Ok(Arc::new("c".to_string())) })
            .await
            .unwrap();
        cache.run_pending_tasks();

        wait_until(|| disposed.load(Ordering::SeqCst) == 1).await;
        assert!(cache.get(&"a".to_string()).is_some());
        assert!(cache.get(&"b".to_string()).is_none());
        assert!(cache.get(&"c".to_string()).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry_disposes_value() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let cache = SingleFlightCache::with_disposer(
            "test",
            SingleFlightConfig::new(16, Some(Duration::from_millis(50))),
            counting_disposer(Arc::clone(&disposed)),
        );

        cache
            .get_or_create("a".to_string(), || async { Ok(Arc::new("v".to_string())) })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(cache.get(&"a".to_string()).is_none());
        cache.run_pending_tasks();
        wait_until(|| disposed.load(Ordering::SeqCst) == 1).await;
    }

    #[tokio::test]
    async fn test_take_skips_disposal() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let cache = SingleFlightCache::with_disposer(
            "test",
            SingleFlightConfig::new(16, None),
            counting_disposer(Arc::clone(&disposed)),
        );

        cache
            .get_or_create("a".to_string(), || async { Ok(Arc::new("v".to_string())) })
            .await
            .unwrap();
        let taken = cache.take(&"a".to_string()).unwrap();
        assert_eq!(taken.as_str(), "v");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(disposed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_taken_value_is_released_by_the_cache() {
        let cache = cache(16);
        cache
            .get_or_create("a".to_string(), || async { Ok(Arc::new("v".to_string())) })
            .await
            .unwrap();
        assert!(cache.get(&"a".to_string()).is_some());

        let taken = cache.take(&"a".to_string()).unwrap();
        assert_eq!(Arc::strong_count(&taken), 1);
    }

    #[tokio::test]
    async fn test_invalidate_all_disposes_everything() {
        let disposed = Arc::new(AtomicUsize::new(0));
        let cache = SingleFlightCache::with_disposer(
            "test",
            SingleFlightConfig::new(16, None),
            counting_disposer(Arc::clone(&disposed)),
        );

        for key in ["a", "b", "c"] {
            cache
                .get_or_create(key.to_string(), move || async move {
                    Ok(Arc::new(key.to_string()))
                })
                .await
                .unwrap();
        }
        cache.invalidate_all();

        wait_until(|| disposed.load(Ordering::SeqCst) == 3).await;
        assert!(cache.get(&"b".to_string()).is_none());
    }

    #[tokio::test]
    async fn test_failing_disposer_is_not_propagated() {
        let cache: SingleFlightCache<String, Arc<String>> = SingleFlightCache::with_disposer(
            "test",
            SingleFlightConfig::new(16, None),
            |_| Box::pin(async { Err(TileError::Internal("close failed".to_string())) }),
        );

        cache
            .get_or_create("a".to_string(), || async { Ok(Arc::new("v".to_string())) })
            .await
            .unwrap();
        cache.invalidate(&"a".to_string());
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Cache keeps working
        let value = cache
            .get_or_create("a".to_string(), || async { Ok(Arc::new("w".to_string())) })
            .await
            .unwrap();
        assert_eq!(value.as_str(), "w");
    }

    #[tokio::test]
    async fn test_coalescing_only_mode_keeps_nothing() {
        let cache: SingleFlightCache<String, Arc<String>> =
            SingleFlightCache::new("test", SingleFlightConfig::coalescing_only());
        let calls = Arc::new(AtomicUsize::new(0));

        let make = |calls: Arc<AtomicUsize>| {
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Arc::new("v".to_string()))
            }
        };

        let (a, b) = tokio::join!(
            cache.get_or_create("k".to_string(), make(Arc::clone(&calls))),
            cache.get_or_create("k".to_string(), make(Arc::clone(&calls))),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.stats().coalesced, 1);

        assert!(cache.get(&"k".to_string()).is_none());
        cache
            .get_or_create("k".to_string(), make(Arc::clone(&calls)))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_debug_shows_name_and_flights() {
        let cache = cache(4);
        let debug = format!("{:?}", cache);
        assert!(debug.contains("SingleFlightCache"));
        assert!(debug.contains("test"));
        assert!(debug.contains("in_flight: 0"));
    }

    #[tokio::test]
    async fn test_panicking_factory_becomes_internal_error() {
        let cache = cache(16);
        let result = cache
            .get_or_create("a".to_string(), || async {
                if true {
                    panic!("boom");
                }
                Ok(Arc::new("unreachable".to_string()))
            })
            .await;
        assert!(matches!(result, Err(TileError::Internal(_))));
        assert_eq!(cache.in_flight_count(), 0);
    }
}
