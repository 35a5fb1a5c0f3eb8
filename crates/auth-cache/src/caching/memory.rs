use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use moka::policy::EvictionPolicy;
use parking_lot::Mutex;
use rustc_hash::{FxBuildHasher, FxHashMap};
use sentry::{Hub, SentryFutureExt};
use tokio::sync::Semaphore;

use super::cleanup::{Sweep, spawn_sweeper};
use super::stats::{CacheCounters, bump};
use super::{CacheContents, CacheError, CacheStats, Clock, SystemClock};
use crate::config::CacheConfig;
use crate::utils::defer::defer;

/// Resolves a key that is missing from a [`Cacher`].
///
/// The cache never fetches on its own, it always goes through this function. Any closure
/// `Fn(K) -> impl Future<Output = CacheContents<V>>` is a fetch function.
pub trait FetchFunction<K, V>: Send + Sync + 'static {
    fn fetch(&self, key: K) -> BoxFuture<'static, CacheContents<V>>;
}

impl<K, V, F, Fut> FetchFunction<K, V> for F
where
    F: Fn(K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = CacheContents<V>> + Send + 'static,
{
    fn fetch(&self, key: K) -> BoxFuture<'static, CacheContents<V>> {
        self(key).boxed()
    }
}

/// A memoized outcome in the entry table.
#[derive(Clone, Debug)]
struct CacheEntry<V> {
    /// The outcome itself.
    contents: CacheContents<V>,
    /// When the outcome was stored.
    created_at: Instant,
    /// From this instant on the entry is not served anymore. `None` never expires.
    expires_at: Option<Instant>,
    /// The generation of the fetch that produced this outcome.
    generation: u64,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|expires_at| now < expires_at)
    }
}

type FetchChannel<V> = Shared<oneshot::Receiver<CacheContents<V>>>;

/// The bookkeeping for exactly one running fetch.
///
/// Every waiter holds a clone of the shared channel, which is fulfilled exactly once.
struct InFlightRequest<V> {
    generation: u64,
    channel: FetchChannel<V>,
}

type InFlightShard<K, V> = Mutex<FxHashMap<K, InFlightRequest<V>>>;

struct CacherInner<K, V, F> {
    name: &'static str,
    config: CacheConfig,
    fetcher: F,
    clock: Arc<dyn Clock>,

    /// Memoized outcomes, evicted in LRU order when a capacity is configured.
    entries: moka::sync::Cache<K, CacheEntry<V>>,

    /// Running fetches, partitioned by key hash.
    ///
    /// The shard lock of a key also guards all mutations of that key in `entries`.
    in_flight: Box<[InFlightShard<K, V>]>,
    shard_hasher: FxBuildHasher,

    /// Bounds the number of concurrently running fetches.
    fetch_limit: Option<Semaphore>,
    next_generation: AtomicU64,
    counters: CacheCounters,
}

/// A read-through, request-coalescing cache.
///
/// Concurrent [`get`](Self::get)s of the same key share a single call to the [`FetchFunction`].
/// Successful outcomes are memoized for `success_ttl`, upstream failures for `error_ttl`.
/// Timeouts and other failures that say nothing about the key itself are handed to the waiters
/// of that fetch only, so the next access retries right away.
///
/// Cloning a `Cacher` is cheap and yields a handle to the same cache.
pub struct Cacher<K, V, F> {
    inner: Arc<CacherInner<K, V, F>>,
}

impl<K, V, F> Clone for Cacher<K, V, F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V, F> fmt::Debug for Cacher<K, V, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let in_flight: usize = self.inner.in_flight.iter().map(|s| s.lock().len()).sum();
        f.debug_struct("Cacher")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("in-memory items", &self.inner.entries.entry_count())
            .field("running fetches", &in_flight)
            .finish()
    }
}

impl<K, V, F> Cacher<K, V, F>
where
    K: Clone + Hash + Eq + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: FetchFunction<K, V>,
{
    pub fn new(name: &'static str, config: CacheConfig, fetcher: F) -> Self {
        Self::with_clock(name, config, fetcher, Arc::new(SystemClock))
    }

    /// Creates a cache that takes entry timestamps from the given clock.
    ///
    /// Fetch deadlines are always measured by the tokio timer.
    pub fn with_clock(
        name: &'static str,
        config: CacheConfig,
        fetcher: F,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut builder = moka::sync::Cache::<K, CacheEntry<V>>::builder().name(name);
        if let Some(capacity) = config.capacity {
            builder = builder
                .max_capacity(capacity)
                .eviction_policy(EvictionPolicy::lru());
        }

        let in_flight = (0..config.shards.max(1))
            .map(|_| Mutex::new(FxHashMap::default()))
            .collect();
        let fetch_limit = config
            .max_concurrent_fetches
            .map(|limit| Semaphore::new(limit.max(1)));
        let sweep_interval = config.sweep_interval;

        let inner = Arc::new(CacherInner {
            name,
            config,
            fetcher,
            clock,
            entries: builder.build(),
            in_flight,
            shard_hasher: FxBuildHasher,
            fetch_limit,
            next_generation: AtomicU64::new(0),
            counters: CacheCounters::default(),
        });

        if !sweep_interval.is_zero() {
            spawn_sweeper(Arc::downgrade(&inner), sweep_interval);
        }

        Self { inner }
    }

    /// Resolves `key`, from memory if possible.
    ///
    /// A fresh memoized outcome is returned as is. Otherwise the caller joins the running fetch
    /// for `key`, or starts one if there is none.
    ///
    /// NOTE: This function itself is *not* `async`, because it eagerly spawns the fetch on the
    /// runtime, even if the returned future is never polled. Dropping the returned future does
    /// not cancel the fetch; its outcome is memoized for later callers.
    ///
    /// # Panics
    ///
    /// Panics when a fetch needs to be started outside of a tokio runtime.
    pub fn get(&self, key: K) -> BoxFuture<'static, CacheContents<V>> {
        let inner = &self.inner;
        let name = inner.name;
        metric!(counter("caches.access") += 1, "cache" => name);
        bump(&inner.counters.accesses);

        let now = inner.clock.now();
        let mut in_flight = inner.shard(&key).lock();

        if let Some(entry) = inner.entries.get(&key) {
            if entry.is_fresh(now) {
                let status = match entry.contents {
                    Ok(_) => {
                        bump(&inner.counters.hits);
                        "positive"
                    }
                    Err(_) => {
                        bump(&inner.counters.negative_hits);
                        "negative"
                    }
                };
                metric!(counter("caches.memory.hit") += 1, "cache" => name, "status" => status);
                return future::ready(entry.contents).boxed();
            }

            tracing::trace!(
                cache = name,
                ?key,
                age = ?now.saturating_duration_since(entry.created_at),
                "Dropping expired entry"
            );
            metric!(counter("caches.memory.expired") += 1, "cache" => name);
            bump(&inner.counters.expired);
            inner.entries.invalidate(&key);
        }

        // A resolved channel belongs to a fetch that went away without retiring its request.
        let running = in_flight
            .get(&key)
            .filter(|request| request.channel.peek().is_none());

        let mut fetch = None;
        let channel = match running {
            Some(request) => {
                // A concurrent lookup joins the running fetch.
                metric!(counter("caches.channel.hit") += 1, "cache" => name);
                bump(&inner.counters.coalesced);
                request.channel.clone()
            }
            None => {
                metric!(counter("caches.memory.miss") += 1, "cache" => name);
                bump(&inner.counters.misses);
                let (request, task) = inner.prepare_fetch(key.clone());
                let channel = request.channel.clone();
                in_flight.insert(key, request);
                fetch = Some(task);
                channel
            }
        };
        drop(in_flight);

        // Spawning happens outside the shard lock, since a task dropped by the runtime retires
        // its request right away.
        if let Some(task) = fetch {
            tokio::spawn(task);
        }

        channel
            .map(|result| result.unwrap_or(Err(CacheError::Cancelled)))
            .boxed()
    }

    /// Removes the memoized outcome for `key`.
    ///
    /// A fetch that is already running for `key` is not affected and memoizes its outcome
    /// when it completes.
    pub fn invalidate(&self, key: &K) {
        let _in_flight = self.inner.shard(key).lock();
        self.inner.entries.invalidate(key);
    }

    /// Removes all memoized outcomes.
    pub fn invalidate_all(&self) {
        self.inner.entries.invalidate_all();
    }

    /// Removes all expired entries, returning how many were removed.
    ///
    /// This is what the background sweep runs every `sweep_interval`.
    pub fn sweep_expired(&self) -> usize {
        self.inner.sweep_expired()
    }

    /// Runs pending eviction housekeeping of the entry table.
    ///
    /// Capacity eviction is applied lazily, this makes [`entry_count`](Self::entry_count) exact.
    pub fn run_pending_tasks(&self) {
        self.inner.entries.run_pending_tasks();
    }

    /// The approximate number of memoized outcomes, expired ones included.
    pub fn entry_count(&self) -> u64 {
        self.inner.entries.entry_count()
    }

    /// The number of currently running fetches.
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.iter().map(|s| s.lock().len()).sum()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.counters.snapshot()
    }
}

impl<K, V, F> CacherInner<K, V, F>
where
    K: Clone + Hash + Eq + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: FetchFunction<K, V>,
{
    fn shard(&self, key: &K) -> &InFlightShard<K, V> {
        let index = self.shard_hasher.hash_one(key) as usize % self.in_flight.len();
        &self.in_flight[index]
    }

    /// Creates the in-flight request for `key` along with the task that fulfills it.
    ///
    /// Must be called with the shard lock of `key` held. The request must be registered before
    /// the lock is released, and the task spawned after.
    fn prepare_fetch(self: &Arc<Self>, key: K) -> (InFlightRequest<V>, BoxFuture<'static, ()>) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = oneshot::channel();
        bump(&self.counters.fetches);

        tracing::trace!(cache = self.name, ?key, generation, "Starting fetch");

        // Cleans up after a fetch that never completes, for example because it panicked or its
        // runtime shut down before the task was first polled. Waiters then observe the dropped
        // `sender`.
        let remove_request = {
            let inner = Arc::clone(self);
            let key = key.clone();
            defer(move || inner.remove_in_flight(&key, generation))
        };

        let inner = Arc::clone(self);
        let task = async move {
            let started_at = Instant::now();
            let contents = Arc::clone(&inner).fetch(key.clone()).await;

            inner.complete(&key, generation, &contents, started_at.elapsed());
            remove_request.cancel();

            sender.send(contents).ok();
        }
        .bind_hub(Hub::new_from_top(Hub::current()))
        .boxed();

        let request = InFlightRequest {
            generation,
            channel: receiver.shared(),
        };
        (request, task)
    }

    /// Calls the fetch function, bounded by the fetch deadline and the concurrency limit.
    async fn fetch(self: Arc<Self>, key: K) -> CacheContents<V> {
        let deadline = self.config.fetch_deadline;
        let fetch = async move {
            let _permit = match &self.fetch_limit {
                Some(limit) => Some(limit.acquire().await.map_err(CacheError::from_std_error)?),
                None => None,
            };
            self.fetcher.fetch(key).await
        };

        match tokio::time::timeout(deadline, fetch).await {
            Ok(contents) => contents,
            Err(_) => Err(CacheError::Timeout(deadline)),
        }
    }

    /// Memoizes the outcome of a fetch and retires its in-flight request.
    ///
    /// Both happen under the shard lock, so a new caller either joins the request or sees the
    /// memoized outcome.
    fn complete(&self, key: &K, generation: u64, contents: &CacheContents<V>, elapsed: Duration) {
        let name = self.name;
        let status = match contents {
            Ok(_) => "positive",
            Err(err) => err.metrics_tag(),
        };
        metric!(counter("caches.fetch") += 1, "cache" => name, "status" => status);
        metric!(timer("caches.fetch.duration") = elapsed, "cache" => name, "status" => status);

        if let Err(err) = contents {
            bump(&self.counters.fetch_errors);
            if let CacheError::Timeout(_) = err {
                metric!(counter("caches.fetch.timeout") += 1, "cache" => name);
                bump(&self.counters.timeouts);
                tracing::warn!(cache = name, ?key, "Fetch exceeded its deadline");
            } else {
                tracing::debug!(cache = name, ?key, error = %err, "Fetch failed");
            }
        }

        let ttl = match contents {
            Ok(_) => Some(self.config.success_ttl),
            Err(err) if err.is_memoizable() => Some(self.config.error_ttl),
            Err(_) => None,
        };

        let mut in_flight = self.shard(key).lock();
        match in_flight.get(key) {
            Some(request) if request.generation == generation => {
                in_flight.remove(key);
            }
            _ => {
                tracing::error!(
                    cache = name,
                    ?key,
                    generation,
                    "Discarding the outcome of a superseded fetch"
                );
                return;
            }
        }

        if let Some(ttl) = ttl.filter(|ttl| !ttl.is_zero()) {
            let now = self.clock.now();
            let entry = CacheEntry {
                contents: contents.clone(),
                created_at: now,
                expires_at: now.checked_add(ttl),
                generation,
            };
            self.entries.insert(key.clone(), entry);
        }
    }

    fn remove_in_flight(&self, key: &K, generation: u64) {
        let mut in_flight = self.shard(key).lock();
        if in_flight
            .get(key)
            .is_some_and(|request| request.generation == generation)
        {
            tracing::debug!(cache = self.name, ?key, generation, "Fetch went away");
            in_flight.remove(key);
        }
    }
}

impl<K, V, F> Sweep for CacherInner<K, V, F>
where
    K: Clone + Hash + Eq + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    F: FetchFunction<K, V>,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now))
            .map(|(key, entry)| (key, entry.generation))
            .collect();

        let mut removed = 0;
        for (key, generation) in expired {
            let _in_flight = self.shard(&key).lock();
            // The entry might have been replaced by a newer outcome in the meantime.
            if self
                .entries
                .get(&*key)
                .is_some_and(|entry| entry.generation == generation)
            {
                self.entries.invalidate(&*key);
                removed += 1;
            }
        }
        self.entries.run_pending_tasks();

        self.counters
            .swept
            .fetch_add(removed as u64, Ordering::Relaxed);
        metric!(counter("caches.sweep.removed") += removed as i64, "cache" => self.name);
        metric!(gauge("caches.memory.entries") = self.entries.entry_count(), "cache" => self.name);

        removed
    }
}
