//! Session query cache.
//!
//! One [`QueryCache`] backs one page session. Each key owns a slot holding the
//! current [`CacheEntry`] (published through a `watch` channel), the most
//! recent loader registered for it, and the handle of the load in flight, if
//! any. All slot state sits behind a single mutex that is never held across an
//! await; loaders run on spawned tasks and write their result back when
//! they finish.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::BoxFuture;
use metrics::{counter, histogram};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::domain::error::ProcedureError;

use super::clock::{LogicalClock, Timestamp};
use super::config::CacheConfig;
use super::entry::{CacheEntry, QueryOutcome};
use super::keys::QueryKey;
use super::lock::mutex_lock;
use super::subscription::Subscription;

const SOURCE: &str = "cache::store";

const METRIC_HIT: &str = "chirp_query_cache_hit_total";
const METRIC_MISS: &str = "chirp_query_cache_miss_total";
const METRIC_DEDUP: &str = "chirp_query_dedup_total";
const METRIC_FETCH: &str = "chirp_query_fetch_total";
const METRIC_FETCH_MS: &str = "chirp_query_fetch_ms";
const METRIC_INVALIDATE: &str = "chirp_query_invalidate_total";
const METRIC_SEED: &str = "chirp_hydration_seed_total";

/// Asynchronous producer of a key's value.
///
/// Cloning is cheap; the cache keeps the latest loader registered for each key
/// so that invalidation can re-run it.
#[derive(Clone)]
pub struct Loader(Arc<dyn Fn() -> BoxFuture<'static, QueryOutcome> + Send + Sync>);

impl Loader {
    pub fn new<F, Fut>(load: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = QueryOutcome> + Send + 'static,
    {
        Self(Arc::new(move || load().boxed()))
    }

    fn call(&self) -> BoxFuture<'static, QueryOutcome> {
        (self.0)()
    }
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Loader")
    }
}

/// What [`QueryCache::invalidate`] did with a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    /// No entry exists for the key.
    Missing,
    /// Nobody is watching; the entry refetches on its next `ensure`.
    MarkedStale,
    /// A new load was started for the watched entry.
    Refetching,
    /// A load was already running; one follow-up load will run after it.
    Queued,
}

impl Invalidation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::MarkedStale => "marked_stale",
            Self::Refetching => "refetching",
            Self::Queued => "queued",
        }
    }
}

/// What [`QueryCache::seed`] did with a hydrated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOutcome {
    Inserted,
    Replaced,
    /// The cache already held a result at least as new as the seed.
    Skipped,
}

impl SeedOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Replaced => "replaced",
            Self::Skipped => "skipped",
        }
    }
}

struct Slot {
    sender: watch::Sender<CacheEntry>,
    loader: Option<Loader>,
    in_flight: Option<AbortHandle>,
    generation: u64,
    refetch_queued: bool,
}

impl Slot {
    fn new(entry: CacheEntry) -> Self {
        let (sender, _) = watch::channel(entry);
        Self {
            sender,
            loader: None,
            in_flight: None,
            generation: 0,
            refetch_queued: false,
        }
    }

    fn current(&self) -> CacheEntry {
        self.sender.borrow().clone()
    }

    fn subscribers(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[derive(Default)]
struct State {
    slots: HashMap<QueryKey, Slot>,
    disposed: bool,
}

/// Keyed store of read results for one page session.
pub struct QueryCache {
    config: CacheConfig,
    clock: Arc<LogicalClock>,
    state: Mutex<State>,
}

impl fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCache")
            .field("config", &self.config)
            .field("entries", &self.len())
            .finish()
    }
}

impl QueryCache {
    pub fn new(config: CacheConfig) -> Arc<Self> {
        Self::with_clock(config, Arc::new(LogicalClock::new()))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<LogicalClock>) -> Arc<Self> {
        Arc::new(Self {
            config,
            clock,
            state: Mutex::new(State::default()),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<LogicalClock> {
        &self.clock
    }

    /// Current entry for `key`, without side effects.
    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        mutex_lock(&self.state, SOURCE, "get")
            .slots
            .get(key)
            .map(Slot::current)
    }

    /// Return the entry for `key`, starting a load when it has no usable value.
    ///
    /// Fresh results, terminal errors and entries with a load in flight are
    /// returned as they are. Anything else moves to `loading` and runs
    /// `loader` on the current tokio runtime.
    pub fn ensure(self: &Arc<Self>, key: &QueryKey, loader: Loader) -> CacheEntry {
        let mut state = mutex_lock(&self.state, SOURCE, "ensure");
        self.ensure_locked(&mut state, key, loader)
    }

    /// Register live interest in `key` and make sure it is loaded.
    pub fn subscribe(self: &Arc<Self>, key: &QueryKey, loader: Loader) -> Subscription {
        let mut state = mutex_lock(&self.state, SOURCE, "subscribe");
        if state.disposed {
            return Subscription::detached(key.clone());
        }

        let receiver = state
            .slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(CacheEntry::idle(key.clone())))
            .sender
            .subscribe();
        self.ensure_locked(&mut state, key, loader);

        Subscription::new(key.clone(), receiver)
    }

    /// Number of live subscriptions on `key`.
    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        mutex_lock(&self.state, SOURCE, "subscriber_count")
            .slots
            .get(key)
            .map_or(0, Slot::subscribers)
    }

    /// Whether any key currently has a live subscription.
    pub fn has_subscribers(&self) -> bool {
        mutex_lock(&self.state, SOURCE, "has_subscribers")
            .slots
            .values()
            .any(|slot| slot.subscribers() > 0)
    }

    /// Mark `key` as out of date, refetching it if anyone is watching.
    pub fn invalidate(self: &Arc<Self>, key: &QueryKey) -> Invalidation {
        let mut guard = mutex_lock(&self.state, SOURCE, "invalidate");
        let state = &mut *guard;
        let result = match state.slots.get_mut(key) {
            _ if state.disposed => Invalidation::Missing,
            None => Invalidation::Missing,
            Some(slot) if slot.subscribers() == 0 || slot.loader.is_none() => {
                if slot.in_flight.is_some() {
                    // The running load may predate the write; its result must
                    // land stale.
                    slot.refetch_queued = true;
                } else {
                    slot.sender.send_modify(CacheEntry::mark_stale);
                }
                Invalidation::MarkedStale
            }
            Some(slot) if slot.in_flight.is_some() => {
                slot.refetch_queued = true;
                Invalidation::Queued
            }
            Some(slot) => {
                self.start_load(key, slot);
                Invalidation::Refetching
            }
        };
        drop(guard);

        counter!(METRIC_INVALIDATE, "action" => result.as_str()).increment(1);
        debug!(
            key = %key,
            action = result.as_str(),
            "Invalidated query"
        );
        result
    }

    /// Write a settled value produced ahead of time.
    ///
    /// A value already in the cache with a timestamp at or after `updated_at`
    /// is kept. Entries that have not produced a result yet are overwritten.
    pub fn seed(&self, key: &QueryKey, outcome: QueryOutcome, updated_at: Timestamp) -> SeedOutcome {
        self.clock.observe(updated_at);

        let mut guard = mutex_lock(&self.state, SOURCE, "seed");
        let state = &mut *guard;
        let result = if state.disposed {
            SeedOutcome::Skipped
        } else {
            match state.slots.entry(key.clone()) {
                Entry::Vacant(vacant) => {
                    vacant.insert(Slot::new(CacheEntry::settled(
                        key.clone(),
                        outcome,
                        updated_at,
                    )));
                    SeedOutcome::Inserted
                }
                Entry::Occupied(mut occupied) => {
                    let slot = occupied.get_mut();
                    let keep_existing = {
                        let current = slot.sender.borrow();
                        current.has_result() && current.updated_at() >= updated_at
                    };
                    if keep_existing {
                        SeedOutcome::Skipped
                    } else {
                        slot.sender
                            .send_modify(|entry| entry.settle(outcome, updated_at));
                        SeedOutcome::Replaced
                    }
                }
            }
        };
        drop(guard);

        counter!(METRIC_SEED, "outcome" => result.as_str()).increment(1);
        debug!(
            key = %key,
            updated_at = %updated_at,
            outcome = result.as_str(),
            "Seeded query"
        );
        result
    }

    /// End the session: abort running loads, drop every entry, and close all
    /// subscriptions.
    pub fn dispose(&self) {
        let mut state = mutex_lock(&self.state, SOURCE, "dispose");
        if state.disposed {
            return;
        }
        state.disposed = true;

        let mut aborted = 0usize;
        let entries = state.slots.len();
        for (_, slot) in state.slots.drain() {
            if let Some(handle) = slot.in_flight {
                handle.abort();
                aborted += 1;
            }
        }
        drop(state);

        info!(
            entries, aborted, "Disposed query cache"
        );
    }

    pub fn is_disposed(&self) -> bool {
        mutex_lock(&self.state, SOURCE, "is_disposed").disposed
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.state, SOURCE, "len").slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached keys in sorted order.
    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<_> = mutex_lock(&self.state, SOURCE, "keys")
            .slots
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    fn ensure_locked(self: &Arc<Self>, state: &mut State, key: &QueryKey, loader: Loader) -> CacheEntry {
        if state.disposed {
            return CacheEntry::idle(key.clone());
        }

        let slot = state
            .slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(CacheEntry::idle(key.clone())));
        slot.loader = Some(loader);
        let entry = slot.current();

        if slot.in_flight.is_some() {
            counter!(METRIC_DEDUP).increment(1);
            debug!(key = %key, "Joined in-flight load");
            return entry;
        }

        if !entry.needs_fetch(self.config.retry_failed_on_subscribe) {
            counter!(METRIC_HIT).increment(1);
            debug!(
                key = %key,
                status = %entry.status(),
                "Query cache hit"
            );
            return entry;
        }

        counter!(METRIC_MISS).increment(1);
        self.start_load(key, slot)
    }

    fn start_load(self: &Arc<Self>, key: &QueryKey, slot: &mut Slot) -> CacheEntry {
        let Some(loader) = slot.loader.clone() else {
            return slot.current();
        };

        slot.generation += 1;
        slot.refetch_queued = false;
        slot.sender.send_modify(CacheEntry::begin_loading);

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(
                    key = %key,
                    error = %err,
                    "No async runtime to run loader"
                );
                let updated_at = self.clock.tick();
                let error = ProcedureError::transport("no async runtime available");
                slot.sender
                    .send_modify(|entry| entry.settle(Err(error), updated_at));
                return slot.current();
            }
        };

        let cache = Arc::downgrade(self);
        let task_key = key.clone();
        let generation = slot.generation;
        let timeout = self.config.fetch_timeout();
        let task = runtime.spawn(async move {
            let started_at = Instant::now();
            let outcome = run_loader(&loader, timeout).await;
            complete(&cache, &task_key, generation, outcome, started_at.elapsed());
        });
        slot.in_flight = Some(task.abort_handle());

        debug!(key = %key, generation, "Started load");
        slot.current()
    }

    /// Apply a finished load to its slot.
    ///
    /// Completions from a superseded generation, or for a slot that no longer
    /// exists, are dropped.
    fn complete(
        self: &Arc<Self>,
        key: &QueryKey,
        generation: u64,
        outcome: QueryOutcome,
        elapsed: Duration,
    ) {
        let label = match &outcome {
            Ok(_) => "success",
            Err(err) if err.is_not_found() => "not_found",
            Err(_) => "error",
        };
        counter!(METRIC_FETCH, "outcome" => label).increment(1);
        histogram!(METRIC_FETCH_MS).record(elapsed.as_secs_f64() * 1000.0);

        let mut state = mutex_lock(&self.state, SOURCE, "complete");
        let Some(slot) = state.slots.get_mut(key) else {
            return;
        };
        if slot.generation != generation {
            return;
        }
        slot.in_flight = None;

        let updated_at = self.clock.tick();
        slot.sender
            .send_modify(|entry| entry.settle(outcome, updated_at));

        let subscribers = slot.subscribers();
        if subscribers == 0 {
            debug!(
                key = %key,
                outcome = label,
                "Stored load result with no subscribers"
            );
        } else {
            debug!(
                key = %key,
                outcome = label,
                subscribers,
                elapsed_ms = elapsed.as_millis() as u64,
                "Load completed"
            );
        }

        if slot.refetch_queued {
            slot.refetch_queued = false;
            if subscribers > 0 {
                self.start_load(key, slot);
            } else {
                slot.sender.send_modify(CacheEntry::mark_stale);
            }
        }
    }
}

async fn run_loader(loader: &Loader, timeout: Option<Duration>) -> QueryOutcome {
    let load = AssertUnwindSafe(loader.call()).catch_unwind();
    let caught = match timeout {
        Some(limit) => match tokio::time::timeout(limit, load).await {
            Ok(caught) => caught,
            Err(_) => {
                return Err(ProcedureError::transport(format!(
                    "timed out after {}ms",
                    limit.as_millis()
                )));
            }
        },
        None => load.await,
    };

    caught.unwrap_or_else(|_| Err(ProcedureError::transport("loader panicked")))
}

fn complete(
    cache: &Weak<QueryCache>,
    key: &QueryKey,
    generation: u64,
    outcome: QueryOutcome,
    elapsed: Duration,
) {
    if let Some(cache) = cache.upgrade() {
        cache.complete(key, generation, outcome, elapsed);
    }
}
