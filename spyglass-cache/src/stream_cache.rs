//! Generic stream cache engine
//!
//! One `StreamCache<T>` owns the in-memory index for one entity type. It
//! ingests change events from a broadcast receiver, evicts by TTL and by
//! capacity, matches filters and queries, and serves per-subscriber
//! snapshot streams.
//!
//! ## Task model
//!
//! Each cache hosts one ingest task and one cleanup task, both stopped by a
//! shared shutdown signal. Every active `list`/`query` subscription owns
//! one delivery task that recomputes its snapshot when pinged and pushes it
//! into a single-slot channel; because one task computes and sends every
//! snapshot for its subscription, snapshots on one channel are monotone in
//! the cache state they reflect.
//!
//! Nothing sends on a channel, performs I/O, or calls into a service while
//! holding the index lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, mpsc, watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use spyglass_core::{
    CacheConfig, CacheResult, CacheStats, ChangeEvent, ChangeKind, Filter, Query,
};

use crate::entity::CacheEntity;
use crate::matcher;

// ============================================================================
// STORED RECORDS AND SUBSCRIBERS
// ============================================================================

/// One record of the index.
struct CacheItem<T> {
    value: T,
    /// Monotonic clock instant used for TTL and eviction ordering.
    inserted_at: Instant,
    /// Wall-clock time surfaced in result envelopes.
    cached_at: DateTime<Utc>,
    version: i64,
    hits: i64,
}

impl<T> CacheItem<T> {
    fn expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) > ttl
    }
}

/// The locked portion of the cache: records plus the version counter.
struct Index<T> {
    items: HashMap<String, CacheItem<T>>,
    version_counter: i64,
}

impl<T> Index<T> {
    fn next_version(&mut self) -> i64 {
        self.version_counter += 1;
        self.version_counter
    }
}

/// What a subscription selects: a plain filter set or a full query.
enum Selector {
    Filters(Vec<Filter>),
    Query(Query),
}

impl Selector {
    fn filters(&self) -> &[Filter] {
        match self {
            Selector::Filters(filters) => filters,
            Selector::Query(query) => &query.filters,
        }
    }
}

/// Shared state of one active `list`/`query` subscription.
struct SubscriberState<T> {
    selector: Selector,
    /// Pinged after every index mutation; pings coalesce.
    dirty: Notify,
    /// Single-slot channel to the caller: an unread snapshot is replaced by
    /// a newer one, so a slow consumer never receives a stale value.
    tx: watch::Sender<Option<CacheResult<Vec<T>>>>,
}

/// Stream of snapshots for one `list`/`query` subscription.
///
/// Dropping the handle cancels the subscription: the delivery task detaches
/// and exits promptly. `recv` returns `None` once the subscription is
/// closed, either by cancellation or by [`StreamCache::close`].
pub struct Snapshots<D> {
    rx: watch::Receiver<Option<CacheResult<D>>>,
}

impl<D: Clone> Snapshots<D> {
    /// Wait for the next snapshot.
    pub async fn recv(&mut self) -> Option<CacheResult<D>> {
        loop {
            self.rx.changed().await.ok()?;
            let latest = self.rx.borrow_and_update().clone();
            if let Some(result) = latest {
                return Some(result);
            }
        }
    }
}

// ============================================================================
// STREAM CACHE
// ============================================================================

struct Shared<T: CacheEntity> {
    config: CacheConfig,
    index: RwLock<Index<T>>,
    subscribers: Mutex<HashMap<u64, Arc<SubscriberState<T>>>>,
    next_subscriber_id: AtomicU64,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
    last_cleanup: Mutex<Option<DateTime<Utc>>>,
    shutdown: watch::Sender<bool>,
}

/// Event-driven stream cache for one entity type.
pub struct StreamCache<T: CacheEntity> {
    shared: Arc<Shared<T>>,
}

impl<T: CacheEntity> StreamCache<T> {
    /// Create a cache and start its ingest and cleanup tasks.
    ///
    /// Must be called from within a Tokio runtime. The cache ingests from
    /// `events` until the sender side closes or [`close`](Self::close) is
    /// called; a lagged receiver drops the missed events and keeps going.
    pub fn new(config: CacheConfig, events: broadcast::Receiver<ChangeEvent<T>>) -> Self {
        let config = config.validated();
        let (shutdown, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            config,
            index: RwLock::new(Index {
                items: HashMap::new(),
                version_counter: 0,
            }),
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(0),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
            last_cleanup: Mutex::new(None),
            shutdown,
        });

        tokio::spawn(ingest_task(
            Arc::clone(&shared),
            events,
            shared.shutdown.subscribe(),
        ));
        tokio::spawn(cleanup_task(
            Arc::clone(&shared),
            shared.shutdown.subscribe(),
        ));

        Self { shared }
    }

    /// Retrieve a single record by id.
    ///
    /// The returned channel emits exactly one value and then closes: the
    /// cached record if present and unexpired, or a miss.
    pub fn get(&self, id: &str) -> mpsc::Receiver<CacheResult<T>> {
        let (tx, rx) = mpsc::channel(self.shared.config.buffer_size);
        // A fresh channel with capacity >= 1 always accepts the one value.
        let _ = tx.try_send(self.shared.lookup(id));
        rx
    }

    /// Subscribe to the set of records matching all filters (AND).
    ///
    /// The stream first emits the current snapshot, then a new snapshot
    /// whenever an ingested change alters the filtered set. Content-equal
    /// snapshots are suppressed.
    pub fn list(&self, filters: Vec<Filter>) -> Snapshots<Vec<T>> {
        self.subscribe(Selector::Filters(filters))
    }

    /// Subscribe to a query: filters, then sort, then offset, then limit.
    pub fn query(&self, query: Query) -> Snapshots<Vec<T>> {
        self.subscribe(Selector::Query(query))
    }

    /// Remove the given records and re-evaluate affected subscriptions.
    pub fn invalidate<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let removed = {
            let mut index = self.shared.write_index();
            let mut removed = 0usize;
            for id in ids {
                if index.items.remove(id.as_ref()).is_some() {
                    removed += 1;
                }
            }
            if removed > 0 {
                index.version_counter += 1;
            }
            removed
        };
        if removed > 0 {
            debug!(removed, "invalidated records");
            self.shared.notify_subscribers();
        }
    }

    /// Remove all records and re-evaluate all subscriptions.
    pub fn clear(&self) {
        let removed = {
            let mut index = self.shared.write_index();
            let removed = index.items.len();
            index.items.clear();
            if removed > 0 {
                index.version_counter += 1;
            }
            removed
        };
        if removed > 0 {
            debug!(removed, "cleared cache");
            self.shared.notify_subscribers();
        }
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> CacheStats {
        let (item_count, memory_bytes) = {
            let index = self.shared.read_index();
            let bytes: u64 = index
                .items
                .keys()
                .map(|id| (std::mem::size_of::<CacheItem<T>>() + id.len()) as u64)
                .sum();
            (index.items.len() as u64, bytes)
        };
        CacheStats {
            hit_count: self.shared.hit_count.load(Ordering::Relaxed),
            miss_count: self.shared.miss_count.load(Ordering::Relaxed),
            item_count,
            memory_bytes,
            last_cleanup: *self.shared.lock_last_cleanup(),
        }
    }

    /// Number of active `list`/`query` subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.shared.lock_subscribers().len()
    }

    /// Stop the ingest and cleanup tasks and close every subscription with
    /// no further value. Idempotent.
    pub fn close(&self) {
        if self
            .shared
            .shutdown
            .send_if_modified(|closing| !std::mem::replace(closing, true))
        {
            debug!("cache closing");
        }
    }

    fn subscribe(&self, selector: Selector) -> Snapshots<Vec<T>> {
        let (tx, rx) = watch::channel(None);
        let state = Arc::new(SubscriberState {
            selector,
            dirty: Notify::new(),
            tx,
        });

        let id = self.shared.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        self.shared
            .lock_subscribers()
            .insert(id, Arc::clone(&state));

        tokio::spawn(delivery_task(
            Arc::clone(&self.shared),
            id,
            state,
            self.shared.shutdown.subscribe(),
        ));

        Snapshots { rx }
    }
}

impl<T: CacheEntity> Drop for StreamCache<T> {
    fn drop(&mut self) {
        self.close();
    }
}

// ============================================================================
// SHARED STATE OPERATIONS
// ============================================================================

impl<T: CacheEntity> Shared<T> {
    // A poisoned lock only means another task panicked mid-operation; the
    // guarded data is still structurally sound, so reads and writes proceed.
    fn read_index(&self) -> RwLockReadGuard<'_, Index<T>> {
        self.index.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, Index<T>> {
        self.index.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, HashMap<u64, Arc<SubscriberState<T>>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_last_cleanup(&self) -> MutexGuard<'_, Option<DateTime<Utc>>> {
        self.last_cleanup
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lookup(&self, id: &str) -> CacheResult<T> {
        let ttl = self.config.ttl;
        let hit = {
            let mut index = self.write_index();
            match index.items.get_mut(id) {
                Some(item) if !item.expired(Instant::now(), ttl) => {
                    item.hits += 1;
                    Some(CacheResult::hit(
                        item.value.clone(),
                        item.cached_at,
                        item.version,
                    ))
                }
                _ => None,
            }
        };
        match hit {
            Some(result) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                result
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                CacheResult::miss()
            }
        }
    }

    /// Apply one change event to the index.
    fn apply(&self, event: ChangeEvent<T>) {
        let id = event.payload.id().to_string();
        if id.is_empty() {
            trace!(kind = event.kind.as_str(), "dropping event with empty id");
            return;
        }

        let changed = {
            let mut index = self.write_index();
            match event.kind {
                ChangeKind::Created | ChangeKind::Updated => {
                    let version = index.next_version();
                    let now = Instant::now();
                    let cached_at = Utc::now();
                    if let Some(item) = index.items.get_mut(&id) {
                        // Refresh: new value and TTL, hit count preserved.
                        item.value = event.payload;
                        item.version = version;
                        item.inserted_at = now;
                        item.cached_at = cached_at;
                    } else {
                        if index.items.len() >= self.config.max_items {
                            if let Some(evicted) = evict_oldest(&mut index) {
                                debug!(id = %evicted, "evicted record at capacity");
                            }
                        }
                        index.items.insert(
                            id.clone(),
                            CacheItem {
                                value: event.payload,
                                inserted_at: now,
                                cached_at,
                                version,
                                hits: 0,
                            },
                        );
                    }
                    true
                }
                ChangeKind::Deleted => {
                    let removed = index.items.remove(&id).is_some();
                    if removed {
                        index.version_counter += 1;
                    }
                    removed
                }
            }
        };

        trace!(kind = event.kind.as_str(), id = %id, changed, "ingested event");
        if changed {
            self.notify_subscribers();
        }
    }

    fn notify_subscribers(&self) {
        for state in self.lock_subscribers().values() {
            state.dirty.notify_one();
        }
    }

    fn sweep_expired(&self) {
        let removed = {
            let mut index = self.write_index();
            let now = Instant::now();
            let ttl = self.config.ttl;
            let before = index.items.len();
            index.items.retain(|_, item| !item.expired(now, ttl));
            let removed = before - index.items.len();
            if removed > 0 {
                index.version_counter += 1;
            }
            removed
        };
        *self.lock_last_cleanup() = Some(Utc::now());
        if removed > 0 {
            debug!(removed, "swept expired records");
            self.notify_subscribers();
        }
    }

    /// Current snapshot for a selector. Unsorted snapshots are ordered by
    /// record version so repeated computations serialize identically.
    fn compute_snapshot(&self, selector: &Selector) -> CacheResult<Vec<T>> {
        let mut matched: Vec<(i64, T)>;
        let version;
        {
            let index = self.read_index();
            let now = Instant::now();
            let ttl = self.config.ttl;
            matched = index
                .items
                .values()
                .filter(|item| !item.expired(now, ttl))
                .filter(|item| matcher::matches_filters(&item.value, selector.filters()))
                .map(|item| (item.version, item.value.clone()))
                .collect();
            version = index.version_counter;
        }
        matched.sort_by_key(|(item_version, _)| *item_version);

        let mut items: Vec<T> = matched.into_iter().map(|(_, value)| value).collect();
        if let Selector::Query(query) = selector {
            items = matcher::apply_query(items, query);
        }
        CacheResult::hit(items, Utc::now(), version)
    }
}

/// Evict the record with the oldest `inserted_at`, ties broken by lowest
/// version. Hits do not protect a record.
fn evict_oldest<T>(index: &mut Index<T>) -> Option<String> {
    let evictee = index
        .items
        .iter()
        .min_by(|(_, a), (_, b)| {
            a.inserted_at
                .cmp(&b.inserted_at)
                .then(a.version.cmp(&b.version))
        })
        .map(|(id, _)| id.clone())?;
    index.items.remove(&evictee);
    Some(evictee)
}

/// SHA-256 over the canonical serialization of a snapshot.
fn content_hash<T: Serialize>(items: &[T]) -> Option<[u8; 32]> {
    match serde_json::to_vec(items) {
        Ok(bytes) => Some(Sha256::digest(&bytes).into()),
        Err(error) => {
            warn!(%error, "snapshot hash failed; emitting unsuppressed");
            None
        }
    }
}

// ============================================================================
// BACKGROUND TASKS
// ============================================================================

async fn ingest_task<T: CacheEntity>(
    shared: Arc<Shared<T>>,
    mut events: broadcast::Receiver<ChangeEvent<T>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            event = events.recv() => match event {
                Ok(event) => shared.apply(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    // Loss is tolerated: TTL and later events restore freshness.
                    warn!(missed, "event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("event source closed; ingest stopping");
                    break;
                }
            },
        }
    }
}

async fn cleanup_task<T: CacheEntity>(
    shared: Arc<Shared<T>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = shared.config.cleanup_interval;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => shared.sweep_expired(),
        }
    }
}

async fn delivery_task<T: CacheEntity>(
    shared: Arc<Shared<T>>,
    subscriber_id: u64,
    state: Arc<SubscriberState<T>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut last_hash: Option<[u8; 32]> = None;
    if !*shutdown.borrow() {
        emit(&shared, &state, &mut last_hash);
        loop {
            tokio::select! {
                _ = state.dirty.notified() => {
                    if *shutdown.borrow() {
                        break;
                    }
                    emit(&shared, &state, &mut last_hash);
                }
                _ = state.tx.closed() => break,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
    shared.lock_subscribers().remove(&subscriber_id);
    trace!(subscriber_id, "subscription detached");
}

/// Recompute a subscription's snapshot and push it unless content-equal to
/// the previous emission.
fn emit<T: CacheEntity>(
    shared: &Shared<T>,
    state: &SubscriberState<T>,
    last_hash: &mut Option<[u8; 32]>,
) {
    let snapshot = shared.compute_snapshot(&state.selector);
    let hash = snapshot.data.as_deref().and_then(content_hash);
    if hash.is_some() && hash == *last_hash {
        return;
    }
    *last_hash = hash;
    let _ = state.tx.send_replace(Some(snapshot));
}

// ============================================================================
// TESTS
// ============================================================================
