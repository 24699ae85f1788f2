// =============================================================================
// TTL Cache — bounded FIFO store with lazy and periodic expiry
// =============================================================================
//
// Concurrency model:
//   - One `parking_lot::Mutex` guards the entry map and the insertion-order
//     index together, so evict-on-full and expire-on-read can never race.
//   - Hit/miss counters are atomics and never take the lock.
//   - The background sweep walks the insertion order from a cursor and
//     releases the lock after every `SWEEP_BATCH` entries examined, so
//     request traffic interleaves with it.
//
// Eviction is strictly by insertion order. Reads never refresh position and
// overwriting an existing key keeps its original slot.
// =============================================================================

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{Clock, SystemClock};

/// Most entries examined per lock acquisition during a sweep.
const SWEEP_BATCH: usize = 64;

/// Smallest TTL accepted; shorter values are raised to this.
const MIN_TTL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses), 0 when nothing was looked up yet.
    pub hit_rate: f64,
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
    seq: u64,
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    /// Insertion sequence → key. First entry is the eviction candidate.
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V> Inner<V> {
    fn remove(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }
}

pub struct TtlCache<V> {
    inner: Mutex<Inner<V>>,
    capacity: usize,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> TtlCache<V> {
    /// Cache on the system clock.
    pub fn new(capacity: usize) -> Self {
        Self::with_clock(capacity, Arc::new(SystemClock))
    }

    /// A capacity of zero is treated as one.
    pub fn with_clock(capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
            capacity: capacity.max(1),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up `key`. An expired entry is deleted on the spot and reported as
    /// a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let expired = inner.entries.get(key).map(|e| now >= e.expires_at);
        let value = match expired {
            None => None,
            Some(true) => {
                inner.remove(key);
                debug!(key, "cache entry expired on read");
                None
            }
            Some(false) => inner.entries.get(key).map(|e| e.value.clone()),
        };
        drop(inner);

        let counter = if value.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    /// Insert or overwrite `key`. Inserting a new key into a full cache evicts
    /// the earliest-inserted entry first.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let expires_at = self.clock.now() + ttl.max(MIN_TTL);
        let mut inner = self.inner.lock();

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.value = value;
            entry.expires_at = expires_at;
            return;
        }

        if inner.entries.len() >= self.capacity {
            if let Some((_, oldest)) = inner.order.pop_first() {
                inner.entries.remove(&oldest);
                debug!(evicted = %oldest, "cache full, evicted oldest entry");
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, key.clone());
        inner.entries.insert(
            key,
            Entry {
                value,
                expires_at,
                seq,
            },
        );
    }

    pub fn remove(&self, key: &str) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Stored entries, including ones that expired but were not yet swept.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            size: self.len(),
            capacity: self.capacity,
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
        }
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let mut removed = 0;
        let mut cursor = Some(0);
        while let Some(from) = cursor {
            let (batch_removed, next) = self.sweep_batch(from);
            removed += batch_removed;
            cursor = next;
        }
        removed
    }

    /// Examine up to `SWEEP_BATCH` entries in insertion order starting at
    /// sequence `from`, under one lock hold. Returns the number removed and
    /// where to resume, or `None` once the end of the order was reached.
    fn sweep_batch(&self, from: u64) -> (usize, Option<u64>) {
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        let mut examined = 0;
        let mut next = from;
        let mut expired = Vec::new();
        for (&seq, key) in inner.order.range(from..).take(SWEEP_BATCH) {
            examined += 1;
            next = seq + 1;
            if inner.entries.get(key).is_some_and(|e| now >= e.expires_at) {
                expired.push(key.clone());
            }
        }
        for key in &expired {
            inner.remove(key);
        }

        let resume = (examined == SWEEP_BATCH).then_some(next);
        (expired.len(), resume)
    }
}

/// Run [`TtlCache::sweep_expired`] every `interval` until the task is aborted.
pub fn spawn_sweeper<V>(cache: Arc<TtlCache<V>>, interval: Duration) -> JoinHandle<()>
where
    V: Clone + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = cache.sweep_expired();
            debug!(removed, remaining = cache.len(), "cache sweep complete");
        }
    })
}
