//! Bounded least-frequently-used caches.
//!
//! [`FrequencyCache`] is the generic container. [`FileCache`] and
//! [`ResultCache`] put it in front of the file and result-data services so
//! repeated views of the same file or node output do not refetch.
//!
//! # Eviction
//!
//! When an insert finds the cache full, the entry with the lowest hit count
//! is removed; among equal counts the one hit least recently goes first.
//! The scan is linear in the capacity, which stays in the tens.
//!
//! # Adaptive expiry
//!
//! A cache built [`with_basic_duration`](FrequencyCache::with_basic_duration)
//! also expires entries in [`sweep`](FrequencyCache::sweep): an entry older
//! than `hit_count * D` is dropped, so popular entries live longer.
//!
//! Time comes from [`tokio::time::Instant`], which tests can pause and advance.

mod file;
mod result;

pub use file::FileCache;
pub use result::ResultCache;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Bookkeeping for one cached value.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Stored value.
    pub value: V,
    /// Number of uses, starting at 1 on insert.
    pub hit_count: u64,
    /// Last use.
    pub last_hit: Instant,
    /// First insert; value replacement keeps it.
    pub created_at: Instant,
}

impl<V> CacheEntry<V> {
    fn new(value: V, now: Instant) -> Self {
        Self {
            value,
            hit_count: 1,
            last_hit: now,
            created_at: now,
        }
    }

    fn touch(&mut self, now: Instant) {
        self.hit_count = self.hit_count.saturating_add(1);
        self.last_hit = now;
    }

    fn is_expired(&self, basic: Duration, now: Instant) -> bool {
        let factor = u32::try_from(self.hit_count).unwrap_or(u32::MAX);
        let ttl = basic.saturating_mul(factor);
        now.saturating_duration_since(self.created_at) > ttl
    }
}

/// Generic LFU cache with LRU tie-break.
///
/// All operations are synchronous and take an internal lock only for their
/// own duration; [`get_or_fetch`](Self::get_or_fetch) releases it while the
/// fetch future runs.
///
/// # Examples
///
/// ```
/// use flowsync::cache::FrequencyCache;
///
/// let cache = FrequencyCache::new(2);
/// cache.put("a", 1);
/// cache.put("b", 2);
/// cache.hit(&"a");
/// cache.put("c", 3); // evicts "b": fewer hits than "a"
/// assert_eq!(cache.get(&"b"), None);
/// assert_eq!(cache.get(&"a"), Some(1));
/// assert_eq!(cache.len(), 2);
/// ```
pub struct FrequencyCache<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    max_size: usize,
    basic_duration: Option<Duration>,
}

impl<K, V> fmt::Debug for FrequencyCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrequencyCache")
            .field("len", &self.entries.lock().len())
            .field("max_size", &self.max_size)
            .field("basic_duration", &self.basic_duration)
            .finish()
    }
}

impl<K, V> FrequencyCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    /// Creates a cache holding at most `max_size` entries (at least one).
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::with_capacity(max_size)),
            max_size: max_size.max(1),
            basic_duration: None,
        }
    }

    /// Enables adaptive expiry with base duration `basic`.
    pub fn with_basic_duration(mut self, basic: Duration) -> Self {
        self.basic_duration = Some(basic);
        self
    }

    /// Configured capacity.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether `key` is cached.
    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Pure lookup; does not count as a use.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.lock().get(key).map(|e| e.value.clone())
    }

    /// Hit count of `key`, if cached.
    pub fn hit_count(&self, key: &K) -> Option<u64> {
        self.entries.lock().get(key).map(|e| e.hit_count)
    }

    /// Records a use of `key`. Returns `false` when not cached.
    pub fn hit(&self, key: &K) -> bool {
        let now = Instant::now();
        match self.entries.lock().get_mut(key) {
            Some(entry) => {
                entry.touch(now);
                true
            },
            None => false,
        }
    }

    /// Returns the cached value, or runs `fetch` and caches its result.
    ///
    /// A hit counts as a use. Fetch errors propagate unchanged and leave the
    /// cache untouched. Two concurrent misses on one key may both fetch; the
    /// second result replaces the first.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        {
            let now = Instant::now();
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(&key) {
                entry.touch(now);
                tracing::debug!(key = ?key, hits = entry.hit_count, "cache hit");
                return Ok(entry.value.clone());
            }
        }

        tracing::debug!(key = ?key, "cache miss");
        let value = fetch().await?;
        self.put(key, value.clone());
        Ok(value)
    }

    /// Inserts or updates `key`.
    ///
    /// Updating replaces the value and counts as a use. Inserting into a full
    /// cache evicts one entry first.
    pub fn put(&self, key: K, value: V) {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&key) {
            entry.value = value;
            entry.touch(now);
            return;
        }
        if entries.len() >= self.max_size {
            if let Some(victim) = select_victim(&entries) {
                tracing::debug!(key = ?victim, "cache evict");
                entries.remove(&victim);
            }
        }
        entries.insert(key, CacheEntry::new(value, now));
    }

    /// Removes `key`, returning its value.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.lock().remove(key).map(|e| e.value)
    }

    /// Removes everything.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Drops every entry whose key fails `keep`, and every entry past its
    /// adaptive TTL when a base duration is configured.
    ///
    /// Returns the number of removed entries.
    pub fn sweep<P>(&self, mut keep: P) -> usize
    where
        P: FnMut(&K) -> bool,
    {
        let now = Instant::now();
        let basic = self.basic_duration;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, entry| {
            keep(key) && !basic.is_some_and(|d| entry.is_expired(d, now))
        });
        before - entries.len()
    }

    /// Snapshot of the entry for `key`.
    pub fn entry(&self, key: &K) -> Option<CacheEntry<V>> {
        self.entries.lock().get(key).cloned()
    }
}

fn select_victim<K: Clone, V>(entries: &HashMap<K, CacheEntry<V>>) -> Option<K> {
    entries
        .iter()
        .min_by(|(_, a), (_, b)| {
            a.hit_count
                .cmp(&b.hit_count)
                .then_with(|| a.last_hit.cmp(&b.last_hit))
        })
        .map(|(k, _)| k.clone())
}
