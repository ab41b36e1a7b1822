//! Capacity-bounded memoization for remote call results.
//!
//! Each key owns a single-flight cell: concurrent callers asking for the same
//! key wait on one computation instead of issuing duplicate remote calls.
//! When a computed value is committed at capacity, one arbitrary committed
//! entry is evicted first. Eviction order is unspecified (random), not LRU.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::seq::IteratorRandom;
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::debug;

/// Default number of entries per cache.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// Deterministic SHA-256 hex digest over one or more string parts.
///
/// Parts are separated by a NUL byte so `["ab", "c"]` and `["a", "bc"]`
/// produce different keys.
pub fn content_hash(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Bounded, concurrency-safe cache with get-or-compute semantics.
///
/// Committed values live in `entries`, which never exceeds `capacity`.
/// Computations still running live in `pending` and are never evicted;
/// a value enters `entries` (evicting if needed) only once it succeeded.
pub struct BoundedCache<V> {
    name: &'static str,
    capacity: usize,
    slots: Mutex<Slots<V>>,
}

struct Slots<V> {
    entries: HashMap<String, V>,
    pending: HashMap<String, Arc<OnceCell<V>>>,
}

impl<V> BoundedCache<V>
where
    V: Clone + Send + Sync,
{
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity: capacity.max(1),
            slots: Mutex::new(Slots {
                entries: HashMap::new(),
                pending: HashMap::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of committed entries. In-flight computations are not counted.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached value for `key`, if committed.
    pub fn get(&self, key: &str) -> Option<V> {
        self.lock().entries.get(key).cloned()
    }

    /// Store a value directly, evicting an arbitrary entry if at capacity.
    pub fn insert(&self, key: &str, value: V) {
        let mut slots = self.lock();
        self.commit_locked(&mut slots, key, value);
    }

    /// Return the value for `key`, computing and storing it on a miss.
    ///
    /// Only one `compute` runs per key at a time; other callers wait for it.
    /// Nothing is evicted until a computation succeeds, so a failed
    /// computation leaves the cache exactly as it found it.
    pub async fn get_or_try_insert_with<F, Fut, E>(&self, key: &str, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = {
            let mut slots = self.lock();
            if let Some(value) = slots.entries.get(key) {
                debug!(cache = self.name, "Cache hit");
                return Ok(value.clone());
            }
            Arc::clone(
                slots
                    .pending
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        match cell.get_or_try_init(compute).await {
            Ok(value) => {
                let value = value.clone();
                self.commit_pending(key, &cell, value.clone());
                Ok(value)
            }
            Err(e) => {
                self.discard_pending(key, &cell);
                Err(e)
            }
        }
    }

    /// Move a finished computation into `entries`. Only the first caller
    /// to observe the finished cell commits it.
    fn commit_pending(&self, key: &str, cell: &Arc<OnceCell<V>>, value: V) {
        let mut slots = self.lock();
        let owned = slots
            .pending
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, cell));
        if owned {
            slots.pending.remove(key);
            self.commit_locked(&mut slots, key, value);
        }
    }

    fn commit_locked(&self, slots: &mut Slots<V>, key: &str, value: V) {
        if !slots.entries.contains_key(key) {
            self.make_room(&mut slots.entries);
        }
        slots.entries.insert(key.to_string(), value);
    }

    fn make_room(&self, entries: &mut HashMap<String, V>) {
        while entries.len() >= self.capacity {
            let victim = entries.keys().choose(&mut rand::thread_rng()).cloned();
            match victim {
                Some(victim) => {
                    entries.remove(&victim);
                    debug!(cache = self.name, "Evicted cache entry");
                }
                None => break,
            }
        }
    }

    fn discard_pending(&self, key: &str, cell: &Arc<OnceCell<V>>) {
        let mut slots = self.lock();
        let stale = slots
            .pending
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, cell) && !current.initialized());
        if stale {
            slots.pending.remove(key);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots<V>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(content_hash(&["hello"]), content_hash(&["hello"]));
        assert_ne!(content_hash(&["hello"]), content_hash(&["hello "]));
        assert_eq!(content_hash(&["hello"]).len(), 64);
    }

    #[test]
    fn hash_separates_parts() {
        assert_ne!(content_hash(&["ab", "c"]), content_hash(&["a", "bc"]));
        assert_ne!(content_hash(&["produtivo", "x"]), content_hash(&["improdutivo", "x"]));
    }

    #[tokio::test]
    async fn second_lookup_does_not_recompute() {
        let cache = BoundedCache::new("test", 4);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_try_insert_with("k", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(42)
                })
                .await
                .unwrap();
            assert_eq!(value, 42);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("k"), Some(42));
    }

    #[tokio::test]
    async fn size_stays_at_capacity() {
        let cache = BoundedCache::new("test", 3);

        for i in 0..4 {
            let key = format!("key-{i}");
            cache
                .get_or_try_insert_with(&key, || async move { Ok::<_, ()>(i) })
                .await
                .unwrap();
        }

        assert_eq!(cache.len(), 3);
        // The newest key always survives its own insertion.
        assert_eq!(cache.get("key-3"), Some(3));
    }

    #[tokio::test]
    async fn existing_key_does_not_evict() {
        let cache = BoundedCache::new("test", 2);
        cache.insert("a", 1);
        cache.insert("b", 2);

        let value = cache
            .get_or_try_insert_with("a", || async { Ok::<_, ()>(99) })
            .await
            .unwrap();

        assert_eq!(value, 1);
        assert_eq!(cache.get("b"), Some(2));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn direct_insert_respects_capacity() {
        let cache = BoundedCache::new("test", 2);
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("c", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("c"), Some(3));

        cache.insert("c", 4);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("c"), Some(4));
    }

    #[tokio::test]
    async fn failed_compute_leaves_no_entry() {
        let cache: BoundedCache<u32> = BoundedCache::new("test", 2);

        let result = cache
            .get_or_try_insert_with("k", || async { Err::<u32, _>("boom") })
            .await;
        assert_eq!(result, Err("boom"));
        assert!(cache.is_empty());
        assert_eq!(cache.get("k"), None);

        let value = cache
            .get_or_try_insert_with("k", || async { Ok::<_, &str>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_computation() {
        let cache = Arc::new(BoundedCache::new("test", 8));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_try_insert_with("shared", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<_, ()>("value".to_string())
                    })
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), "value");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let cache = BoundedCache::new("test", 0);
        assert_eq!(cache.capacity(), 1);
        cache.insert("a", 1);
        cache.insert("b", 2);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn running_computation_survives_other_inserts() {
        let cache = Arc::new(BoundedCache::new("test", 1));
        let calls = Arc::new(AtomicUsize::new(0));

        let slow = |cache: Arc<BoundedCache<u32>>, calls: Arc<AtomicUsize>| async move {
            cache
                .get_or_try_insert_with("a", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok::<_, ()>(1)
                })
                .await
                .unwrap()
        };

        let first = tokio::spawn(slow(Arc::clone(&cache), Arc::clone(&calls)));
        tokio::time::sleep(Duration::from_millis(20)).await;

        cache
            .get_or_try_insert_with("b", || async { Ok::<_, ()>(2) })
            .await
            .unwrap();
        assert_eq!(cache.get("b"), Some(2));

        let second = tokio::spawn(slow(Arc::clone(&cache), Arc::clone(&calls)));

        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(second.await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("a"), Some(1));
    }

    #[tokio::test]
    async fn failed_miss_keeps_full_cache_intact() {
        let cache = BoundedCache::new("test", 2);
        cache.insert("x", 1);
        cache.insert("y", 2);

        let result = cache
            .get_or_try_insert_with("z", || async { Err::<u32, _>("model loading") })
            .await;

        assert_eq!(result, Err("model loading"));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("x"), Some(1));
        assert_eq!(cache.get("y"), Some(2));
        assert_eq!(cache.get("z"), None);
    }
}
