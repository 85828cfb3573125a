//! A concurrent key-value cache with access and write expiry
use std::{
    fmt::Debug,
    future::Future,
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicI64, AtomicU64, Ordering},
    },
    time::Duration,
};

use dashmap::{DashMap, Entry};
use lakecat_catalog::table::ObjectCache;
use lakecat_time::{Time, TimeProvider};
use parking_lot::Mutex;
use tracing::{debug, trace};

/// When entries of a [`TtlCache`] expire
///
/// An entry expires once it has not been read for `expire_after_access`, or once
/// `expire_after_write` has passed since it was stored, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    pub expire_after_access: Duration,
    pub expire_after_write: Option<Duration>,
}

/// Computes the weight of a value for size-bounded caches
pub type Weigher<V> = fn(&V) -> u64;

/// Loads of one key in progress
#[derive(Debug, Default)]
struct InFlight {
    loaders: usize,
    /// Advanced by every invalidation of the key
    epoch: u64,
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    /// Time the value was stored
    written: Time,
    /// Nano-second timestamp of the last read
    last_access: AtomicI64,
    /// Logical access clock used to pick the least recently used entry
    access_seq: AtomicU64,
    weight: u64,
}

impl<V> CacheEntry<V> {
    fn touch(&self, now: Time, seq: u64) {
        self.last_access
            .store(now.timestamp_nanos(), Ordering::SeqCst);
        self.access_seq.store(seq, Ordering::SeqCst);
    }
}

/// A cache whose entries expire after a period without access and, optionally, a period after
/// they were written
///
/// Reads do not block each other: the map is sharded and hits only update atomics. Expired entries
/// are dropped when a read finds them or when [`TtlCache::clean_up`] sweeps the cache. Neither
/// holds a lock across an `await`.
///
/// A load of a known key is registered with [`TtlCache::start_load`] and only publishes its
/// result if that key was not invalidated in the meantime, so invalidating one key never holds
/// back loads of others. Loads that learn their key only from the loaded value use the
/// cache-wide [`TtlCache::generation`] instead. When two loads of the same key race, the first
/// published value wins and is returned to both.
#[derive(Debug)]
pub struct TtlCache<K, V>
where
    K: Eq + Hash,
{
    name: &'static str,
    map: DashMap<K, CacheEntry<V>>,
    policy: TtlPolicy,
    max_weight: Option<u64>,
    weigher: Weigher<V>,
    weighted_size: AtomicU64,
    generation: AtomicU64,
    in_flight: DashMap<K, InFlight>,
    access_seq: AtomicU64,
    /// Serializes size-based eviction
    eviction_lock: Mutex<()>,
    time_provider: Arc<dyn TimeProvider>,
}

impl<K, V> TtlCache<K, V>
where
    K: Clone + Debug + Eq + Hash,
    V: Clone,
{
    /// Create an unbounded cache, `name` is used in log messages
    pub fn new(
        name: &'static str,
        policy: TtlPolicy,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            name,
            map: DashMap::new(),
            policy,
            max_weight: None,
            weigher: |_| 1,
            weighted_size: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            in_flight: DashMap::new(),
            access_seq: AtomicU64::new(0),
            eviction_lock: Mutex::new(()),
            time_provider,
        }
    }

    /// Bound the total weight of the cache, evicting least recently used entries beyond it
    pub fn with_max_weight(mut self, max_weight: u64, weigher: Weigher<V>) -> Self {
        self.max_weight = Some(max_weight);
        self.weigher = weigher;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn policy(&self) -> TtlPolicy {
        self.policy
    }

    fn next_seq(&self) -> u64 {
        self.access_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: Time) -> bool {
        let now = now.timestamp_nanos();
        let idle = now.saturating_sub(entry.last_access.load(Ordering::SeqCst));
        if idle >= duration_nanos(self.policy.expire_after_access) {
            return true;
        }
        match self.policy.expire_after_write {
            Some(ttl) => {
                now.saturating_sub(entry.written.timestamp_nanos()) >= duration_nanos(ttl)
            }
            None => false,
        }
    }

    fn new_entry(&self, value: V, now: Time) -> CacheEntry<V> {
        let weight = (self.weigher)(&value);
        CacheEntry {
            value,
            written: now,
            last_access: AtomicI64::new(now.timestamp_nanos()),
            access_seq: AtomicU64::new(self.next_seq()),
            weight,
        }
    }

    /// Get the value for `key` if it is present and live, resetting its access timer
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.time_provider.now();
        {
            let entry = self.map.get(key)?;
            if !self.is_expired(&entry, now) {
                entry.touch(now, self.next_seq());
                trace!(cache = self.name, ?key, "cache hit");
                return Some(entry.value.clone());
            }
        }
        self.remove_expired(key, now);
        None
    }

    /// Whether a live entry exists for `key`, without touching it
    pub fn contains_key(&self, key: &K) -> bool {
        let now = self.time_provider.now();
        self.map
            .get(key)
            .is_some_and(|entry| !self.is_expired(&entry, now))
    }

    /// Time since `key` was last read or written, `None` if there is no live entry
    pub fn age_of(&self, key: &K) -> Option<Duration> {
        let now = self.time_provider.now();
        let entry = self.map.get(key)?;
        if self.is_expired(&entry, now) {
            return None;
        }
        let last_access = Time::from_timestamp_nanos(entry.last_access.load(Ordering::SeqCst));
        now.checked_duration_since(last_access)
    }

    /// Get the value for `key`, calling `load` on a miss
    ///
    /// Errors from `load` are returned as they are and nothing is cached.
    pub async fn get_or_try_load<F, Fut, E>(&self, key: &K, load: F) -> Result<V, E>
    where
        K: Send + Sync,
        V: Send + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<V, E>> + Send,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        debug!(cache = self.name, ?key, "cache miss");
        let pending = self.start_load(key);
        let value = load().await?;
        Ok(pending.finish(value))
    }

    /// Register a load of `key`, publish its result with [`PendingLoad::finish`]
    ///
    /// Must be called before the source of the value is read.
    pub fn start_load(&self, key: &K) -> PendingLoad<'_, K, V> {
        let epoch = {
            let mut in_flight = self.in_flight.entry(key.clone()).or_default();
            in_flight.loaders += 1;
            in_flight.epoch
        };
        PendingLoad {
            cache: self,
            key: key.clone(),
            epoch,
        }
    }

    /// The current cache-wide invalidation generation, see [`TtlCache::insert_if_unchanged`]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Store `value` unless any key was invalidated since `generation` was read
    ///
    /// Returns the value the cache holds for `key` afterwards, or `value` itself if it was not
    /// stored. A live entry already present for `key` is kept and returned.
    pub fn insert_if_unchanged(&self, key: K, value: V, generation: u64) -> V {
        self.publish(key, value, || self.generation() == generation)
    }

    /// `is_current` runs with the shard of `key` locked, so an invalidation either happens
    /// before it and is seen, or waits and removes what was stored.
    fn publish(&self, key: K, value: V, is_current: impl FnOnce() -> bool) -> V {
        let now = self.time_provider.now();
        match self.map.entry(key) {
            Entry::Occupied(mut occupied) => {
                if !self.is_expired(occupied.get(), now) {
                    let existing = occupied.get();
                    existing.touch(now, self.next_seq());
                    return existing.value.clone();
                }
                if !is_current() {
                    let (_, stale) = occupied.remove_entry();
                    self.weighted_size.fetch_sub(stale.weight, Ordering::SeqCst);
                    return value;
                }
                let entry = self.new_entry(value.clone(), now);
                self.weighted_size.fetch_add(entry.weight, Ordering::SeqCst);
                let replaced = occupied.insert(entry);
                self.weighted_size
                    .fetch_sub(replaced.weight, Ordering::SeqCst);
            }
            Entry::Vacant(vacant) => {
                if !is_current() {
                    debug!(cache = self.name, "cache invalidated during load, not storing");
                    return value;
                }
                let entry = self.new_entry(value.clone(), now);
                self.weighted_size.fetch_add(entry.weight, Ordering::SeqCst);
                vacant.insert(entry);
            }
        }
        self.evict_to_max_weight();
        value
    }

    /// Store `value` unless a live entry exists, returning the value the cache holds afterwards
    pub fn get_or_insert(&self, key: K, value: V) -> V {
        self.insert_if_unchanged(key, value, self.generation())
    }

    /// Store `value`, replacing any entry for `key`
    pub fn put(&self, key: K, value: V) {
        let entry = self.new_entry(value, self.time_provider.now());
        self.weighted_size.fetch_add(entry.weight, Ordering::SeqCst);
        if let Some(replaced) = self.map.insert(key, entry) {
            self.weighted_size
                .fetch_sub(replaced.weight, Ordering::SeqCst);
        }
        self.evict_to_max_weight();
    }

    pub fn invalidate(&self, key: &K) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(mut in_flight) = self.in_flight.get_mut(key) {
            in_flight.epoch += 1;
        }
        if let Some((_, entry)) = self.map.remove(key) {
            self.weighted_size.fetch_sub(entry.weight, Ordering::SeqCst);
            debug!(cache = self.name, ?key, "invalidated");
        }
    }

    /// Remove every entry whose key matches `predicate`
    pub fn invalidate_if(&self, predicate: impl Fn(&K) -> bool) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        for mut in_flight in self.in_flight.iter_mut() {
            if predicate(in_flight.key()) {
                in_flight.epoch += 1;
            }
        }
        self.map.retain(|key, entry| {
            if predicate(key) {
                self.weighted_size.fetch_sub(entry.weight, Ordering::SeqCst);
                debug!(cache = self.name, ?key, "invalidated");
                false
            } else {
                true
            }
        });
    }

    pub fn invalidate_all(&self) {
        self.invalidate_if(|_| true);
    }

    /// Drop every expired entry
    ///
    /// The sweep locks one shard at a time and never waits on a load in progress.
    pub fn clean_up(&self) {
        let now = self.time_provider.now();
        self.map.retain(|_, entry| {
            if self.is_expired(entry, now) {
                self.weighted_size.fetch_sub(entry.weight, Ordering::SeqCst);
                false
            } else {
                true
            }
        });
    }

    /// Keys of the entries currently held, expired or not
    pub fn keys(&self) -> Vec<K> {
        self.map.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn weighted_size(&self) -> u64 {
        self.weighted_size.load(Ordering::SeqCst)
    }

    fn remove_expired(&self, key: &K, now: Time) {
        if let Some((_, entry)) = self.map.remove_if(key, |_, entry| self.is_expired(entry, now)) {
            self.weighted_size.fetch_sub(entry.weight, Ordering::SeqCst);
            debug!(cache = self.name, ?key, "expired");
        }
    }

    fn evict_to_max_weight(&self) {
        let Some(max_weight) = self.max_weight else {
            return;
        };
        let _guard = self.eviction_lock.lock();
        while self.weighted_size() > max_weight {
            let victim = self
                .map
                .iter()
                .min_by_key(|r| r.value().access_seq.load(Ordering::SeqCst))
                .map(|r| r.key().clone());
            let Some(key) = victim else {
                break;
            };
            if let Some((_, entry)) = self.map.remove(&key) {
                self.weighted_size.fetch_sub(entry.weight, Ordering::SeqCst);
                debug!(cache = self.name, ?key, weight = entry.weight, "evicted");
            }
        }
    }
}

/// A load registered with [`TtlCache::start_load`]
///
/// Dropping it without calling [`PendingLoad::finish`] abandons the load.
#[derive(Debug)]
pub struct PendingLoad<'a, K, V>
where
    K: Clone + Debug + Eq + Hash,
    V: Clone,
{
    cache: &'a TtlCache<K, V>,
    key: K,
    epoch: u64,
}

impl<K, V> PendingLoad<'_, K, V>
where
    K: Clone + Debug + Eq + Hash,
    V: Clone,
{
    /// Store `value` unless the key was invalidated since the load started
    ///
    /// Returns the value the cache holds for the key afterwards, see
    /// [`TtlCache::insert_if_unchanged`].
    pub fn finish(self, value: V) -> V {
        let cache = self.cache;
        cache.publish(self.key.clone(), value, || {
            cache
                .in_flight
                .get(&self.key)
                .is_some_and(|in_flight| in_flight.epoch == self.epoch)
        })
    }
}

impl<K, V> Drop for PendingLoad<'_, K, V>
where
    K: Clone + Debug + Eq + Hash,
    V: Clone,
{
    fn drop(&mut self) {
        self.cache
            .in_flight
            .remove_if_mut(&self.key, |_, in_flight| {
                in_flight.loaders -= 1;
                in_flight.loaders == 0
            });
    }
}

impl<K, V> ObjectCache<K, V> for TtlCache<K, V>
where
    K: Clone + Debug + Eq + Hash + Send + Sync,
    V: Clone + Debug + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        Self::get(self, key)
    }

    fn put(&self, key: K, value: V) -> V {
        self.get_or_insert(key, value)
    }
}

fn duration_nanos(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{atomic::AtomicUsize, mpsc},
        thread,
    };

    use lakecat_time::MockProvider;
    use pretty_assertions::assert_eq;

    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn cache(
        access: Duration,
        write: Option<Duration>,
    ) -> (TtlCache<String, u64>, Arc<MockProvider>) {
        let time = Arc::new(MockProvider::new(Time::from_timestamp_nanos(0)));
        let cache = TtlCache::new(
            "test",
            TtlPolicy {
                expire_after_access: access,
                expire_after_write: write,
            },
            Arc::clone(&time) as _,
        );
        (cache, time)
    }

    #[test]
    fn access_resets_age() {
        let (cache, time) = cache(5 * MINUTE, None);
        let key = "k".to_string();
        cache.put(key.clone(), 1);

        time.inc(MINUTE * 5 / 2);
        assert_eq!(cache.age_of(&key), Some(MINUTE * 5 / 2));

        assert_eq!(cache.get(&key), Some(1));
        assert_eq!(cache.age_of(&key), Some(Duration::ZERO));

        time.inc(MINUTE * 5 / 2);
        assert_eq!(cache.age_of(&key), Some(MINUTE * 5 / 2));

        time.inc(MINUTE * 5 / 2 + Duration::from_secs(1));
        assert_eq!(cache.age_of(&key), None);
        assert_eq!(cache.get(&key), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn write_expiry_holds_under_reads() {
        let (cache, time) = cache(5 * MINUTE, Some(8 * MINUTE));
        let key = "k".to_string();
        cache.put(key.clone(), 1);

        for _ in 0..3 {
            time.inc(2 * MINUTE);
            assert_eq!(cache.get(&key), Some(1));
        }
        // 8 minutes after the write, despite reads every 2 minutes
        time.inc(2 * MINUTE);
        assert_eq!(cache.get(&key), None);
    }

    #[tokio::test]
    async fn load_errors_are_not_cached() {
        let (cache, _) = cache(MINUTE, None);
        let key = "k".to_string();

        let err = cache
            .get_or_try_load(&key, || async { Err::<u64, _>("boom") })
            .await
            .unwrap_err();
        assert_eq!(err, "boom");
        assert!(!cache.contains_key(&key));

        let loads = AtomicUsize::new(0);
        let loads = &loads;
        for _ in 0..3 {
            let value = cache
                .get_or_try_load(&key, || async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, &str>(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn load_racing_an_invalidation_is_not_stored() {
        let (cache, _) = cache(MINUTE, None);
        let key = "k".to_string();

        let generation = cache.generation();
        // a writer invalidates while the load is in flight
        cache.invalidate(&key);
        assert_eq!(cache.insert_if_unchanged(key.clone(), 1, generation), 1);
        assert!(!cache.contains_key(&key));

        let generation = cache.generation();
        assert_eq!(cache.insert_if_unchanged(key.clone(), 2, generation), 2);
        // the first published value wins
        assert_eq!(cache.insert_if_unchanged(key.clone(), 3, generation), 2);
        assert_eq!(cache.get(&key), Some(2));
    }

    #[test]
    fn invalidation_only_holds_back_loads_of_that_key() {
        let (cache, _) = cache(MINUTE, None);
        let (a, b) = ("a".to_string(), "b".to_string());

        let load_a = cache.start_load(&a);
        let load_b = cache.start_load(&b);
        cache.invalidate(&b);
        assert_eq!(load_b.finish(2), 2);
        assert_eq!(load_a.finish(1), 1);
        assert_eq!(cache.get(&a), Some(1));
        assert!(!cache.contains_key(&b));

        let load_b = cache.start_load(&b);
        cache.invalidate_if(|k| k.starts_with('x'));
        assert_eq!(load_b.finish(3), 3);
        assert_eq!(cache.get(&b), Some(3));

        let load_b = cache.start_load(&"b2".to_string());
        cache.invalidate_if(|k| k.starts_with('b'));
        load_b.finish(4);
        assert!(!cache.contains_key(&"b2".to_string()));
        assert!(cache.in_flight.is_empty());
    }

    #[test]
    fn concurrent_loads_of_one_key() {
        let (cache, _) = cache(MINUTE, None);
        let key = "k".to_string();

        let first = cache.start_load(&key);
        let second = cache.start_load(&key);
        cache.invalidate(&key);
        // a load started after the invalidation sees the new epoch
        let third = cache.start_load(&key);
        drop(first);
        assert_eq!(second.finish(1), 1);
        assert!(!cache.contains_key(&key));
        assert_eq!(third.finish(2), 2);
        assert_eq!(cache.get(&key), Some(2));
        assert!(cache.in_flight.is_empty());
    }

    #[test]
    fn invalidate_if() {
        let (cache, _) = cache(MINUTE, None);
        for key in ["a1", "a2", "b1"] {
            cache.put(key.to_string(), 1);
        }
        cache.invalidate_if(|k| k.starts_with('a'));
        assert_eq!(cache.keys(), vec!["b1".to_string()]);
        cache.invalidate_all();
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_least_recently_used_beyond_max_weight() {
        let (cache, _) = cache(MINUTE, None);
        let cache = cache.with_max_weight(10, |v| *v);
        cache.put("a".to_string(), 4);
        cache.put("b".to_string(), 4);
        assert_eq!(cache.get(&"a".to_string()), Some(4));

        cache.put("c".to_string(), 4);
        assert!(cache.contains_key(&"a".to_string()));
        assert!(!cache.contains_key(&"b".to_string()));
        assert!(cache.contains_key(&"c".to_string()));
        assert_eq!(cache.weighted_size(), 8);
    }

    #[test]
    fn clean_up_sweeps_expired_entries() {
        let (cache, time) = cache(MINUTE, None);
        cache.put("a".to_string(), 1);
        time.inc(MINUTE / 2);
        cache.put("b".to_string(), 1);
        time.inc(MINUTE / 2);

        cache.clean_up();
        assert_eq!(cache.keys(), vec!["b".to_string()]);
        assert_eq!(cache.weighted_size(), 1);
    }

    /// Readers advancing the clock and sweepers cleaning up run side by side without deadlock
    #[test]
    fn concurrent_reads_and_clean_up() {
        const WORKERS: usize = 20;
        const ITERATIONS: usize = 1_000;

        let (cache, time) = cache(Duration::from_millis(50), None);
        let cache = Arc::new(cache);
        let (tx, rx) = mpsc::channel();

        for worker in 0..WORKERS {
            let cache = Arc::clone(&cache);
            let time = Arc::clone(&time);
            let tx = tx.clone();
            thread::spawn(move || {
                let reader = worker % 2 == 0;
                for i in 0..ITERATIONS {
                    if reader {
                        time.inc(Duration::from_millis(1));
                        let key = format!("k{}", i % 16);
                        if cache.get(&key).is_none() {
                            cache.put(key, i as u64);
                        }
                    } else {
                        cache.clean_up();
                    }
                }
                tx.send(reader).unwrap();
            });
        }
        drop(tx);

        let (mut readers, mut sweepers) = (0, 0);
        for _ in 0..WORKERS {
            match rx.recv_timeout(Duration::from_secs(60)).unwrap() {
                true => readers += 1,
                false => sweepers += 1,
            }
        }
        assert_eq!((readers, sweepers), (10, 10));
    }
}
