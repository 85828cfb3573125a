//! An in-memory cache of manifest files read from object storage
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use dashmap::{DashMap, Entry};
use lakecat_catalog::table::ObjectCache;
use object_store::path::Path;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::CacheOptions;

/// Holds the content and hit sequence for an entry in the cache
#[derive(Debug)]
struct ManifestEntry {
    content: Bytes,
    /// Logical time of the last hit
    hit_seq: AtomicU64,
}

impl ManifestEntry {
    fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

/// A size-weighted Least-Recently-Used (LRU) cache of manifest files by their [`Path`]
///
/// Files larger than the threshold are never cached. Inserting evicts the least recently hit
/// entries until the total size fits the capacity again. Manifest files are immutable, so cached
/// content is never revalidated against the store: a hit is served even if the file has been
/// deleted since.
#[derive(Debug)]
pub struct ManifestCache {
    /// The maximum amount of memory this cache should occupy in bytes
    capacity: u64,
    /// Files larger than this many bytes are not cached
    threshold: u64,
    /// The current amount of memory used by the cache in bytes
    used: AtomicU64,
    evictions: AtomicU64,
    clock: AtomicU64,
    map: DashMap<Path, ManifestEntry>,
    /// Serializes eviction
    prune_lock: Mutex<()>,
}

impl ManifestCache {
    pub fn new(capacity: u64, threshold: u64) -> Self {
        Self {
            capacity,
            threshold,
            used: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            clock: AtomicU64::new(0),
            map: DashMap::new(),
            prune_lock: Mutex::new(()),
        }
    }

    /// Size the cache from `options`
    ///
    /// A configured `manifest_max_memory` becomes the capacity and lifts the per-file threshold.
    pub fn from_options(options: &CacheOptions) -> Self {
        let (capacity, threshold) = options.manifest_budget();
        Self::new(capacity, threshold)
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Whether a file of `size` bytes would be admitted
    pub fn admits(&self, size: u64) -> bool {
        size <= self.threshold && size <= self.capacity
    }

    pub fn get(&self, path: &Path) -> Option<Bytes> {
        let entry = self.map.get(path)?;
        entry.hit_seq.store(self.tick(), Ordering::SeqCst);
        trace!(%path, "manifest cache hit");
        Some(entry.content.clone())
    }

    /// Cache `content` for `path` if it is small enough, returning the content the cache holds
    pub fn insert(&self, path: Path, content: Bytes) -> Bytes {
        if !self.admits(content.len() as u64) {
            trace!(%path, size = content.len(), "manifest not cached, too large");
            return content;
        }
        let content = match self.map.entry(path) {
            Entry::Occupied(occupied) => return occupied.get().content.clone(),
            Entry::Vacant(vacant) => {
                let entry = ManifestEntry {
                    content,
                    hit_seq: AtomicU64::new(self.tick()),
                };
                self.used.fetch_add(entry.size(), Ordering::SeqCst);
                vacant.insert(entry).content.clone()
            }
        };
        self.prune();
        content
    }

    pub fn remove(&self, path: &Path) {
        if let Some((_, entry)) = self.map.remove(path) {
            self.used.fetch_sub(entry.size(), Ordering::SeqCst);
        }
    }

    pub fn clear(&self) {
        self.map.retain(|_, entry| {
            self.used.fetch_sub(entry.size(), Ordering::SeqCst);
            false
        });
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Bytes of manifest content currently held
    pub fn memory_used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    /// Number of entries evicted to stay within capacity so far
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::SeqCst)
    }

    /// Evict least recently hit entries until the cache fits its capacity
    fn prune(&self) {
        let _guard = self.prune_lock.lock();
        while self.memory_used() > self.capacity {
            let victim = self
                .map
                .iter()
                .min_by_key(|r| r.value().hit_seq.load(Ordering::SeqCst))
                .map(|r| r.key().clone());
            let Some(path) = victim else {
                break;
            };
            if let Some((_, entry)) = self.map.remove(&path) {
                self.used.fetch_sub(entry.size(), Ordering::SeqCst);
                self.evictions.fetch_add(1, Ordering::SeqCst);
                debug!(%path, size = entry.size(), "evicted manifest");
            }
        }
    }
}

impl ObjectCache<Path, Bytes> for ManifestCache {
    fn get(&self, key: &Path) -> Option<Bytes> {
        Self::get(self, key)
    }

    fn put(&self, key: Path, value: Bytes) -> Bytes {
        self.insert(key, value)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn bytes(n: usize) -> Bytes {
        Bytes::from(vec![0u8; n])
    }

    #[test]
    fn files_above_threshold_are_not_cached() {
        let cache = ManifestCache::new(100, 10);
        let path = Path::from("m1");
        cache.insert(path.clone(), bytes(11));
        assert_eq!(cache.get(&path), None);

        cache.insert(path.clone(), bytes(10));
        assert_eq!(cache.get(&path).map(|b| b.len()), Some(10));
        assert_eq!(cache.memory_used(), 10);
    }

    #[test]
    fn files_above_capacity_are_not_cached() {
        let cache = ManifestCache::new(10, u64::MAX);
        cache.insert(Path::from("small"), bytes(5));
        cache.insert(Path::from("huge"), bytes(11));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.evictions(), 0);
    }

    #[test]
    fn evicts_least_recently_hit() {
        let cache = ManifestCache::new(30, u64::MAX);
        let (a, b, c) = (Path::from("a"), Path::from("b"), Path::from("c"));
        cache.insert(a.clone(), bytes(10));
        cache.insert(b.clone(), bytes(10));
        cache.insert(c.clone(), bytes(10));
        assert!(cache.get(&a).is_some());

        cache.insert(Path::from("d"), bytes(10));
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&b).is_none());
        assert!(cache.get(&c).is_some());
        assert_eq!(cache.memory_used(), 30);
        assert_eq!(cache.evictions(), 1);
    }

    #[test]
    fn first_insert_wins() {
        let cache = ManifestCache::new(100, u64::MAX);
        let path = Path::from("m");
        let first = cache.insert(path.clone(), Bytes::from_static(b"first"));
        let second = cache.insert(path.clone(), Bytes::from_static(b"second"));
        assert_eq!(first, second);

        cache.remove(&path);
        assert!(cache.is_empty());
        assert_eq!(cache.memory_used(), 0);
    }
}
